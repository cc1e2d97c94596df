use super::outlet::{Buffered, Iter, Outlet};
use super::{BackpressureStrategy, Flowable, FlowableEmitter};
use crate::error::RxError;
use crate::signal::Signal;

impl<T: Send + 'static> Flowable<T> {
    /// Stream driven by a producer that does not look at demand by itself.
    ///
    /// Items pushed beyond what the consumer requested are handled by
    /// `strategy`. The producer can still cooperate through
    /// [`FlowableEmitter::requested`] and [`FlowableEmitter::is_cancelled`].
    pub fn create<F>(strategy: BackpressureStrategy, producer: F) -> Self
    where
        F: Fn(FlowableEmitter<T>) + Send + Sync + 'static,
    {
        Self::from_fn(move |subscriber, token| {
            let outlet = Outlet::new(Buffered::new(strategy), token);
            outlet.start(subscriber);
            if outlet.token().is_disposed() {
                return;
            }
            producer(FlowableEmitter::new(outlet));
        })
    }

    /// Emit `items` exactly as fast as they are requested.
    #[allow(clippy::should_implement_trait)]
    pub fn from_iter<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
        I::IntoIter: Send + 'static,
    {
        Self::from_fn(move |subscriber, token| {
            Outlet::new(Iter::new(items.clone().into_iter()), token).start(subscriber);
        })
    }

    pub fn just(value: T) -> Self
    where
        T: Clone + Sync,
    {
        Self::from_iter([value])
    }

    /// Completes without demand.
    pub fn empty() -> Self {
        Self::from_iter(std::iter::empty())
    }

    pub fn error(err: RxError) -> Self {
        Self::from_fn(move |subscriber, token| {
            let outlet = Outlet::new(Buffered::new(BackpressureStrategy::Buffer), token);
            outlet.start(subscriber);
            outlet.finish(Signal::Error(err.clone()));
        })
    }
}

impl Flowable<i64> {
    /// `count` consecutive integers starting at `start`, pulled on demand.
    pub fn range(start: i64, count: usize) -> Self {
        Self::from_iter((0..count).map(move |i| start.wrapping_add(i as i64)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::flowable::TestSubscriber;

    #[test]
    fn range_is_pulled_by_demand() {
        let ts = TestSubscriber::new(4);
        Flowable::range(0, 10).subscribe_with(ts.clone());
        assert_eq!(ts.values(), vec![0, 1, 2, 3]);
        assert!(!ts.is_terminated());

        ts.request(6);
        assert_eq!(ts.values(), (0..10).collect::<Vec<_>>());
        assert!(ts.is_completed());
    }

    #[test]
    fn terminals_need_no_demand() {
        let ts = TestSubscriber::<u8>::new(0);
        Flowable::empty().subscribe_with(ts.clone());
        assert!(ts.is_completed());

        let ts = TestSubscriber::<u8>::new(0);
        Flowable::error(RxError::upstream(anyhow::anyhow!("down"))).subscribe_with(ts.clone());
        assert_eq!(ts.error().unwrap().kind(), ErrorKind::Upstream);
    }

    #[test]
    fn each_subscription_restarts() {
        let f = Flowable::from_iter(vec!["a", "b"]);
        assert_eq!(f.blocking_collect(std::time::Duration::from_secs(1)).unwrap(), vec!["a", "b"]);
        assert_eq!(f.blocking_collect(std::time::Duration::from_secs(1)).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn just_waits_for_a_request() {
        let ts = TestSubscriber::new(0);
        Flowable::just(7u8).subscribe_with(ts.clone());
        assert_eq!(ts.value_count(), 0);
        ts.request(1);
        assert_eq!(ts.values(), vec![7]);
        assert!(ts.is_completed());
    }
}
