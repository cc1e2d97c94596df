//! Backpressure-aware streams.
//!
//! A [`Flowable`] follows the same protocol as an
//! [`Observable`](crate::observable::Observable) plus demand: the consumer
//! grants credit with [`Subscription::request`] and the producer never
//! delivers more `Next` signals than it was granted. Producers that cannot
//! slow down are fitted with a [`BackpressureStrategy`].

mod create;
mod emitter;
mod ops;
mod outlet;
mod strategy;
mod subscription;
mod test_subscriber;

pub use emitter::FlowableEmitter;
pub use strategy::BackpressureStrategy;
pub use subscription::Subscription;
pub use test_subscriber::TestSubscriber;

use crate::disposable::Disposable;
use crate::error::{RxError, RxResult};
use crate::observable::Observable;
use crate::observer::{LambdaObserver, Observer};
use crate::signal::Signal;
use outlet::{Buffered, Outlet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Consumer side of the demand protocol.
///
/// Nothing but a terminal arrives before the subscriber requested at least
/// one item through the [`Subscription`] it got in `on_subscribe`.
pub trait Subscriber<T>: Send + 'static {
    fn on_subscribe(&mut self, subscription: Subscription);

    fn on_signal(&mut self, signal: Signal<T>);

    #[inline]
    fn on_next(&mut self, value: T) {
        self.on_signal(Signal::Next(value));
    }

    #[inline]
    fn on_error(&mut self, error: RxError) {
        self.on_signal(Signal::Error(error));
    }

    #[inline]
    fn on_complete(&mut self) {
        self.on_signal(Signal::Complete);
    }
}

pub type BoxSubscriber<T> = Box<dyn Subscriber<T>>;

impl<T, S> Subscriber<T> for Box<S>
where
    S: Subscriber<T> + ?Sized,
{
    #[inline]
    fn on_subscribe(&mut self, subscription: Subscription) {
        (**self).on_subscribe(subscription);
    }

    #[inline]
    fn on_signal(&mut self, signal: Signal<T>) {
        (**self).on_signal(signal);
    }
}

type SubscribeFn<T> = dyn Fn(BoxSubscriber<T>, Disposable) + Send + Sync + 'static;

pub struct Flowable<T> {
    on_subscribe: Arc<SubscribeFn<T>>,
    subscribed_on: bool,
}

impl<T> Clone for Flowable<T> {
    fn clone(&self) -> Self {
        Self {
            on_subscribe: self.on_subscribe.clone(),
            subscribed_on: self.subscribed_on,
        }
    }
}

impl<T> fmt::Debug for Flowable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flowable")
            .field("subscribed_on", &self.subscribed_on)
            .finish()
    }
}

impl<T: Send + 'static> Flowable<T> {
    pub(crate) fn from_fn<F>(f: F) -> Self
    where
        F: Fn(BoxSubscriber<T>, Disposable) + Send + Sync + 'static,
    {
        Self {
            on_subscribe: Arc::new(f),
            subscribed_on: false,
        }
    }

    pub(crate) fn stage<R, F>(&self, f: F) -> Flowable<R>
    where
        R: Send + 'static,
        F: Fn(&Flowable<T>, BoxSubscriber<R>, Disposable) + Send + Sync + 'static,
    {
        let upstream = self.clone();
        Flowable {
            on_subscribe: Arc::new(move |subscriber, token| f(&upstream, subscriber, token)),
            subscribed_on: self.subscribed_on,
        }
    }

    #[inline]
    pub(crate) fn subscribe_inner(&self, subscriber: BoxSubscriber<T>, token: Disposable) {
        (self.on_subscribe)(subscriber, token);
    }

    /// Subscribe with full control over demand.
    pub fn subscribe_with<S>(&self, subscriber: S) -> Disposable
    where
        S: Subscriber<T>,
    {
        let token = Disposable::new();
        self.subscribe_inner(Box::new(subscriber), token.clone());
        token
    }

    /// Subscribe with unbounded demand. Errors go to the unhandled-error hook.
    pub fn subscribe<N>(&self, on_next: N) -> Disposable
    where
        N: FnMut(T) + Send + 'static,
    {
        self.subscribe_with(Unbounded(LambdaObserver::new(on_next)))
    }

    pub fn subscribe_all<N, E, C>(&self, on_next: N, on_error: E, on_complete: C) -> Disposable
    where
        N: FnMut(T) + Send + 'static,
        E: FnMut(RxError) + Send + 'static,
        C: FnMut() + Send + 'static,
    {
        self.subscribe_with(Unbounded(
            LambdaObserver::new(on_next)
                .with_error(on_error)
                .with_complete(on_complete),
        ))
    }

    /// Drop the demand protocol by requesting everything up front.
    pub fn to_observable(&self) -> Observable<T> {
        let upstream = self.clone();
        Observable::from_fn(move |observer, token| {
            upstream.subscribe_inner(Box::new(Unbounded(observer)), token);
        })
    }

    /// See [`Observable::blocking_collect`].
    pub fn blocking_collect(&self, timeout: Duration) -> RxResult<Vec<T>> {
        self.to_observable().blocking_collect(timeout)
    }
}

impl<T: Send + 'static> Observable<T> {
    /// Put a demand boundary after this stream. Values the consumer has not
    /// asked for yet are handled by `strategy`.
    pub fn to_flowable(&self, strategy: BackpressureStrategy) -> Flowable<T> {
        let upstream = self.clone();
        Flowable::from_fn(move |subscriber, token| {
            let outlet = Outlet::new(Buffered::new(strategy), token.clone());
            outlet.start(subscriber);
            if token.is_disposed() {
                return;
            }
            upstream.subscribe_inner(Box::new(Feed(outlet)), token.child());
        })
    }
}

/// Observer adapter that requests everything as soon as it is subscribed.
struct Unbounded<O>(O);

impl<T, O> Subscriber<T> for Unbounded<O>
where
    T: Send + 'static,
    O: Observer<T>,
{
    fn on_subscribe(&mut self, subscription: Subscription) {
        self.0.on_subscribe(subscription.token().clone());
        subscription.request(u64::MAX);
    }

    fn on_signal(&mut self, signal: Signal<T>) {
        self.0.on_signal(signal);
    }
}

/// Pushes an observable's signals into a buffered outlet.
struct Feed<T>(Arc<Outlet<T, Buffered<T>>>);

impl<T: Send + 'static> Observer<T> for Feed<T> {
    fn on_signal(&mut self, signal: Signal<T>) {
        match signal {
            Signal::Next(v) => self.0.offer(v),
            terminal => self.0.finish(terminal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn drop_policy_never_exceeds_demand() {
        let ts = TestSubscriber::new(10);
        Flowable::create(BackpressureStrategy::Drop, |mut emitter| {
            for i in 0..100 {
                emitter.next(i);
            }
            emitter.complete();
        })
        .subscribe_with(ts.clone());

        assert!(ts.value_count() <= 10);
        assert_eq!(ts.values(), (0..10).collect::<Vec<_>>());
        assert!(ts.error().is_none());
        assert!(ts.is_completed());
        assert_eq!(ts.violations(), 0);
    }

    #[test]
    fn buffer_policy_holds_until_requested() {
        let ts = TestSubscriber::new(3);
        Flowable::create(BackpressureStrategy::Buffer, |mut emitter| {
            for i in 0..10 {
                emitter.next(i);
            }
            emitter.complete();
        })
        .subscribe_with(ts.clone());

        assert_eq!(ts.values(), vec![0, 1, 2]);
        assert!(!ts.is_terminated());
        ts.request(100);
        assert_eq!(ts.values(), (0..10).collect::<Vec<_>>());
        assert!(ts.is_completed());
    }

    #[test]
    fn latest_policy_keeps_most_recent() {
        let ts = TestSubscriber::new(0);
        Flowable::create(BackpressureStrategy::Latest, |mut emitter| {
            for i in 1..=5 {
                emitter.next(i);
            }
            emitter.complete();
        })
        .subscribe_with(ts.clone());

        assert_eq!(ts.value_count(), 0);
        ts.request(10);
        assert_eq!(ts.values(), vec![5]);
        assert!(ts.is_completed());
    }

    #[test]
    fn error_policy_overflows() {
        let ts = TestSubscriber::new(1);
        Flowable::create(BackpressureStrategy::Error, |mut emitter| {
            for i in 0..3 {
                emitter.next(i);
            }
            emitter.complete();
        })
        .subscribe_with(ts.clone());

        assert_eq!(ts.values(), vec![0]);
        assert_eq!(ts.error().unwrap().kind(), ErrorKind::Overflow);
        assert_eq!(ts.violations(), 0);
    }

    #[test]
    fn request_zero_is_a_protocol_error() {
        let ts = TestSubscriber::new(0);
        Flowable::range(0, 5).subscribe_with(ts.clone());
        ts.request(0);
        assert_eq!(ts.error().unwrap().kind(), ErrorKind::Protocol);
        assert!(ts.values().is_empty());
    }

    #[test]
    fn double_cancel_is_idempotent() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let c = cancels.clone();
        let ts = TestSubscriber::<u32>::new(1);
        Flowable::create(BackpressureStrategy::Buffer, move |emitter| {
            let c = c.clone();
            emitter.on_cancel(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        })
        .subscribe_with(ts.clone());

        ts.cancel();
        ts.cancel();
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
        assert!(ts.is_cancelled());
        assert!(!ts.is_terminated());
        assert_eq!(ts.violations(), 0);
    }

    #[test]
    fn emitter_sees_demand_and_cancellation() {
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        let ts = TestSubscriber::new(4);
        Flowable::create(BackpressureStrategy::Buffer, move |mut emitter| {
            s.store(emitter.requested() as usize, Ordering::SeqCst);
            while !emitter.is_cancelled() && emitter.requested() > 0 {
                emitter.next(1u8);
            }
        })
        .subscribe_with(ts.clone());

        assert_eq!(seen.load(Ordering::SeqCst), 4);
        assert_eq!(ts.value_count(), 4);
    }

    #[test]
    fn round_trip_through_observable() {
        let ts = TestSubscriber::new(2);
        Observable::range(0, 5)
            .to_flowable(BackpressureStrategy::Buffer)
            .subscribe_with(ts.clone());
        assert_eq!(ts.values(), vec![0, 1]);
        ts.request(3);
        assert_eq!(ts.values(), vec![0, 1, 2, 3, 4]);
        assert!(ts.is_completed());

        let out = Observable::range(0, 4)
            .to_flowable(BackpressureStrategy::Drop)
            .to_observable()
            .blocking_collect(Duration::from_secs(1))
            .unwrap();
        assert_eq!(out, vec![0, 1, 2, 3]);
    }
}
