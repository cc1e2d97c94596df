use crate::disposable::Disposable;
use crate::error::{RxError, RxResult};
use crate::observable::Observable;
use crate::observer::{BoxObserver, Observer};
use crate::signal::Signal;
use ahash::AHashSet;
use std::hash::Hash;
use std::sync::Arc;

type StepFn<T, R> = Box<dyn FnMut(T) -> anyhow::Result<R> + Send + 'static>;

impl<T: Send + 'static> Observable<T> {
    pub fn map<R, F>(&self, f: F) -> Observable<R>
    where
        R: Send + 'static,
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        self.try_map(move |v| Ok(f(v)))
    }

    /// Like `map`, but a failing `f` terminates the stream with an
    /// operator error and cancels the upstream.
    pub fn try_map<R, F>(&self, f: F) -> Observable<R>
    where
        R: Send + 'static,
        F: Fn(T) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.stage(move |upstream, downstream, token| {
            let f = f.clone();
            upstream.subscribe_inner(
                Box::new(MapObserver {
                    downstream,
                    f: Box::new(move |v| f(v)),
                    token: token.clone(),
                    done: false,
                }),
                token,
            );
        })
    }

    pub fn filter<P>(&self, predicate: P) -> Observable<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.try_filter(move |v| Ok(predicate(v)))
    }

    pub fn try_filter<P>(&self, predicate: P) -> Observable<T>
    where
        P: Fn(&T) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        self.stage(move |upstream, downstream, token| {
            let predicate = predicate.clone();
            upstream.subscribe_inner(
                Box::new(MapObserver {
                    downstream: Box::new(FlattenOption(downstream)),
                    f: Box::new(move |v: T| Ok(predicate(&v)?.then_some(v))),
                    token: token.clone(),
                    done: false,
                }),
                token,
            );
        })
    }

    /// Pass each value only the first time it is seen in this subscription.
    pub fn distinct(&self) -> Observable<T>
    where
        T: Eq + Hash + Clone,
    {
        self.stage(|upstream, downstream, token| {
            let mut seen = AHashSet::new();
            upstream.subscribe_inner(
                Box::new(MapObserver {
                    downstream: Box::new(FlattenOption(downstream)),
                    f: Box::new(move |v: T| Ok(seen_first(&mut seen, v))),
                    token: token.clone(),
                    done: false,
                }),
                token,
            );
        })
    }

    /// Group values into vectors of `size`. The last, possibly shorter,
    /// group is emitted on completion; an error drops it.
    pub fn buffer(&self, size: usize) -> RxResult<Observable<Vec<T>>> {
        if size < 1 {
            return Err(RxError::configuration(format!(
                "buffer size must be at least 1, got {size}"
            )));
        }
        Ok(self.stage(move |upstream, downstream, token| {
            upstream.subscribe_inner(
                Box::new(BufferObserver {
                    downstream,
                    size,
                    pending: Vec::with_capacity(size),
                }),
                token,
            );
        }))
    }
}

fn seen_first<T: Eq + Hash + Clone>(seen: &mut AHashSet<T>, v: T) -> Option<T> {
    if seen.contains(&v) {
        None
    } else {
        seen.insert(v.clone());
        Some(v)
    }
}

struct MapObserver<T, R> {
    downstream: BoxObserver<R>,
    f: StepFn<T, R>,
    token: Disposable,
    done: bool,
}

impl<T: Send + 'static, R: Send + 'static> Observer<T> for MapObserver<T, R> {
    fn on_subscribe(&mut self, disposable: Disposable) {
        self.downstream.on_subscribe(disposable);
    }

    fn on_signal(&mut self, signal: Signal<T>) {
        if self.done {
            return;
        }
        match signal {
            Signal::Next(v) => match (self.f)(v) {
                Ok(r) => self.downstream.on_next(r),
                Err(err) => {
                    self.done = true;
                    self.downstream.on_error(RxError::operator(err));
                    self.token.dispose();
                }
            },
            Signal::Error(e) => {
                self.done = true;
                self.downstream.on_error(e);
            }
            Signal::Complete => {
                self.done = true;
                self.downstream.on_complete();
            }
        }
    }
}

/// Drops `None` values; used by filtering stages built on `MapObserver`.
struct FlattenOption<T>(BoxObserver<T>);

impl<T: Send + 'static> Observer<Option<T>> for FlattenOption<T> {
    fn on_subscribe(&mut self, disposable: Disposable) {
        self.0.on_subscribe(disposable);
    }

    fn on_signal(&mut self, signal: Signal<Option<T>>) {
        match signal {
            Signal::Next(Some(v)) => self.0.on_next(v),
            Signal::Next(None) => {}
            Signal::Error(e) => self.0.on_error(e),
            Signal::Complete => self.0.on_complete(),
        }
    }
}

struct BufferObserver<T> {
    downstream: BoxObserver<Vec<T>>,
    size: usize,
    pending: Vec<T>,
}

impl<T: Send + 'static> Observer<T> for BufferObserver<T> {
    fn on_subscribe(&mut self, disposable: Disposable) {
        self.downstream.on_subscribe(disposable);
    }

    fn on_signal(&mut self, signal: Signal<T>) {
        match signal {
            Signal::Next(v) => {
                self.pending.push(v);
                if self.pending.len() == self.size {
                    let full = std::mem::replace(&mut self.pending, Vec::with_capacity(self.size));
                    self.downstream.on_next(full);
                }
            }
            Signal::Error(e) => {
                self.pending.clear();
                self.downstream.on_error(e);
            }
            Signal::Complete => {
                if !self.pending.is_empty() {
                    let last = std::mem::take(&mut self.pending);
                    self.downstream.on_next(last);
                }
                self.downstream.on_complete();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::observer::TestObserver;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(1);

    #[test]
    fn filter_even() {
        let out = Observable::range(1, 9)
            .filter(|v| v % 2 == 0)
            .blocking_collect(WAIT)
            .unwrap();
        assert_eq!(out, vec![2, 4, 6, 8]);
    }

    #[test]
    fn distinct_keeps_first_occurrence() {
        let out = Observable::from_iter(vec![1, 2, 3, 3, 5, 6, 7, 7, 9])
            .distinct()
            .blocking_collect(WAIT)
            .unwrap();
        assert_eq!(out, vec![1, 2, 3, 5, 6, 7, 9]);
    }

    #[test]
    fn distinct_state_is_per_subscription() {
        let source = Observable::from_iter(vec![1, 1, 2]).distinct();
        assert_eq!(source.blocking_collect(WAIT).unwrap(), vec![1, 2]);
        assert_eq!(source.blocking_collect(WAIT).unwrap(), vec![1, 2]);
    }

    #[test]
    fn buffer_emits_trailing_partial_group() {
        let out = Observable::range(1, 7)
            .buffer(2)
            .unwrap()
            .blocking_collect(WAIT)
            .unwrap();
        assert_eq!(out, vec![vec![1, 2], vec![3, 4], vec![5, 6], vec![7]]);
    }

    #[test]
    fn buffer_zero_is_rejected_at_construction() {
        let err = Observable::range(1, 3).buffer(0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn map_composition_matches_single_map() {
        let f = |x: i64| x * 3;
        let g = |x: i64| x - 1;
        let chained = Observable::range(0, 20).map(f).map(g).blocking_collect(WAIT).unwrap();
        let fused = Observable::range(0, 20).map(move |x| g(f(x))).blocking_collect(WAIT).unwrap();
        assert_eq!(chained, fused);
    }

    #[test]
    fn failing_map_cancels_upstream() {
        let produced = Arc::new(parking_lot::Mutex::new(0));
        let p = produced.clone();
        let source = Observable::create(move |mut e| {
            for i in 0..100 {
                if e.is_disposed() {
                    break;
                }
                *p.lock() += 1;
                e.next(i);
            }
            e.complete();
        });

        let to = TestObserver::new();
        source
            .try_map(|v: i32| if v == 3 { anyhow::bail!("bad item {v}") } else { Ok(v) })
            .subscribe_with(to.clone());

        assert_eq!(to.values(), vec![0, 1, 2]);
        assert_eq!(to.error().unwrap().kind(), ErrorKind::Operator);
        assert_eq!(*produced.lock(), 4);
        assert_eq!(to.violations(), 0);
    }

    #[test]
    fn failing_predicate_terminates() {
        let to = TestObserver::new();
        Observable::range(1, 5)
            .try_filter(|v| if *v > 2 { Err(anyhow::anyhow!("too big")) } else { Ok(true) })
            .subscribe_with(to.clone());
        assert_eq!(to.values(), vec![1, 2]);
        assert!(to.error().is_some());
    }
}
