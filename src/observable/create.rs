use super::{Emitter, Observable};
use crate::disposable::Disposable;
use crate::error::RxError;
use crate::observer::BoxObserver;
use crate::scheduler::{SchedulerRef, Worker};
use std::time::Duration;

impl<T: Send + 'static> Observable<T> {
    /// Stream driven by a producer routine.
    ///
    /// `producer` runs once per subscription with a fresh [`Emitter`]. It may
    /// emit synchronously or move the emitter elsewhere (a thread, a
    /// callback) and emit later.
    pub fn create<F>(producer: F) -> Self
    where
        F: Fn(Emitter<T>) + Send + Sync + 'static,
    {
        Self::from_fn(move |mut observer, token| {
            observer.on_subscribe(token.clone());
            if token.is_disposed() {
                return;
            }
            producer(Emitter::new(observer, token));
        })
    }

    pub fn just(value: T) -> Self
    where
        T: Clone + Sync,
    {
        Self::from_iter([value])
    }

    /// Emit every item of `items`, then complete. The iterable is cloned per
    /// subscription.
    #[allow(clippy::should_implement_trait)]
    pub fn from_iter<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
    {
        Self::create(move |mut emitter| {
            for item in items.clone() {
                if emitter.is_disposed() {
                    return;
                }
                emitter.next(item);
            }
            emitter.complete();
        })
    }

    pub fn empty() -> Self {
        Self::from_fn(|mut observer, token| {
            observer.on_subscribe(token.clone());
            Emitter::new(observer, token).complete();
        })
    }

    /// Never emits and never terminates.
    pub fn never() -> Self {
        Self::from_fn(|mut observer: BoxObserver<T>, token| {
            observer.on_subscribe(token.clone());
            // Keep the observer alive until the subscription is disposed.
            token.add_teardown(move || drop(observer));
        })
    }

    pub fn error(err: RxError) -> Self {
        Self::from_fn(move |mut observer, token| {
            observer.on_subscribe(token.clone());
            Emitter::new(observer, token).error(err.clone());
        })
    }

    /// Build the stream at subscribe time.
    pub fn defer<F>(factory: F) -> Self
    where
        F: Fn() -> Observable<T> + Send + Sync + 'static,
    {
        Self::from_fn(move |observer, token| factory().subscribe_inner(observer, token))
    }
}

impl Observable<i64> {
    /// `count` consecutive integers starting at `start`.
    pub fn range(start: i64, count: usize) -> Self {
        Self::create(move |mut emitter| {
            let mut value = start;
            for _ in 0..count {
                if emitter.is_disposed() {
                    return;
                }
                emitter.next(value);
                value = value.wrapping_add(1);
            }
            emitter.complete();
        })
    }
}

impl Observable<u64> {
    /// Emit 0, 1, 2, ... every `period` on a worker of `scheduler`.
    pub fn interval(period: Duration, scheduler: SchedulerRef) -> Self {
        ticker(0, None, period, period, scheduler)
    }

    /// Emit `count` values starting at `start`: the first after `initial`,
    /// the rest every `period`.
    pub fn interval_range(
        start: u64,
        count: u64,
        initial: Duration,
        period: Duration,
        scheduler: SchedulerRef,
    ) -> Self {
        ticker(start, Some(count), initial, period, scheduler)
    }

    /// Emit `0` after `delay`, then complete.
    pub fn timer(delay: Duration, scheduler: SchedulerRef) -> Self {
        Self::from_fn(move |mut observer, token| {
            observer.on_subscribe(token.clone());
            let worker = bind_worker(&scheduler, &token);
            let mut emitter = Emitter::new(observer, token);
            worker.schedule_after(delay, move || {
                emitter.next(0);
                emitter.complete();
            });
        })
    }
}

fn ticker(
    start: u64,
    count: Option<u64>,
    initial: Duration,
    period: Duration,
    scheduler: SchedulerRef,
) -> Observable<u64> {
    Observable::from_fn(move |mut observer, token| {
        observer.on_subscribe(token.clone());
        let mut emitter = Emitter::new(observer, token.clone());
        if count == Some(0) {
            emitter.complete();
            return;
        }

        let worker = bind_worker(&scheduler, &token);
        let mut remaining = count;
        let mut next = start;
        worker.schedule_periodic(initial, period, move || {
            emitter.next(next);
            next = next.wrapping_add(1);
            if let Some(left) = remaining.as_mut() {
                *left = left.saturating_sub(1);
                if *left == 0 {
                    emitter.complete();
                }
            }
        });
    })
}

/// A worker disposed together with `token`.
pub(crate) fn bind_worker(scheduler: &SchedulerRef, token: &Disposable) -> Worker {
    let worker = scheduler.create_worker();
    let w = worker.clone();
    token.add_teardown(move || w.dispose());
    worker
}
