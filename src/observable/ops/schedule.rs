use crate::disposable::Disposable;
use crate::observable::Observable;
use crate::observable::create::bind_worker;
use crate::observer::{BoxObserver, Observer};
use crate::scheduler::{SchedulerRef, Worker};
use crate::signal::Signal;
use crossbeam::queue::SegQueue;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

impl<T: Send + 'static> Observable<T> {
    /// Run the subscription, and with it the source, on a worker of
    /// `scheduler`.
    ///
    /// Only the `subscribe_on` closest to the source has an effect; applying
    /// it again further down returns the stream unchanged.
    pub fn subscribe_on(&self, scheduler: SchedulerRef) -> Observable<T> {
        if self.subscribed_on {
            tracing::trace!("subscribe_on ignored, already applied closer to the source");
            return self.clone();
        }
        let upstream = self.clone();
        Observable {
            on_subscribe: Arc::new(move |observer, token| {
                let worker = bind_worker(&scheduler, &token);
                let upstream = upstream.clone();
                worker.schedule(move || upstream.subscribe_inner(observer, token));
            }),
            subscribed_on: true,
        }
    }

    /// Deliver everything downstream of this point on a worker of
    /// `scheduler`. Can be applied repeatedly to hop between contexts.
    pub fn observe_on(&self, scheduler: SchedulerRef) -> Observable<T> {
        self.stage(move |upstream, mut downstream, token| {
            downstream.on_subscribe(token.clone());
            let hop = Arc::new(Hop {
                queue: SegQueue::new(),
                wip: AtomicUsize::new(0),
                downstream: Mutex::new(downstream),
                worker: bind_worker(&scheduler, &token),
                token: token.clone(),
            });
            upstream.subscribe_inner(Box::new(HopObserver(hop)), token.child());
        })
    }
}

/// Queue between the producing thread and the delivering worker. A drain
/// task is scheduled only when the queue goes from idle to busy.
struct Hop<T> {
    queue: SegQueue<Signal<T>>,
    wip: AtomicUsize,
    downstream: Mutex<BoxObserver<T>>,
    worker: Worker,
    token: Disposable,
}

impl<T: Send + 'static> Hop<T> {
    fn push(self: &Arc<Self>, signal: Signal<T>) {
        self.queue.push(signal);
        if self.wip.fetch_add(1, Ordering::AcqRel) == 0 {
            let hop = self.clone();
            self.worker.schedule(move || hop.drain());
        }
    }

    fn drain(&self) {
        let mut missed = 1;
        loop {
            while let Some(signal) = self.queue.pop() {
                if self.token.is_disposed() {
                    while self.queue.pop().is_some() {}
                    return;
                }
                let terminal = signal.is_terminal();
                self.downstream.lock().on_signal(signal);
                if terminal {
                    // wip stays raised so nothing is scheduled after the terminal.
                    self.token.dispose();
                    return;
                }
            }
            let prev = self.wip.fetch_sub(missed, Ordering::AcqRel);
            missed = prev - missed;
            if missed == 0 {
                return;
            }
        }
    }
}

struct HopObserver<T>(Arc<Hop<T>>);

impl<T: Send + 'static> Observer<T> for HopObserver<T> {
    fn on_signal(&mut self, signal: Signal<T>) {
        self.0.push(signal);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::TestObserver;
    use crate::scheduler::{Scheduler, SingleScheduler, TestScheduler};
    use std::time::Duration;

    #[test]
    fn subscribe_on_runs_source_on_worker() {
        let sched = TestScheduler::new();
        let to = TestObserver::new();
        Observable::range(1, 3)
            .subscribe_on(Arc::new(sched.clone()))
            .subscribe_with(to.clone());

        assert_eq!(to.subscriptions(), 0);
        sched.trigger_actions();
        assert_eq!(to.values(), vec![1, 2, 3]);
        assert!(to.is_completed());
    }

    #[test]
    fn only_first_subscribe_on_counts() {
        let near = TestScheduler::new();
        let far = TestScheduler::new();
        let to = TestObserver::new();
        Observable::range(1, 2)
            .subscribe_on(Arc::new(near.clone()))
            .map(|v| v * 2)
            .subscribe_on(Arc::new(far.clone()))
            .subscribe_with(to.clone());

        far.trigger_actions();
        assert!(to.values().is_empty());
        near.trigger_actions();
        assert_eq!(to.values(), vec![2, 4]);
        assert_eq!(far.pending(), 0);
    }

    #[test]
    fn observe_on_moves_delivery() {
        let single = Arc::new(SingleScheduler::new("rx-test").unwrap());
        let to = TestObserver::new();
        Observable::range(0, 100)
            .observe_on(single.clone())
            .subscribe_with(to.clone());

        assert!(to.await_terminal(Duration::from_secs(2)));
        assert_eq!(to.values(), (0..100).collect::<Vec<_>>());
        assert_ne!(to.last_thread(), Some(std::thread::current().id()));
        single.shutdown();
    }

    #[test]
    fn disposing_drops_queued_signals() {
        let sched = TestScheduler::new();
        let to = TestObserver::new();
        let token = Observable::range(0, 10)
            .observe_on(Arc::new(sched.clone()))
            .subscribe_with(to.clone());
        token.dispose();
        sched.trigger_actions();
        assert!(to.values().is_empty());
    }
}
