use crate::disposable::Disposable;
use crate::observable::Observable;
use crate::observable::create::bind_worker;
use crate::observer::{BoxObserver, Observer};
use crate::scheduler::{SchedulerRef, Worker};
use crate::signal::Signal;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

impl<T: Send + 'static> Observable<T> {
    /// Shift values and completion by `delay`. Errors skip the queue and
    /// are delivered right away, dropping values still in flight.
    pub fn delay(&self, delay: Duration, scheduler: SchedulerRef) -> Observable<T> {
        self.stage(move |upstream, mut downstream, token| {
            downstream.on_subscribe(token.clone());
            let worker = bind_worker(&scheduler, &token);
            upstream.subscribe_inner(
                Box::new(DelayObserver {
                    downstream: Arc::new(Mutex::new(downstream)),
                    worker,
                    delay,
                    token: token.clone(),
                }),
                token.child(),
            );
        })
    }
}

struct DelayObserver<T> {
    downstream: Arc<Mutex<BoxObserver<T>>>,
    worker: Worker,
    delay: Duration,
    token: Disposable,
}

impl<T: Send + 'static> Observer<T> for DelayObserver<T> {
    fn on_signal(&mut self, signal: Signal<T>) {
        let delay = match signal {
            Signal::Error(_) => Duration::ZERO,
            _ => self.delay,
        };
        let terminal = signal.is_terminal();
        let downstream = self.downstream.clone();
        let token = self.token.clone();
        self.worker.schedule_after(delay, move || {
            downstream.lock().on_signal(signal);
            if terminal {
                token.dispose();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RxError;
    use crate::observer::TestObserver;
    use crate::scheduler::TestScheduler;
    use crate::subject::PublishSubject;

    #[test]
    fn shifts_values_and_completion() {
        let sched = TestScheduler::new();
        let to = TestObserver::new();
        Observable::from_iter(vec![1, 2, 3])
            .delay(Duration::from_millis(50), Arc::new(sched.clone()))
            .subscribe_with(to.clone());

        sched.advance_by(Duration::from_millis(49));
        assert!(to.values().is_empty());
        sched.advance_by(Duration::from_millis(1));
        assert_eq!(to.values(), vec![1, 2, 3]);
        assert!(to.is_completed());
    }

    #[test]
    fn error_jumps_ahead() {
        let sched = TestScheduler::new();
        let subject = PublishSubject::new();
        let to = TestObserver::new();
        subject
            .as_observable()
            .delay(Duration::from_millis(50), Arc::new(sched.clone()))
            .subscribe_with(to.clone());

        subject.on_next(1);
        sched.advance_by(Duration::from_millis(10));
        subject.on_error(RxError::configuration("late"));
        sched.advance_by(Duration::from_millis(100));

        assert!(to.values().is_empty());
        assert!(to.error().is_some());
        assert_eq!(to.violations(), 0);
    }
}
