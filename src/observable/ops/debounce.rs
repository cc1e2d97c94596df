use crate::disposable::Disposable;
use crate::observable::Observable;
use crate::observable::create::bind_worker;
use crate::observer::{Observer, Serialized};
use crate::scheduler::{SchedulerRef, Worker};
use crate::signal::Signal;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

impl<T: Send + 'static> Observable<T> {
    /// Emit a value only after `window` passed without a newer one.
    ///
    /// Completion flushes the pending value first; an error is forwarded at
    /// once and the pending value is dropped.
    pub fn debounce(&self, window: Duration, scheduler: SchedulerRef) -> Observable<T> {
        self.stage(move |upstream, mut downstream, token| {
            downstream.on_subscribe(token.clone());
            let worker = bind_worker(&scheduler, &token);
            let observer = DebounceObserver {
                state: Arc::new(Mutex::new(DebounceState {
                    pending: None,
                    generation: 0,
                    timer: None,
                    done: false,
                })),
                out: Serialized::new(downstream),
                worker,
                window,
                token: token.clone(),
            };
            upstream.subscribe_inner(Box::new(observer), token.child());
        })
    }
}

struct DebounceState<T> {
    pending: Option<T>,
    generation: u64,
    timer: Option<Disposable>,
    done: bool,
}

struct DebounceObserver<T> {
    state: Arc<Mutex<DebounceState<T>>>,
    out: Arc<Serialized<T>>,
    worker: Worker,
    window: Duration,
    token: Disposable,
}

impl<T: Send + 'static> DebounceObserver<T> {
    fn on_value(&mut self, value: T) {
        let (generation, stale) = {
            let mut st = self.state.lock();
            if st.done {
                return;
            }
            st.generation += 1;
            st.pending = Some(value);
            (st.generation, st.timer.take())
        };
        if let Some(stale) = stale {
            stale.dispose();
        }

        // Scheduled outside the lock: a synchronous worker runs the task inline.
        let timer = self.worker.schedule_after(self.window, {
            let state = self.state.clone();
            let out = self.out.clone();
            move || {
                let mut st = state.lock();
                if st.generation != generation || st.done {
                    return;
                }
                if let Some(v) = st.pending.take() {
                    out.enqueue(Signal::Next(v));
                }
                drop(st);
                out.drain();
            }
        });

        let mut st = self.state.lock();
        if st.generation == generation && st.pending.is_some() {
            st.timer = Some(timer);
        } else {
            drop(st);
            timer.dispose();
        }
    }

    fn finish(&mut self, terminal: Signal<T>) {
        let timer = {
            let mut st = self.state.lock();
            if st.done {
                return;
            }
            st.done = true;
            let pending = st.pending.take();
            if let (Some(v), Signal::Complete) = (pending, &terminal) {
                self.out.enqueue(Signal::Next(v));
            }
            self.out.enqueue(terminal);
            st.timer.take()
        };
        self.out.drain();
        if let Some(timer) = timer {
            timer.dispose();
        }
        self.token.dispose();
    }
}

impl<T: Send + 'static> Observer<T> for DebounceObserver<T> {
    fn on_signal(&mut self, signal: Signal<T>) {
        match signal {
            Signal::Next(v) => self.on_value(v),
            terminal => self.finish(terminal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::TestObserver;
    use crate::scheduler::TestScheduler;
    use crate::subject::PublishSubject;

    fn setup() -> (TestScheduler, PublishSubject<u32>, TestObserver<u32>) {
        let sched = TestScheduler::new();
        let subject = PublishSubject::new();
        let to = TestObserver::new();
        subject
            .as_observable()
            .debounce(Duration::from_millis(100), Arc::new(sched.clone()))
            .subscribe_with(to.clone());
        (sched, subject, to)
    }

    #[test]
    fn emits_latest_after_quiet_window() {
        let (sched, subject, to) = setup();

        subject.on_next(1);
        sched.advance_by(Duration::from_millis(50));
        subject.on_next(2);
        sched.advance_by(Duration::from_millis(99));
        assert!(to.values().is_empty());

        sched.advance_by(Duration::from_millis(1));
        assert_eq!(to.values(), vec![2]);

        subject.on_next(3);
        sched.advance_by(Duration::from_millis(200));
        assert_eq!(to.values(), vec![2, 3]);
    }

    #[test]
    fn complete_flushes_pending() {
        let (sched, subject, to) = setup();
        subject.on_next(7);
        subject.on_complete();
        assert_eq!(to.values(), vec![7]);
        assert!(to.is_completed());

        sched.advance_by(Duration::from_secs(1));
        assert_eq!(to.values(), vec![7]);
        assert_eq!(to.violations(), 0);
    }

    #[test]
    fn error_discards_pending() {
        let (sched, subject, to) = setup();
        subject.on_next(7);
        subject.on_error(crate::error::RxError::Overflow);
        sched.advance_by(Duration::from_secs(1));
        assert!(to.values().is_empty());
        assert!(to.error().unwrap().is_overflow());
    }

    #[test]
    fn downstream_may_feed_the_source() {
        let sched = TestScheduler::new();
        let subject = PublishSubject::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let feedback = subject.clone();
        let sink = seen.clone();
        subject
            .as_observable()
            .debounce(Duration::from_millis(100), Arc::new(sched.clone()))
            .subscribe(move |v| {
                sink.lock().push(v);
                if v == 1 {
                    feedback.on_next(2);
                }
            });

        subject.on_next(1);
        sched.advance_by(Duration::from_millis(100));
        assert_eq!(*seen.lock(), vec![1]);

        sched.advance_by(Duration::from_millis(100));
        assert_eq!(*seen.lock(), vec![1, 2]);
    }
}
