//! Execution contexts for production and delivery.
//!
//! A [`Scheduler`] hands out [`Worker`]s. Tasks submitted to one worker run
//! sequentially in submission order (delayed tasks in due order), and
//! disposing the worker skips everything it still has queued. Pool kinds
//! are reached through the [`Schedulers`] registry; tests construct their
//! own instances, usually a [`TestScheduler`].

mod computation;
mod event_loop;
mod io;
mod new_thread;
mod registry;
mod single;
mod test_scheduler;
mod timer;
mod trampoline;

pub use computation::ComputationScheduler;
pub use io::IoScheduler;
pub use new_thread::NewThreadScheduler;
pub use registry::Schedulers;
pub use single::SingleScheduler;
pub use test_scheduler::TestScheduler;
pub use trampoline::TrampolineScheduler;

use crate::disposable::Disposable;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerKind {
    Computation,
    Io,
    NewThread,
    Single,
    Trampoline,
    Test,
}

impl fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchedulerKind::Computation => "computation",
            SchedulerKind::Io => "io",
            SchedulerKind::NewThread => "new_thread",
            SchedulerKind::Single => "single",
            SchedulerKind::Trampoline => "trampoline",
            SchedulerKind::Test => "test",
        };
        f.write_str(s)
    }
}

pub trait Scheduler: Send + Sync + 'static {
    fn kind(&self) -> SchedulerKind;

    /// A fresh worker. Each call may return a different execution context;
    /// tasks on one worker never overlap.
    fn create_worker(&self) -> Worker;

    /// Stop the threads owned by this scheduler. Tasks submitted afterwards
    /// are dropped.
    fn shutdown(&self) {}
}

pub type SchedulerRef = Arc<dyn Scheduler>;

/// Execution context a [`Worker`] submits to.
pub(crate) trait Lane: Send + Sync + 'static {
    fn submit(&self, job: Job);
}

type Task = Box<dyn FnOnce() + Send + 'static>;

/// One unit of scheduled work.
pub(crate) struct Job {
    pub(crate) delay: Duration,
    pub(crate) token: Disposable,
    task: Task,
}

impl Job {
    pub(crate) fn new(delay: Duration, token: Disposable, task: Task) -> Self {
        Self { delay, token, task }
    }

    /// Run the task unless its token was disposed. A panicking task is
    /// logged and does not take the executing thread down.
    pub(crate) fn run(self) {
        if self.token.is_disposed() {
            return;
        }
        if let Err(payload) = catch_unwind(AssertUnwindSafe(self.task)) {
            tracing::error!("scheduled task panicked: {}", panic_message(&payload));
        }
    }
}

pub(crate) fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic (unknown type)".into())
}

/// Sequential execution context handed out by a [`Scheduler`].
///
/// Every scheduled task gets its own token, linked under the worker's, so a
/// single task can be cancelled and disposing the worker cancels them all.
#[derive(Clone)]
pub struct Worker {
    lane: Arc<dyn Lane>,
    token: Disposable,
}

impl Worker {
    pub(crate) fn new(lane: Arc<dyn Lane>) -> Self {
        Self {
            lane,
            token: Disposable::new(),
        }
    }

    /// Run `task` as soon as the worker is free.
    pub fn schedule<F>(&self, task: F) -> Disposable
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule_after(Duration::ZERO, task)
    }

    /// Run `task` once `delay` has elapsed.
    pub fn schedule_after<F>(&self, delay: Duration, task: F) -> Disposable
    where
        F: FnOnce() + Send + 'static,
    {
        let token = self.token.child();
        if !token.is_disposed() {
            self.lane
                .submit(Job::new(delay, token.clone(), Box::new(task)));
        }
        token
    }

    /// Run `task` after `initial`, then every `period` until the returned
    /// token (or the worker) is disposed. Each run is scheduled relative to
    /// the end of the previous one.
    pub fn schedule_periodic<F>(&self, initial: Duration, period: Duration, task: F) -> Disposable
    where
        F: FnMut() + Send + 'static,
    {
        let token = self.token.child();
        if !token.is_disposed() {
            Periodic {
                lane: self.lane.clone(),
                token: token.clone(),
                period,
                task: Box::new(task),
            }
            .submit(initial);
        }
        token
    }

    /// Cancel every pending task and release the execution context.
    #[inline]
    pub fn dispose(&self) {
        self.token.dispose();
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.token.is_disposed()
    }

    /// Token disposed together with the worker.
    #[inline]
    pub fn token(&self) -> &Disposable {
        &self.token
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("is_disposed", &self.is_disposed())
            .finish()
    }
}

struct Periodic {
    lane: Arc<dyn Lane>,
    token: Disposable,
    period: Duration,
    task: Box<dyn FnMut() + Send + 'static>,
}

impl Periodic {
    fn submit(self, delay: Duration) {
        let lane = self.lane.clone();
        let token = self.token.clone();
        lane.submit(Job::new(delay, token, Box::new(move || self.tick())));
    }

    fn tick(mut self) {
        (self.task)();
        if !self.token.is_disposed() {
            let period = self.period;
            self.submit(period);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn disposed_worker_skips_pending_tasks() {
        let sched = TestScheduler::new();
        let worker = sched.create_worker();
        let hits = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let hits = hits.clone();
            worker.schedule_after(Duration::from_millis(10 * (i + 1)), move || hits.lock().push(i));
        }
        sched.advance_by(Duration::from_millis(15));
        worker.dispose();
        sched.advance_by(Duration::from_secs(1));

        assert_eq!(*hits.lock(), vec![0]);
        assert!(worker.schedule(|| {}).is_disposed());
    }

    #[test]
    fn periodic_runs_until_disposed() {
        let sched = TestScheduler::new();
        let worker = sched.create_worker();
        let count = Arc::new(Mutex::new(0));
        let c = count.clone();
        let token = worker.schedule_periodic(
            Duration::from_millis(5),
            Duration::from_millis(10),
            move || *c.lock() += 1,
        );

        sched.advance_by(Duration::from_millis(4));
        assert_eq!(*count.lock(), 0);
        sched.advance_by(Duration::from_millis(1));
        assert_eq!(*count.lock(), 1);
        sched.advance_by(Duration::from_millis(30));
        assert_eq!(*count.lock(), 4);

        token.dispose();
        sched.advance_by(Duration::from_millis(100));
        assert_eq!(*count.lock(), 4);
    }

    #[test]
    fn panicking_task_does_not_stop_the_lane() {
        let sched = SingleScheduler::new("rx-test").unwrap();
        let worker = sched.create_worker();
        let done = Arc::new(Mutex::new(false));
        let d = done.clone();
        worker.schedule(|| panic!("boom"));
        worker.schedule(move || *d.lock() = true);
        assert!(crate::utils::wait_until(Duration::from_secs(2), || *done.lock()));
        sched.shutdown();
    }
}
