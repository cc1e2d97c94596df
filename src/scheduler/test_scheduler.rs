use super::timer::TimerQueue;
use super::{Job, Lane, Scheduler, SchedulerKind, Worker};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

struct VirtualClock {
    now: Duration,
    queue: TimerQueue<Duration>,
}

/// Deterministic scheduler driven by a virtual clock.
///
/// Nothing runs until the test advances time; then every task due at or
/// before the target runs on the calling thread in due order. Tasks
/// scheduled while advancing are picked up in the same pass if they fall
/// inside the window.
#[derive(Clone)]
pub struct TestScheduler {
    clock: Arc<Mutex<VirtualClock>>,
}

impl Default for TestScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TestScheduler {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(Mutex::new(VirtualClock {
                now: Duration::ZERO,
                queue: TimerQueue::new(),
            })),
        }
    }

    /// Current virtual time since creation.
    pub fn now(&self) -> Duration {
        self.clock.lock().now
    }

    /// Tasks waiting to run, including disposed ones not yet reached.
    pub fn pending(&self) -> usize {
        self.clock.lock().queue.len()
    }

    pub fn advance_by(&self, delta: Duration) {
        let target = self.now() + delta;
        self.advance_to(target);
    }

    /// Run everything due up to `target`, then set the clock to `target`.
    /// Moving backwards is ignored.
    pub fn advance_to(&self, target: Duration) {
        loop {
            let next = {
                let mut clock = self.clock.lock();
                match clock.queue.pop_due(target) {
                    Some((due, job)) => {
                        if due > clock.now {
                            clock.now = due;
                        }
                        Some(job)
                    }
                    None => {
                        if target > clock.now {
                            clock.now = target;
                        }
                        None
                    }
                }
            };
            match next {
                Some(job) => job.run(),
                None => return,
            }
        }
    }

    /// Run tasks that are already due without moving the clock.
    pub fn trigger_actions(&self) {
        self.advance_by(Duration::ZERO);
    }
}

impl Scheduler for TestScheduler {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Test
    }

    fn create_worker(&self) -> Worker {
        Worker::new(Arc::new(self.clone()))
    }

    fn shutdown(&self) {
        self.clock.lock().queue.clear();
    }
}

impl Lane for TestScheduler {
    fn submit(&self, job: Job) {
        let mut clock = self.clock.lock();
        let due = clock.now + job.delay;
        clock.queue.push(due, job);
    }
}
