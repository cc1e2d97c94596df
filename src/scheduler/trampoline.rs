use super::timer::TimerQueue;
use super::{Job, Lane, Scheduler, SchedulerKind, Worker};
use std::cell::RefCell;
use std::sync::Arc;
use std::time::Instant;

struct Trampoline {
    queue: TimerQueue<Instant>,
    draining: bool,
}

thread_local! {
    static TRAMPOLINE: RefCell<Trampoline> = RefCell::new(Trampoline {
        queue: TimerQueue::new(),
        draining: false,
    });
}

/// Runs work on the submitting thread.
///
/// The outermost submission runs immediately; submissions made while a
/// task is running are queued and run after it returns, so recursion
/// becomes iteration. Delayed tasks block the calling thread until due.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrampolineScheduler;

impl TrampolineScheduler {
    pub fn new() -> Self {
        Self
    }
}

impl Scheduler for TrampolineScheduler {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Trampoline
    }

    fn create_worker(&self) -> Worker {
        Worker::new(Arc::new(TrampolineLane))
    }
}

pub(crate) struct TrampolineLane;

impl Lane for TrampolineLane {
    fn submit(&self, job: Job) {
        let owner = TRAMPOLINE.with(|t| {
            let mut t = t.borrow_mut();
            t.queue.push(Instant::now() + job.delay, job);
            !std::mem::replace(&mut t.draining, true)
        });
        if owner {
            drain();
        }
    }
}

fn drain() {
    loop {
        let next = TRAMPOLINE.with(|t| {
            let mut t = t.borrow_mut();
            let next = t.queue.pop();
            if next.is_none() {
                t.draining = false;
            }
            next
        });
        let Some((due, job)) = next else {
            return;
        };
        let wait = due.saturating_duration_since(Instant::now());
        if !wait.is_zero() && !job.token.sleep_cancellable(wait) {
            continue;
        }
        job.run();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[test]
    fn reentrant_work_runs_after_current_task() {
        let worker = TrampolineScheduler::new().create_worker();
        let log = Arc::new(Mutex::new(Vec::new()));

        let (w, l) = (worker.clone(), log.clone());
        worker.schedule(move || {
            l.lock().push("outer-start");
            let l2 = l.clone();
            w.schedule(move || l2.lock().push("inner"));
            l.lock().push("outer-end");
        });

        assert_eq!(*log.lock(), vec!["outer-start", "outer-end", "inner"]);
    }

    #[test]
    fn delayed_task_blocks_caller() {
        let worker = TrampolineScheduler::new().create_worker();
        let start = Instant::now();
        let hit = Arc::new(Mutex::new(false));
        let h = hit.clone();
        worker.schedule_after(Duration::from_millis(20), move || *h.lock() = true);
        assert!(*hit.lock());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
