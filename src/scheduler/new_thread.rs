use super::event_loop::EventLoop;
use super::trampoline::TrampolineLane;
use super::{Scheduler, SchedulerKind, Worker};
use std::sync::Arc;

/// Spawns a dedicated thread for every worker; the thread stops when the
/// worker is disposed.
pub struct NewThreadScheduler {
    prefix: String,
}

impl NewThreadScheduler {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: format!("{prefix}-new-thread"),
        }
    }
}

impl Scheduler for NewThreadScheduler {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::NewThread
    }

    fn create_worker(&self) -> Worker {
        let lane = match EventLoop::spawn(&self.prefix, None) {
            Ok(lane) => Arc::new(lane),
            Err(err) => {
                tracing::error!("failed to spawn worker thread, running on caller: {}", err);
                return Worker::new(Arc::new(TrampolineLane));
            }
        };
        let worker = Worker::new(lane.clone());
        worker.token().add_teardown(move || lane.shutdown());
        worker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::wait_until;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::time::Duration;

    #[test]
    fn each_worker_gets_its_own_thread() {
        let sched = NewThreadScheduler::new("rx-test");
        let ids = Arc::new(Mutex::new(Vec::new()));
        let workers: Vec<_> = (0..3).map(|_| sched.create_worker()).collect();
        for w in &workers {
            let ids = ids.clone();
            w.schedule(move || ids.lock().push(std::thread::current().id()));
        }
        assert!(wait_until(Duration::from_secs(2), || ids.lock().len() == 3));

        let distinct: HashSet<_> = ids.lock().iter().copied().collect();
        assert_eq!(distinct.len(), 3);
        for w in workers {
            w.dispose();
        }
    }
}
