use super::event_loop::EventLoop;
use super::{Scheduler, SchedulerKind, Worker};
use std::sync::Arc;

/// One dedicated thread shared by every worker, so all submitted work is
/// serialized.
pub struct SingleScheduler {
    lane: Arc<EventLoop>,
}

impl SingleScheduler {
    pub fn new(prefix: &str) -> anyhow::Result<Self> {
        let lane = EventLoop::spawn(&format!("{prefix}-single"), None)?;
        tracing::info!("single scheduler started on {}", lane.name());
        Ok(Self {
            lane: Arc::new(lane),
        })
    }
}

impl Scheduler for SingleScheduler {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Single
    }

    fn create_worker(&self) -> Worker {
        Worker::new(self.lane.clone())
    }

    fn shutdown(&self) {
        self.lane.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::wait_until;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[test]
    fn workers_share_one_thread_in_order() {
        let sched = SingleScheduler::new("rx-test").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..10 {
            let seen = seen.clone();
            sched
                .create_worker()
                .schedule(move || seen.lock().push((i, std::thread::current().id())));
        }
        assert!(wait_until(Duration::from_secs(2), || seen.lock().len() == 10));

        let seen = seen.lock();
        let order: Vec<_> = seen.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, (0..10).collect::<Vec<_>>());
        assert!(seen.iter().all(|(_, t)| *t == seen[0].1));
        drop(seen);
        sched.shutdown();
    }
}
