use super::event_loop::EventLoop;
use super::{Scheduler, SchedulerKind, Worker};
use crate::config::SchedulerConfig;
use crate::utils::available_cores;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Fixed pool of event loops for CPU-bound work.
///
/// Workers are assigned to loops round-robin; a worker stays on its loop
/// for its whole life.
pub struct ComputationScheduler {
    lanes: Vec<Arc<EventLoop>>,
    cursor: AtomicUsize,
}

impl ComputationScheduler {
    pub fn new(cfg: &SchedulerConfig) -> anyhow::Result<Self> {
        let n = cfg.computation_threads();
        let cores = available_cores();
        let mut lanes = Vec::with_capacity(n);

        for i in 0..n {
            let core = cfg.pin_computation_threads.then_some(i % cores);
            let lane = EventLoop::spawn(&format!("{}-computation-{}", cfg.thread_name_prefix, i), core)?;
            lanes.push(Arc::new(lane));
        }

        tracing::info!(
            threads = n,
            pinned = cfg.pin_computation_threads,
            "computation scheduler started"
        );
        Ok(Self {
            lanes,
            cursor: AtomicUsize::new(0),
        })
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.lanes.len()
    }
}

impl Scheduler for ComputationScheduler {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Computation
    }

    fn create_worker(&self) -> Worker {
        let next = self.cursor.fetch_add(1, Ordering::Relaxed) % self.lanes.len();
        Worker::new(self.lanes[next].clone())
    }

    fn shutdown(&self) {
        for lane in &self.lanes {
            lane.shutdown();
        }
        tracing::info!("computation scheduler stopped");
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
    fn workers_spread_over_fixed_pool() {
        let cfg = SchedulerConfig {
            computation_threads: Some(2),
            ..Default::default()
        };
        let sched = ComputationScheduler::new(&cfg).unwrap();
        assert_eq!(sched.size(), 2);

        let threads = Arc::new(Mutex::new(HashSet::new()));
        for _ in 0..6 {
            let threads = threads.clone();
            sched
                .create_worker()
                .schedule(move || {
                    threads.lock().insert(std::thread::current().id());
                });
        }
        assert!(wait_until(Duration::from_secs(2), || threads.lock().len() == 2));
        sched.shutdown();
    }
}
