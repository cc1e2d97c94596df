use super::event_loop::EventLoop;
use super::trampoline::TrampolineLane;
use super::{Scheduler, SchedulerKind, Worker};
use crate::config::SchedulerConfig;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

struct IoPool {
    idle: Mutex<VecDeque<(Arc<EventLoop>, Instant)>>,
    all: Mutex<Vec<Weak<EventLoop>>>,
    keep_alive: Duration,
    prefix: String,
    shut: AtomicBool,
}

impl IoPool {
    fn release(&self, lane: Arc<EventLoop>) {
        if self.shut.load(Ordering::Acquire) {
            lane.shutdown();
            return;
        }
        tracing::trace!("{} returned to io pool", lane.name());
        self.idle.lock().push_back((lane, Instant::now()));
    }
}

/// Elastic pool for blocking work.
///
/// A worker takes an idle thread or spawns a new one; disposing the worker
/// returns the thread to the pool, where it is kept for the configured
/// keep-alive before being stopped.
pub struct IoScheduler {
    pool: Arc<IoPool>,
}

impl IoScheduler {
    pub fn new(cfg: &SchedulerConfig) -> Self {
        Self {
            pool: Arc::new(IoPool {
                idle: Mutex::new(VecDeque::new()),
                all: Mutex::new(Vec::new()),
                keep_alive: cfg.io_keep_alive(),
                prefix: format!("{}-io", cfg.thread_name_prefix),
                shut: AtomicBool::new(false),
            }),
        }
    }

    /// Threads currently parked for reuse.
    pub fn idle_count(&self) -> usize {
        self.pool.idle.lock().len()
    }

    fn acquire(&self) -> anyhow::Result<Arc<EventLoop>> {
        self.purge_expired();
        if let Some((lane, _)) = self.pool.idle.lock().pop_front() {
            return Ok(lane);
        }
        let lane = Arc::new(EventLoop::spawn(&self.pool.prefix, None)?);
        let mut all = self.pool.all.lock();
        all.retain(|l| l.strong_count() > 0);
        all.push(Arc::downgrade(&lane));
        tracing::debug!(threads = all.len(), "io pool spawned {}", lane.name());
        Ok(lane)
    }

    fn purge_expired(&self) {
        let now = Instant::now();
        let expired: Vec<Arc<EventLoop>> = {
            let mut idle = self.pool.idle.lock();
            let mut expired = Vec::new();
            while let Some((_, since)) = idle.front() {
                if now.duration_since(*since) < self.pool.keep_alive {
                    break;
                }
                if let Some((lane, _)) = idle.pop_front() {
                    expired.push(lane);
                }
            }
            expired
        };
        for lane in expired {
            tracing::debug!("io thread {} expired", lane.name());
            lane.shutdown();
        }
    }
}

impl Scheduler for IoScheduler {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Io
    }

    fn create_worker(&self) -> Worker {
        let lane = match self.acquire() {
            Ok(lane) => lane,
            Err(err) => {
                tracing::error!("io pool failed to spawn a thread, running on caller: {}", err);
                return Worker::new(Arc::new(TrampolineLane));
            }
        };

        let worker = Worker::new(lane.clone());
        let pool = self.pool.clone();
        worker.token().add_teardown(move || pool.release(lane));
        worker
    }

    fn shutdown(&self) {
        self.pool.shut.store(true, Ordering::Release);
        let idle: Vec<_> = self.pool.idle.lock().drain(..).collect();
        for (lane, _) in idle {
            lane.shutdown();
        }
        let busy: Vec<_> = self.pool.all.lock().drain(..).collect();
        for lane in busy.iter().filter_map(Weak::upgrade) {
            lane.shutdown();
        }
        tracing::info!("io scheduler stopped");
    }
}
