use super::timer::TimerQueue;
use super::{Job, Lane, panic_message};
use crate::utils::try_pin_core;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use uuid::Uuid;

enum Command {
    Run(Job),
    Shutdown,
}

/// A dedicated OS thread running submitted jobs one at a time.
///
/// Immediate jobs run in submission order; delayed jobs wait in a timer
/// heap and run once due.
pub(crate) struct EventLoop {
    name: String,
    tx: Sender<Command>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl EventLoop {
    pub(crate) fn spawn(prefix: &str, core_id: Option<usize>) -> anyhow::Result<Self> {
        let id = Uuid::new_v4().simple().to_string();
        let name = format!("{}-{}", prefix, &id[..8]);
        let (tx, rx) = channel::unbounded();

        let handle = thread::Builder::new().name(name.clone()).spawn({
            let name = name.clone();
            move || {
                if let Some(core_id) = core_id {
                    match try_pin_core(core_id) {
                        Ok(core_id) => tracing::debug!("{} pinned to core {}", name, core_id),
                        Err(err) => tracing::warn!("{}: {}", name, err),
                    }
                }
                tracing::debug!("{} started", name);
                run_loop(rx);
                tracing::debug!("{} stopped", name);
            }
        })?;

        Ok(Self {
            name,
            tx,
            handle: Mutex::new(Some(handle)),
        })
    }

    #[inline]
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Stop the thread once it finishes its current job; queued jobs are
    /// dropped. Joins unless called from the loop thread itself.
    pub(crate) fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if let Err(payload) = handle.join() {
            tracing::error!("{} panicked: {}", self.name, panic_message(&payload));
        }
    }
}

impl Lane for EventLoop {
    fn submit(&self, job: Job) {
        if self.tx.send(Command::Run(job)).is_err() {
            tracing::debug!("{} is shut down, task dropped", self.name);
        }
    }
}

fn run_loop(rx: Receiver<Command>) {
    let mut timers = TimerQueue::<Instant>::new();

    loop {
        while let Some((_, job)) = timers.pop_due(Instant::now()) {
            job.run();
        }

        let cmd = match timers.next_due() {
            Some(due) => match rx.recv_timeout(due.saturating_duration_since(Instant::now())) {
                Ok(cmd) => cmd,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match rx.recv() {
                Ok(cmd) => cmd,
                Err(_) => break,
            },
        };

        match cmd {
            Command::Run(job) if job.delay.is_zero() => job.run(),
            Command::Run(job) => timers.push(Instant::now() + job.delay, job),
            Command::Shutdown => break,
        }
    }
}
