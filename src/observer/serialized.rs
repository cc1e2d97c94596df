use crate::observer::BoxObserver;
use crate::signal::Signal;
use crossbeam::queue::SegQueue;
use crossbeam::utils::CachePadded;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Single-writer delivery point shared by concurrent producers.
///
/// Producers enqueue signals from any thread; whichever caller wins the
/// work-in-progress counter drains the queue into the downstream observer
/// while the others return immediately. Re-entrant pushes made during
/// delivery are picked up by the running drain instead of recursing.
///
/// The downstream may be attached later than the first push; signals queue
/// up until then.
///
/// Stages that decide under their own lock use `enqueue` there and call
/// `drain` once the guard is dropped, so delivery never runs under a
/// stage lock.
pub(crate) struct Serialized<T> {
    queue: SegQueue<Signal<T>>,
    wip: CachePadded<AtomicUsize>,
    downstream: Mutex<Option<BoxObserver<T>>>,
    terminated: AtomicBool,
}

impl<T: 'static> Serialized<T> {
    pub(crate) fn new(downstream: BoxObserver<T>) -> Arc<Self> {
        Arc::new(Self {
            queue: SegQueue::new(),
            wip: CachePadded::new(AtomicUsize::new(0)),
            downstream: Mutex::new(Some(downstream)),
            terminated: AtomicBool::new(false),
        })
    }

    /// A delivery point with no consumer yet.
    pub(crate) fn detached() -> Arc<Self> {
        Arc::new(Self {
            queue: SegQueue::new(),
            wip: CachePadded::new(AtomicUsize::new(0)),
            downstream: Mutex::new(None),
            terminated: AtomicBool::new(false),
        })
    }

    pub(crate) fn attach(&self, downstream: BoxObserver<T>) {
        *self.downstream.lock() = Some(downstream);
        self.drain();
    }

    pub(crate) fn push(&self, signal: Signal<T>) {
        self.enqueue(signal);
        self.drain();
    }

    /// Queue a signal without delivering it; pair with `drain`.
    pub(crate) fn enqueue(&self, signal: Signal<T>) {
        if !self.terminated.load(Ordering::Acquire) {
            self.queue.push(signal);
        }
    }

    #[inline]
    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Drop everything queued and refuse further signals.
    pub(crate) fn discard(&self) {
        self.terminated.store(true, Ordering::Release);
        self.drain();
    }

    pub(crate) fn drain(&self) {
        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }

        let mut missed = 1;
        loop {
            {
                let mut guard = self.downstream.lock();
                match guard.as_mut() {
                    Some(downstream) if !self.terminated.load(Ordering::Acquire) => {
                        while let Some(signal) = self.queue.pop() {
                            let terminal = signal.is_terminal();
                            if terminal {
                                self.terminated.store(true, Ordering::Release);
                            }
                            downstream.on_signal(signal);
                            if terminal {
                                break;
                            }
                        }
                    }
                    _ => {}
                }

                if self.terminated.load(Ordering::Acquire) {
                    // Release the consumer and anything queued behind the terminal.
                    *guard = None;
                    while self.queue.pop().is_some() {}
                }
            }

            let prev = self.wip.fetch_sub(missed, Ordering::AcqRel);
            missed = prev - missed;
            if missed == 0 {
                break;
            }
        }
    }
}
