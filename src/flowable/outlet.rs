use super::strategy::BackpressureStrategy;
use super::subscription::{Demand, Subscription};
use super::{BoxSubscriber, Subscriber};
use crate::disposable::Disposable;
use crate::error::RxError;
use crate::signal::Signal;
use crate::warn_throttled;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::iter::Peekable;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Where an [`Outlet`] takes its items from.
pub(crate) trait Source<T>: Send + Sync + 'static {
    /// An item that is ready right now.
    fn next_item(&self) -> Option<T>;

    /// The terminal to deliver, once the source has nothing left. Terminals
    /// need no demand.
    fn finished(&self) -> Option<Signal<T>>;
}

/// Demand-bounded delivery from a [`Source`] to one subscriber.
///
/// Requests, producer pushes and cancellation may come from any thread; a
/// work-in-progress counter picks a single drainer and the others leave a
/// "missed" mark for it.
pub(crate) struct Outlet<T, S> {
    source: S,
    downstream: Mutex<Option<BoxSubscriber<T>>>,
    requested: AtomicU64,
    wip: AtomicUsize,
    bad_request: AtomicBool,
    token: Disposable,
}

impl<T, S> Outlet<T, S> {
    #[inline]
    pub(crate) fn requested(&self) -> u64 {
        self.requested.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn token(&self) -> &Disposable {
        &self.token
    }
}

impl<T: Send + 'static, S: Source<T>> Outlet<T, S> {
    pub(crate) fn new(source: S, token: Disposable) -> Arc<Self> {
        Arc::new(Self {
            source,
            downstream: Mutex::new(None),
            requested: AtomicU64::new(0),
            wip: AtomicUsize::new(0),
            bad_request: AtomicBool::new(false),
            token,
        })
    }

    /// Hand the subscription to `subscriber` and deliver whatever it asked
    /// for during `on_subscribe`.
    pub(crate) fn start(self: &Arc<Self>, subscriber: BoxSubscriber<T>) {
        // Held busy so requests made inside on_subscribe only leave a mark.
        self.wip.store(1, Ordering::Release);
        {
            let mut guard = self.downstream.lock();
            let downstream = guard.insert(subscriber);
            let demand: Arc<dyn Demand> = self.clone();
            downstream.on_subscribe(Subscription::new(self.token.clone(), demand));
        }
        self.drain_loop(1);
    }

    pub(crate) fn drain(&self) {
        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }
        self.drain_loop(1);
    }

    fn drain_loop(&self, mut missed: usize) {
        loop {
            if self.token.is_disposed() {
                // wip stays raised: nothing is delivered after cancellation.
                return;
            }
            if self.bad_request.load(Ordering::Acquire) {
                self.terminate(Signal::Error(RxError::Protocol(
                    "request(n) requires n >= 1",
                )));
                return;
            }

            let requested = self.requested.load(Ordering::Acquire);
            let mut emitted = 0u64;
            while emitted != requested {
                if self.token.is_disposed() {
                    return;
                }
                let Some(item) = self.source.next_item() else {
                    break;
                };
                if let Some(downstream) = self.downstream.lock().as_mut() {
                    downstream.on_next(item);
                }
                emitted += 1;
            }

            if self.token.is_disposed() {
                return;
            }
            if let Some(terminal) = self.source.finished() {
                self.terminate(terminal);
                return;
            }

            if emitted != 0 && requested != u64::MAX {
                self.requested.fetch_sub(emitted, Ordering::AcqRel);
            }
            let prev = self.wip.fetch_sub(missed, Ordering::AcqRel);
            missed = prev - missed;
            if missed == 0 {
                return;
            }
        }
    }

    fn terminate(&self, terminal: Signal<T>) {
        let downstream = self.downstream.lock().take();
        if let Some(mut downstream) = downstream {
            downstream.on_signal(terminal);
        }
        self.token.dispose();
    }
}

impl<T: Send + 'static, S: Source<T>> Demand for Outlet<T, S> {
    fn request(&self, n: u64) {
        if n == 0 {
            tracing::debug!("request(0) on a flowable subscription");
            self.bad_request.store(true, Ordering::Release);
        } else {
            let _ = self
                .requested
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| {
                    Some(r.saturating_add(n))
                });
        }
        self.drain();
    }
}

/// Items pushed by a producer, queued under a [`BackpressureStrategy`].
pub(crate) struct Buffered<T> {
    queue: Mutex<VecDeque<T>>,
    terminal: Mutex<Option<Signal<T>>>,
    done: AtomicBool,
    strategy: BackpressureStrategy,
}

impl<T> Buffered<T> {
    pub(crate) fn new(strategy: BackpressureStrategy) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            terminal: Mutex::new(None),
            done: AtomicBool::new(false),
            strategy,
        }
    }

    #[inline]
    pub(crate) fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

impl<T: Send + 'static> Source<T> for Buffered<T> {
    fn next_item(&self) -> Option<T> {
        self.queue.lock().pop_front()
    }

    fn finished(&self) -> Option<Signal<T>> {
        if !self.is_done() || !self.queue.lock().is_empty() {
            return None;
        }
        self.terminal.lock().take()
    }
}

impl<T: Send + 'static> Outlet<T, Buffered<T>> {
    /// Queue a produced item, applying the overflow policy against the
    /// demand outstanding right now.
    pub(crate) fn offer(&self, value: T) {
        if self.token.is_disposed() {
            return;
        }
        let buffered = &self.source;
        let room = usize::try_from(self.requested()).unwrap_or(usize::MAX);
        let mut dropped = false;
        let mut overflow = false;
        {
            let mut queue = buffered.queue.lock();
            if buffered.is_done() {
                return;
            }
            queue.push_back(value);
            match buffered.strategy {
                BackpressureStrategy::Buffer => {}
                BackpressureStrategy::Drop => {
                    if queue.len() > room {
                        queue.pop_back();
                        dropped = true;
                    }
                }
                BackpressureStrategy::Latest => {
                    while queue.len() > room.saturating_add(1) {
                        let older = queue.len() - 2;
                        queue.remove(older);
                    }
                }
                BackpressureStrategy::Error => {
                    if queue.len() > room {
                        queue.clear();
                        overflow = true;
                    }
                }
            }
        }

        if dropped {
            warn_throttled!(Duration::from_secs(5), "flowable item dropped, no outstanding demand");
        }
        if overflow {
            tracing::warn!(strategy = %buffered.strategy, "flowable overflow, terminating");
            self.finish(Signal::Error(RxError::Overflow));
            return;
        }
        self.drain();
    }

    /// Record the terminal. It is delivered once everything queued before
    /// it went out.
    pub(crate) fn finish(&self, terminal: Signal<T>) {
        let buffered = &self.source;
        {
            let mut slot = buffered.terminal.lock();
            if buffered.is_done() {
                return;
            }
            *slot = terminal.into_terminal();
            buffered.done.store(true, Ordering::Release);
        }
        self.drain();
    }
}

/// Pull-based source over an iterator; never queues.
pub(crate) struct Iter<I: Iterator> {
    items: Mutex<Peekable<I>>,
}

impl<I: Iterator> Iter<I> {
    pub(crate) fn new(items: I) -> Self {
        Self {
            items: Mutex::new(items.peekable()),
        }
    }
}

impl<T, I> Source<T> for Iter<I>
where
    T: Send + 'static,
    I: Iterator<Item = T> + Send + 'static,
{
    fn next_item(&self) -> Option<T> {
        self.items.lock().next()
    }

    fn finished(&self) -> Option<Signal<T>> {
        self.items.lock().peek().is_none().then_some(Signal::Complete)
    }
}
