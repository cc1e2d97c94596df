use super::subscription::{Demand, Subscription};
use super::{BoxSubscriber, Flowable, Subscriber};
use crate::disposable::Disposable;
use crate::error::RxError;
use crate::observable::bind_worker;
use crate::scheduler::{SchedulerRef, Worker};
use crate::signal::Signal;
use crossbeam::queue::SegQueue;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

impl<T: Send + 'static> Flowable<T> {
    pub fn map<R, F>(&self, f: F) -> Flowable<R>
    where
        R: Send + 'static,
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        self.try_map(move |v| Ok(f(v)))
    }

    /// Like `map`; an `Err` from `f` cancels upstream and ends the stream
    /// with an operator error.
    pub fn try_map<R, F>(&self, f: F) -> Flowable<R>
    where
        R: Send + 'static,
        F: Fn(T) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.stage(move |upstream, downstream, token| {
            upstream.subscribe_inner(
                Box::new(MapSubscriber {
                    downstream,
                    f: f.clone(),
                    token: token.clone(),
                    done: false,
                }),
                token,
            );
        })
    }

    /// Pass values matching `predicate`. Each rejected value is replaced by
    /// a request for one more, so downstream demand stays exact.
    pub fn filter<P>(&self, predicate: P) -> Flowable<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        self.stage(move |upstream, downstream, token| {
            upstream.subscribe_inner(
                Box::new(FilterSubscriber {
                    downstream,
                    predicate: predicate.clone(),
                    upstream: None,
                }),
                token,
            );
        })
    }

    /// First `count` values, then complete and cancel upstream. Upstream is
    /// never asked for more than `count`.
    pub fn take(&self, count: u64) -> Flowable<T> {
        if count == 0 {
            return Flowable::empty();
        }
        self.stage(move |upstream, downstream, token| {
            upstream.subscribe_inner(
                Box::new(TakeSubscriber {
                    downstream,
                    remaining: count,
                    limit: count,
                    token: token.clone(),
                }),
                token,
            );
        })
    }

    /// Run `f` when the consumer cancels before a terminal.
    pub fn do_on_cancel<F>(&self, f: F) -> Flowable<T>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.stage(move |upstream, downstream, token| {
            let terminated = Arc::new(AtomicBool::new(false));
            {
                let (f, terminated) = (f.clone(), terminated.clone());
                token.add_teardown(move || {
                    if !terminated.load(Ordering::Acquire) {
                        f();
                    }
                });
            }
            upstream.subscribe_inner(
                Box::new(MarkTerminal {
                    downstream,
                    terminated,
                }),
                token,
            );
        })
    }

    /// Subscribe to the source on a worker of `scheduler`. Only the
    /// application closest to the source counts.
    pub fn subscribe_on(&self, scheduler: SchedulerRef) -> Flowable<T> {
        if self.subscribed_on {
            return self.clone();
        }
        let upstream = self.clone();
        Flowable {
            on_subscribe: Arc::new(move |subscriber, token| {
                let worker = bind_worker(&scheduler, &token);
                let upstream = upstream.clone();
                worker.schedule(move || upstream.subscribe_inner(subscriber, token));
            }),
            subscribed_on: true,
        }
    }

    /// Deliver the subscription and every signal on a worker of
    /// `scheduler`. Requests pass straight through to upstream.
    pub fn observe_on(&self, scheduler: SchedulerRef) -> Flowable<T> {
        self.stage(move |upstream, downstream, token| {
            let hop = Arc::new(Hop {
                queue: SegQueue::new(),
                wip: AtomicUsize::new(0),
                downstream: Mutex::new(downstream),
                worker: bind_worker(&scheduler, &token),
                token: token.clone(),
            });
            upstream.subscribe_inner(Box::new(HopSubscriber(hop)), token.child());
        })
    }
}

struct MapSubscriber<R, F> {
    downstream: BoxSubscriber<R>,
    f: Arc<F>,
    token: Disposable,
    done: bool,
}

impl<T, R, F> Subscriber<T> for MapSubscriber<R, F>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> anyhow::Result<R> + Send + Sync + 'static,
{
    fn on_subscribe(&mut self, subscription: Subscription) {
        self.downstream.on_subscribe(subscription);
    }

    fn on_signal(&mut self, signal: Signal<T>) {
        if self.done {
            return;
        }
        match signal {
            Signal::Next(v) => match (self.f)(v) {
                Ok(r) => self.downstream.on_next(r),
                Err(err) => {
                    self.done = true;
                    self.downstream.on_error(RxError::operator(err));
                    self.token.dispose();
                }
            },
            Signal::Error(e) => {
                self.done = true;
                self.downstream.on_error(e);
            }
            Signal::Complete => {
                self.done = true;
                self.downstream.on_complete();
            }
        }
    }
}

struct FilterSubscriber<T, P> {
    downstream: BoxSubscriber<T>,
    predicate: Arc<P>,
    upstream: Option<Subscription>,
}

impl<T, P> Subscriber<T> for FilterSubscriber<T, P>
where
    T: Send + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    fn on_subscribe(&mut self, subscription: Subscription) {
        self.upstream = Some(subscription.clone());
        self.downstream.on_subscribe(subscription);
    }

    fn on_signal(&mut self, signal: Signal<T>) {
        match signal {
            Signal::Next(v) if (self.predicate)(&v) => self.downstream.on_next(v),
            Signal::Next(_) => {
                if let Some(upstream) = &self.upstream {
                    upstream.request(1);
                }
            }
            terminal => self.downstream.on_signal(terminal),
        }
    }
}

struct TakeSubscriber<T> {
    downstream: BoxSubscriber<T>,
    remaining: u64,
    limit: u64,
    token: Disposable,
}

impl<T: Send + 'static> Subscriber<T> for TakeSubscriber<T> {
    fn on_subscribe(&mut self, subscription: Subscription) {
        let capped: Arc<dyn Demand> = Arc::new(Capped {
            upstream: subscription.clone(),
            left: AtomicU64::new(self.limit),
        });
        self.downstream
            .on_subscribe(Subscription::new(subscription.token().clone(), capped));
    }

    fn on_signal(&mut self, signal: Signal<T>) {
        if self.remaining == 0 {
            return;
        }
        match signal {
            Signal::Next(v) => {
                self.remaining -= 1;
                self.downstream.on_next(v);
                if self.remaining == 0 {
                    self.downstream.on_complete();
                    self.token.dispose();
                }
            }
            terminal => {
                self.remaining = 0;
                self.downstream.on_signal(terminal);
            }
        }
    }
}

/// Forwards requests while never granting more than `left` in total.
struct Capped {
    upstream: Subscription,
    left: AtomicU64,
}

impl Demand for Capped {
    fn request(&self, n: u64) {
        if n == 0 {
            self.upstream.request(0);
            return;
        }
        let prev = self
            .left
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |left| {
                (left > 0).then(|| left - left.min(n))
            });
        if let Ok(left) = prev {
            self.upstream.request(left.min(n));
        }
    }
}

struct MarkTerminal<T> {
    downstream: BoxSubscriber<T>,
    terminated: Arc<AtomicBool>,
}

impl<T: Send + 'static> Subscriber<T> for MarkTerminal<T> {
    fn on_subscribe(&mut self, subscription: Subscription) {
        self.downstream.on_subscribe(subscription);
    }

    fn on_signal(&mut self, signal: Signal<T>) {
        if signal.is_terminal() {
            self.terminated.store(true, Ordering::Release);
        }
        self.downstream.on_signal(signal);
    }
}

enum Hopped<T> {
    Subscribed(Subscription),
    Signal(Signal<T>),
}

struct Hop<T> {
    queue: SegQueue<Hopped<T>>,
    wip: AtomicUsize,
    downstream: Mutex<BoxSubscriber<T>>,
    worker: Worker,
    token: Disposable,
}

impl<T: Send + 'static> Hop<T> {
    fn push(self: &Arc<Self>, item: Hopped<T>) {
        self.queue.push(item);
        if self.wip.fetch_add(1, Ordering::AcqRel) == 0 {
            let hop = self.clone();
            self.worker.schedule(move || hop.drain());
        }
    }

    fn drain(&self) {
        let mut missed = 1;
        loop {
            while let Some(item) = self.queue.pop() {
                if self.token.is_disposed() {
                    while self.queue.pop().is_some() {}
                    return;
                }
                match item {
                    Hopped::Subscribed(subscription) => {
                        self.downstream.lock().on_subscribe(subscription);
                    }
                    Hopped::Signal(signal) => {
                        let terminal = signal.is_terminal();
                        self.downstream.lock().on_signal(signal);
                        if terminal {
                            self.token.dispose();
                            return;
                        }
                    }
                }
            }
            let prev = self.wip.fetch_sub(missed, Ordering::AcqRel);
            missed = prev - missed;
            if missed == 0 {
                return;
            }
        }
    }
}

struct HopSubscriber<T>(Arc<Hop<T>>);

impl<T: Send + 'static> Subscriber<T> for HopSubscriber<T> {
    fn on_subscribe(&mut self, subscription: Subscription) {
        // Downstream cancels through this stage's token.
        let subscription = subscription.with_token(self.0.token.clone());
        self.0.push(Hopped::Subscribed(subscription));
    }

    fn on_signal(&mut self, signal: Signal<T>) {
        self.0.push(Hopped::Signal(signal));
    }
}
