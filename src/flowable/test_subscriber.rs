use super::{Subscriber, Subscription};
use crate::error::RxError;
use crate::signal::Signal;
use crate::utils::wait_until;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

struct Recorded<T> {
    values: Vec<T>,
    errors: Vec<RxError>,
    completions: usize,
    subscriptions: usize,
    violations: usize,
    granted: u64,
    subscription: Option<Subscription>,
}

/// Recording subscriber with manual demand.
///
/// Requests `initial` items on subscribe; more can be granted with
/// [`TestSubscriber::request`]. Receiving more values than were granted is
/// counted as a violation, as are signals after a terminal.
pub struct TestSubscriber<T> {
    inner: Arc<Mutex<Recorded<T>>>,
    initial: u64,
}

impl<T> Clone for TestSubscriber<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            initial: self.initial,
        }
    }
}

impl<T> TestSubscriber<T> {
    pub fn new(initial: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Recorded {
                values: Vec::new(),
                errors: Vec::new(),
                completions: 0,
                subscriptions: 0,
                violations: 0,
                granted: 0,
                subscription: None,
            })),
            initial,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(u64::MAX)
    }

    /// Grant `n` more items. Passed through as is, `0` included.
    pub fn request(&self, n: u64) {
        let subscription = {
            let mut r = self.inner.lock();
            r.granted = r.granted.saturating_add(n);
            r.subscription.clone()
        };
        if let Some(s) = subscription {
            s.request(n);
        }
    }

    pub fn cancel(&self) {
        let subscription = self.inner.lock().subscription.clone();
        if let Some(s) = subscription {
            s.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner
            .lock()
            .subscription
            .as_ref()
            .is_some_and(Subscription::is_cancelled)
    }

    pub fn value_count(&self) -> usize {
        self.inner.lock().values.len()
    }

    pub fn error(&self) -> Option<RxError> {
        self.inner.lock().errors.first().cloned()
    }

    pub fn is_completed(&self) -> bool {
        self.inner.lock().completions > 0
    }

    pub fn is_terminated(&self) -> bool {
        let r = self.inner.lock();
        r.completions > 0 || !r.errors.is_empty()
    }

    pub fn subscriptions(&self) -> usize {
        self.inner.lock().subscriptions
    }

    pub fn violations(&self) -> usize {
        self.inner.lock().violations
    }

    pub fn await_terminal(&self, timeout: Duration) -> bool {
        wait_until(timeout, || self.is_terminated())
    }

    pub fn await_count(&self, count: usize, timeout: Duration) -> bool {
        wait_until(timeout, || self.value_count() >= count)
    }
}

impl<T: Clone> TestSubscriber<T> {
    pub fn values(&self) -> Vec<T> {
        self.inner.lock().values.clone()
    }
}

impl<T: Send + 'static> Subscriber<T> for TestSubscriber<T> {
    fn on_subscribe(&mut self, subscription: Subscription) {
        {
            let mut r = self.inner.lock();
            r.subscriptions += 1;
            if r.subscriptions > 1 {
                r.violations += 1;
            }
            r.subscription = Some(subscription.clone());
            r.granted = r.granted.saturating_add(self.initial);
        }
        // Outside the lock: values may arrive from inside request.
        if self.initial > 0 {
            subscription.request(self.initial);
        }
    }

    fn on_signal(&mut self, signal: Signal<T>) {
        let mut r = self.inner.lock();
        if r.completions > 0 || !r.errors.is_empty() {
            r.violations += 1;
            return;
        }
        match signal {
            Signal::Next(v) => {
                if r.values.len() as u64 >= r.granted {
                    r.violations += 1;
                }
                r.values.push(v);
            }
            Signal::Error(e) => r.errors.push(e),
            Signal::Complete => r.completions += 1,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for TestSubscriber<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.inner.lock();
        f.debug_struct("TestSubscriber")
            .field("values", &r.values)
            .field("errors", &r.errors)
            .field("completions", &r.completions)
            .field("granted", &r.granted)
            .finish()
    }
}
