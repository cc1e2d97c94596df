use crate::disposable::Disposable;
use crate::error::RxError;
use crate::observer::Observer;
use crate::signal::Signal;
use crate::utils::wait_until;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;

struct Recorded<T> {
    values: Vec<T>,
    errors: Vec<RxError>,
    completions: usize,
    subscriptions: usize,
    violations: usize,
    disposable: Option<Disposable>,
    last_thread: Option<ThreadId>,
}

/// Recording observer for tests.
///
/// Clones share the same recording, so one clone can be handed to
/// `subscribe_with` while the test keeps the other for assertions. It also
/// counts protocol violations (signals after a terminal, repeated
/// `on_subscribe`).
pub struct TestObserver<T> {
    inner: Arc<Mutex<Recorded<T>>>,
}

impl<T> Clone for TestObserver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for TestObserver<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TestObserver<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Recorded {
                values: Vec::new(),
                errors: Vec::new(),
                completions: 0,
                subscriptions: 0,
                violations: 0,
                disposable: None,
                last_thread: None,
            })),
        }
    }

    pub fn value_count(&self) -> usize {
        self.inner.lock().values.len()
    }

    pub fn errors(&self) -> Vec<RxError> {
        self.inner.lock().errors.clone()
    }

    pub fn error(&self) -> Option<RxError> {
        self.inner.lock().errors.first().cloned()
    }

    pub fn completions(&self) -> usize {
        self.inner.lock().completions
    }

    pub fn is_completed(&self) -> bool {
        self.completions() > 0
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

    /// Thread that delivered the most recent signal.
    pub fn last_thread(&self) -> Option<ThreadId> {
        self.inner.lock().last_thread
    }

    pub fn disposable(&self) -> Option<Disposable> {
        self.inner.lock().disposable.clone()
    }

    pub fn dispose(&self) {
        if let Some(d) = self.disposable() {
            d.dispose();
        }
    }

    /// Wait for a terminal signal. Returns false on timeout.
    pub fn await_terminal(&self, timeout: Duration) -> bool {
        wait_until(timeout, || self.is_terminated())
    }

    /// Wait until at least `count` values were received. Returns false on timeout.
    pub fn await_count(&self, count: usize, timeout: Duration) -> bool {
        wait_until(timeout, || self.value_count() >= count)
    }
}

impl<T: Clone> TestObserver<T> {
    pub fn values(&self) -> Vec<T> {
        self.inner.lock().values.clone()
    }
}

impl<T: Send + 'static> Observer<T> for TestObserver<T> {
    fn on_subscribe(&mut self, disposable: Disposable) {
        let mut r = self.inner.lock();
        r.subscriptions += 1;
        if r.subscriptions > 1 {
            r.violations += 1;
        }
        r.disposable = Some(disposable);
    }

    fn on_signal(&mut self, signal: Signal<T>) {
        let mut r = self.inner.lock();
        if r.completions > 0 || !r.errors.is_empty() {
            r.violations += 1;
            return;
        }
        r.last_thread = Some(std::thread::current().id());
        match signal {
            Signal::Next(v) => r.values.push(v),
            Signal::Error(e) => r.errors.push(e),
            Signal::Complete => r.completions += 1,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for TestObserver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.inner.lock();
        f.debug_struct("TestObserver")
            .field("values", &r.values)
            .field("errors", &r.errors)
            .field("completions", &r.completions)
            .finish()
    }
}
