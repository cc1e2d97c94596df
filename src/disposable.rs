use parking_lot::Mutex;
use std::fmt;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

type Teardown = Box<dyn FnOnce() + Send + 'static>;

/// Internal disposal state, shared via [`Arc`].
/// Children are held weakly so finished inner subscriptions are not kept
/// alive by a long-running parent.
struct DisposeState {
    disposed: AtomicBool,
    children: Mutex<Vec<Weak<DisposeState>>>,
    teardown: Mutex<Vec<Teardown>>,
}

impl DisposeState {
    #[inline]
    fn new_root() -> Arc<Self> {
        Arc::new(Self {
            disposed: AtomicBool::new(false),
            children: Mutex::new(Vec::new()),
            teardown: Mutex::new(Vec::new()),
        })
    }

    #[inline]
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        // The flag is set before the lists are taken; registrations that lose
        // the race observe it under the lock and run inline instead.
        let children = std::mem::take(&mut *self.children.lock());
        let teardown = std::mem::take(&mut *self.teardown.lock());

        for child in children {
            if let Some(child) = child.upgrade() {
                child.dispose();
            }
        }
        for action in teardown {
            action();
        }
    }

    fn link_child(&self, child: &Arc<DisposeState>) {
        let mut children = self.children.lock();
        if self.is_disposed() {
            drop(children);
            child.dispose();
            return;
        }
        children.retain(|c| c.strong_count() > 0);
        children.push(Arc::downgrade(child));
    }

    fn push_teardown(&self, action: Teardown) {
        let mut teardown = self.teardown.lock();
        if self.is_disposed() {
            drop(teardown);
            action();
            return;
        }
        teardown.push(action);
    }
}

/// Cancellation token for one production run.
///
/// A `Disposable` can be cloned cheaply and checked at any time from any
/// thread. Disposing is monotonic and idempotent: the first call flips the
/// flag, disposes all child tokens and runs registered teardown actions
/// exactly once; later calls are no-ops.
#[derive(Clone)]
pub struct Disposable {
    state: Arc<DisposeState>,
}

impl Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposable")
            .field("is_disposed", &self.is_disposed())
            .finish()
    }
}

impl Default for Disposable {
    fn default() -> Self {
        Self::new()
    }
}

impl Disposable {
    /// Create a new root token.
    #[inline]
    pub fn new() -> Self {
        Self {
            state: DisposeState::new_root(),
        }
    }

    /// A token that is already disposed.
    pub fn disposed() -> Self {
        let d = Self::new();
        d.dispose();
        d
    }

    /// Dispose this token and everything linked under it.
    #[inline]
    pub fn dispose(&self) {
        self.state.dispose();
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.state.is_disposed()
    }

    /// Create a new child token. Disposing `self` disposes the child;
    /// disposing the child leaves `self` untouched.
    pub fn child(&self) -> Self {
        let child = Self::new();
        self.state.link_child(&child.state);
        child
    }

    /// Link an existing token so it is disposed together with `self`.
    pub fn add(&self, other: &Disposable) {
        self.state.link_child(&other.state);
    }

    /// Register an action to run on disposal. Runs immediately if the token
    /// is already disposed.
    pub fn add_teardown<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.state.push_teardown(Box::new(action));
    }

    /// Sleep until the token is disposed or `total` has elapsed.
    /// Returns false if the token was disposed, true otherwise.
    pub fn sleep_cancellable(&self, total: Duration) -> bool {
        let tick = Duration::from_millis(10);
        let mut slept = Duration::ZERO;
        while slept < total {
            if self.is_disposed() {
                return false;
            }
            let step = tick.min(total - slept);
            std::thread::sleep(step);
            slept += step;
        }
        !self.is_disposed()
    }

    /// True if both handles point to the same token.
    #[inline]
    pub fn ptr_eq(&self, other: &Disposable) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn dispose_is_idempotent() {
        let hits = Arc::new(AtomicUsize::new(0));
        let d = Disposable::new();
        {
            let hits = hits.clone();
            d.add_teardown(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }
        d.dispose();
        d.dispose();
        assert!(d.is_disposed());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn parent_disposes_children_but_not_reverse() {
        let parent = Disposable::new();
        let a = parent.child();
        let b = parent.child();

        a.dispose();
        assert!(a.is_disposed());
        assert!(!parent.is_disposed());
        assert!(!b.is_disposed());

        parent.dispose();
        assert!(b.is_disposed());
    }

    #[test]
    fn late_registration_runs_inline() {
        let d = Disposable::disposed();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        d.add_teardown(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(d.child().is_disposed());
    }

    #[test]
    fn sleep_cancellable_stops_early() {
        let d = Disposable::new();
        let remote = d.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.dispose();
        });
        assert!(!d.sleep_cancellable(Duration::from_secs(5)));
        handle.join().unwrap();
    }
}
