//! Hot multicast entry point.

use crate::disposable::Disposable;
use crate::error::RxError;
use crate::observable::Observable;
use crate::observer::{Observer, Serialized};
use crate::signal::Signal;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

struct Slot<T> {
    id: u64,
    out: Arc<Serialized<T>>,
    token: Disposable,
}

struct SubjectState<T> {
    /// Copy-on-write; emission reads it without locking.
    slots: ArcSwap<Vec<Arc<Slot<T>>>>,
    /// Guards every change to `slots` and holds the terminal once reached.
    terminal: Mutex<Option<Signal<()>>>,
    next_id: AtomicU64,
}

/// Forwards every signal it receives to the observers subscribed at that
/// moment.
///
/// Nothing is replayed: a subscriber sees only what is emitted after it
/// joined. Subscribing after termination yields the terminal signal at
/// once. Callers must not emit into one subject from several threads at
/// the same time. A value emitted from inside a subscriber's callback is
/// queued and delivered once the current one returns.
pub struct PublishSubject<T> {
    state: Arc<SubjectState<T>>,
}

impl<T> Clone for PublishSubject<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Default for PublishSubject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> PublishSubject<T> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(SubjectState {
                slots: ArcSwap::from_pointee(Vec::new()),
                terminal: Mutex::new(None),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn on_next(&self, value: T) {
        let slots = self.state.slots.load();
        for slot in slots.iter() {
            if !slot.token.is_disposed() {
                slot.out.push(Signal::Next(value.clone()));
            }
        }
    }

    pub fn on_error(&self, err: RxError) {
        self.terminate(Signal::Error(err));
    }

    pub fn on_complete(&self) {
        self.terminate(Signal::Complete);
    }

    pub fn has_observers(&self) -> bool {
        !self.state.slots.load().is_empty()
    }

    pub fn observer_count(&self) -> usize {
        self.state.slots.load().len()
    }

    pub(crate) fn ptr_eq(&self, other: &PublishSubject<T>) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    pub fn is_terminated(&self) -> bool {
        self.state.terminal.lock().is_some()
    }

    /// View the subject as a stream.
    pub fn as_observable(&self) -> Observable<T> {
        let state = self.state.clone();
        Observable::from_fn(move |mut observer, token| {
            observer.on_subscribe(token.clone());

            let terminal = state.terminal.lock();
            if let Some(signal) = terminal.as_ref() {
                let signal = retype(signal);
                drop(terminal);
                observer.on_signal(signal);
                token.dispose();
                return;
            }
            if token.is_disposed() {
                return;
            }

            let id = state.next_id.fetch_add(1, Ordering::Relaxed);
            let mut slots = Vec::clone(&state.slots.load());
            slots.push(Arc::new(Slot {
                id,
                out: Serialized::new(observer),
                token: token.clone(),
            }));
            state.slots.store(Arc::new(slots));
            // Registered under the terminal lock so a concurrent terminate
            // cannot miss this slot.
            drop(terminal);

            let state = state.clone();
            token.add_teardown(move || state.remove(id));
        })
    }

    fn terminate(&self, signal: Signal<()>) {
        let slots = {
            let mut terminal = self.state.terminal.lock();
            if terminal.is_some() {
                tracing::debug!("subject already terminated, signal ignored");
                return;
            }
            *terminal = Some(retype(&signal));
            self.state.slots.swap(Arc::new(Vec::new()))
        };
        for slot in slots.iter() {
            if !slot.token.is_disposed() {
                slot.out.push(retype(&signal));
            }
            slot.token.dispose();
        }
    }
}

impl<T> SubjectState<T> {
    fn remove(&self, id: u64) {
        let _guard = self.terminal.lock();
        let current = self.slots.load();
        if current.iter().any(|s| s.id == id) {
            let rest: Vec<_> = current.iter().filter(|s| s.id != id).cloned().collect();
            self.slots.store(Arc::new(rest));
        }
    }
}

fn retype<A, B>(signal: &Signal<A>) -> Signal<B> {
    match signal {
        Signal::Error(e) => Signal::Error(e.clone()),
        _ => Signal::Complete,
    }
}

/// Lets a subject subscribe to a source and relay it.
impl<T: Clone + Send + 'static> Observer<T> for PublishSubject<T> {
    fn on_signal(&mut self, signal: Signal<T>) {
        match signal {
            Signal::Next(v) => PublishSubject::on_next(self, v),
            Signal::Error(e) => PublishSubject::on_error(self, e),
            Signal::Complete => PublishSubject::on_complete(self),
        }
    }
}

impl<T> fmt::Debug for PublishSubject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishSubject")
            .field("observers", &self.state.slots.load().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::TestObserver;

    #[test]
    fn late_subscriber_sees_only_live_values() {
        let subject = PublishSubject::new();
        let early = TestObserver::new();
        let late = TestObserver::new();

        subject.as_observable().subscribe_with(early.clone());
        subject.on_next(1);
        subject.as_observable().subscribe_with(late.clone());
        subject.on_next(2);
        subject.on_complete();

        assert_eq!(early.values(), vec![1, 2]);
        assert_eq!(late.values(), vec![2]);
        assert!(early.is_completed() && late.is_completed());
        assert!(!subject.has_observers());
    }

    #[test]
    fn disposed_subscriber_is_removed() {
        let subject = PublishSubject::new();
        let to = TestObserver::new();
        let token = subject.as_observable().subscribe_with(to.clone());
        assert_eq!(subject.observer_count(), 1);
        subject.on_next(1);
        token.dispose();
        subject.on_next(2);
        assert_eq!(subject.observer_count(), 0);
        assert_eq!(to.values(), vec![1]);
    }

    #[test]
    fn subscribe_after_terminal_gets_terminal() {
        let subject = PublishSubject::<u8>::new();
        subject.on_error(RxError::Overflow);
        subject.on_complete();
        let to = TestObserver::new();
        subject.as_observable().subscribe_with(to.clone());
        assert!(to.error().unwrap().is_overflow());
        assert!(subject.is_terminated());
    }

    #[test]
    fn subscriber_may_emit_into_its_own_subject() {
        let subject = PublishSubject::<u32>::new();
        let to = TestObserver::new();
        subject.as_observable().subscribe_with(to.clone());
        let feedback = subject.clone();
        subject.as_observable().subscribe(move |v| {
            if v < 5 {
                feedback.on_next(v + 1);
            } else {
                feedback.on_complete();
            }
        });

        subject.on_next(1);

        assert_eq!(to.values(), vec![1, 2, 3, 4, 5]);
        assert!(to.is_completed());
        assert!(!subject.has_observers());
    }
}
