use crate::disposable::Disposable;
use crate::observable::Observable;
use crate::observer::Observer;
use crate::signal::Signal;
use crate::subject::PublishSubject;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

struct Connection<T> {
    subject: PublishSubject<T>,
    token: Option<Disposable>,
}

/// A hot stream that starts its source only on [`connect`].
///
/// All subscribers share one run of the source and see only what is
/// emitted after they joined. Once the source terminates the connection is
/// reset: later subscribers wait for the next `connect`, which starts a
/// fresh run.
///
/// [`connect`]: ConnectableObservable::connect
pub struct ConnectableObservable<T> {
    source: Observable<T>,
    state: Arc<Mutex<Connection<T>>>,
}

impl<T> Clone for ConnectableObservable<T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            state: self.state.clone(),
        }
    }
}

impl<T> fmt::Debug for ConnectableObservable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectableObservable")
            .field("connected", &self.state.lock().token.is_some())
            .finish()
    }
}

impl<T: Clone + Send + 'static> Observable<T> {
    pub fn publish(&self) -> ConnectableObservable<T> {
        ConnectableObservable {
            source: self.clone(),
            state: Arc::new(Mutex::new(Connection {
                subject: PublishSubject::new(),
                token: None,
            })),
        }
    }

    /// Share one run of the source among all concurrent subscribers. The
    /// source starts with the first subscriber and is disposed when the
    /// last one leaves.
    pub fn share(&self) -> Observable<T> {
        self.publish().ref_count()
    }
}

impl<T: Clone + Send + 'static> ConnectableObservable<T> {
    /// Start the source if it is not running. Returns the token of the
    /// current run; disposing it disconnects every subscriber.
    pub fn connect(&self) -> Disposable {
        let (subject, token) = {
            let mut state = self.state.lock();
            if let Some(token) = &state.token
                && !token.is_disposed()
            {
                return token.clone();
            }
            let token = Disposable::new();
            state.token = Some(token.clone());
            (state.subject.clone(), token)
        };

        tracing::debug!("connectable: connecting source");
        self.source.subscribe_inner(
            Box::new(Relay {
                subject,
                state: self.state.clone(),
            }),
            token.clone(),
        );
        token
    }

    pub fn is_connected(&self) -> bool {
        self.state
            .lock()
            .token
            .as_ref()
            .is_some_and(|t| !t.is_disposed())
    }

    pub fn as_observable(&self) -> Observable<T> {
        let state = self.state.clone();
        Observable::from_fn(move |observer, token| {
            let subject = state.lock().subject.clone();
            subject.as_observable().subscribe_inner(observer, token);
        })
    }

    /// Connect when the first subscriber arrives and dispose the connection
    /// when the last one leaves.
    pub fn ref_count(&self) -> Observable<T> {
        let connectable = self.clone();
        let counter = Arc::new(Mutex::new(RefCount {
            subscribers: 0,
            connection: None,
        }));

        Observable::from_fn(move |observer, token| {
            let first = {
                let mut rc = counter.lock();
                rc.subscribers += 1;
                rc.subscribers == 1
            };
            {
                let counter = counter.clone();
                token.add_teardown(move || {
                    let stale = {
                        let mut rc = counter.lock();
                        rc.subscribers -= 1;
                        if rc.subscribers == 0 { rc.connection.take() } else { None }
                    };
                    if let Some(connection) = stale {
                        tracing::debug!("ref_count: last subscriber left, disconnecting");
                        connection.dispose();
                    }
                });
            }

            connectable.as_observable().subscribe_inner(observer, token);

            if first {
                let connection = connectable.connect();
                let mut rc = counter.lock();
                if rc.subscribers > 0 {
                    rc.connection = Some(connection);
                } else {
                    drop(rc);
                    connection.dispose();
                }
            }
        })
    }
}

struct RefCount {
    subscribers: usize,
    connection: Option<Disposable>,
}

/// Feeds the source into the current subject and resets the connection
/// once the source terminates.
struct Relay<T> {
    subject: PublishSubject<T>,
    state: Arc<Mutex<Connection<T>>>,
}

impl<T: Clone + Send + 'static> Observer<T> for Relay<T> {
    fn on_signal(&mut self, signal: Signal<T>) {
        if signal.is_terminal() {
            let mut state = self.state.lock();
            if state.subject.ptr_eq(&self.subject) {
                state.subject = PublishSubject::new();
                state.token = None;
            }
        }
        self.subject.on_signal(signal);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::TestObserver;
    use crate::scheduler::TestScheduler;
    use std::time::Duration;

    #[test]
    fn publish_waits_for_connect() {
        let source = Observable::range(1, 3).publish();
        let a = TestObserver::new();
        let b = TestObserver::new();
        source.as_observable().subscribe_with(a.clone());
        source.as_observable().subscribe_with(b.clone());
        assert!(a.values().is_empty());

        source.connect();
        assert_eq!(a.values(), vec![1, 2, 3]);
        assert_eq!(b.values(), vec![1, 2, 3]);
        assert!(a.is_completed() && b.is_completed());
        assert!(!source.is_connected());
    }

    #[test]
    fn late_subscriber_misses_earlier_values() {
        let sched = TestScheduler::new();
        let hot = Observable::interval(Duration::from_millis(10), Arc::new(sched.clone())).publish();
        let early = TestObserver::new();
        let late = TestObserver::new();

        hot.as_observable().subscribe_with(early.clone());
        let connection = hot.connect();
        sched.advance_by(Duration::from_millis(20));
        hot.as_observable().subscribe_with(late.clone());
        sched.advance_by(Duration::from_millis(20));
        connection.dispose();
        sched.advance_by(Duration::from_millis(50));

        assert_eq!(early.values(), vec![0, 1, 2, 3]);
        assert_eq!(late.values(), vec![2, 3]);
    }

    #[test]
    fn share_disconnects_after_last_subscriber() {
        let sched = TestScheduler::new();
        let shared = Observable::interval(Duration::from_millis(10), Arc::new(sched.clone())).share();
        let a = TestObserver::new();
        let b = TestObserver::new();

        let ta = shared.subscribe_with(a.clone());
        sched.advance_by(Duration::from_millis(10));
        let tb = shared.subscribe_with(b.clone());
        sched.advance_by(Duration::from_millis(10));
        ta.dispose();
        sched.advance_by(Duration::from_millis(10));
        tb.dispose();
        sched.advance_by(Duration::from_millis(50));

        assert_eq!(a.values(), vec![0, 1]);
        assert_eq!(b.values(), vec![1, 2]);
        assert_eq!(sched.pending(), 0);

        let c = TestObserver::new();
        shared.subscribe_with(c.clone());
        sched.advance_by(Duration::from_millis(10));
        assert_eq!(c.values(), vec![0]);
    }
}
