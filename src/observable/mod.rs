//! Cold, push-based streams without backpressure.
//!
//! An [`Observable`] is only a description of how to produce signals.
//! Each subscription runs that description from scratch with its own
//! [`Disposable`]; nothing is shared between subscriptions unless a stream
//! is explicitly made hot with [`Observable::publish`] or
//! [`Observable::share`].

mod combine;
mod create;
mod emitter;
mod ops;

pub(crate) use create::bind_worker;
pub use combine::{combine_latest, concat, merge, try_zip, zip};
pub use emitter::Emitter;
pub use ops::group_by::GroupedObservable;
pub use ops::share::ConnectableObservable;

use crate::disposable::Disposable;
use crate::error::{RxError, RxResult};
use crate::observer::{BoxObserver, LambdaObserver, Observer};
use crate::signal::Signal;
use crossbeam::channel;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

type SubscribeFn<T> = dyn Fn(BoxObserver<T>, Disposable) + Send + Sync + 'static;

pub struct Observable<T> {
    on_subscribe: Arc<SubscribeFn<T>>,
    /// Set once a `subscribe_on` sits between this stage and the source.
    subscribed_on: bool,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            on_subscribe: self.on_subscribe.clone(),
            subscribed_on: self.subscribed_on,
        }
    }
}

impl<T> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("subscribed_on", &self.subscribed_on)
            .finish()
    }
}

impl<T: Send + 'static> Observable<T> {
    /// Wrap a raw subscribe routine. The routine must call `on_subscribe`
    /// on the observer before delivering anything.
    pub(crate) fn from_fn<F>(f: F) -> Self
    where
        F: Fn(BoxObserver<T>, Disposable) + Send + Sync + 'static,
    {
        Self {
            on_subscribe: Arc::new(f),
            subscribed_on: false,
        }
    }

    /// Build a stage on top of `self`. `f` receives the upstream, the
    /// downstream observer and the token handed to this stage.
    pub(crate) fn stage<R, F>(&self, f: F) -> Observable<R>
    where
        R: Send + 'static,
        F: Fn(&Observable<T>, BoxObserver<R>, Disposable) + Send + Sync + 'static,
    {
        let upstream = self.clone();
        Observable {
            on_subscribe: Arc::new(move |observer, token| f(&upstream, observer, token)),
            subscribed_on: self.subscribed_on,
        }
    }

    #[inline]
    pub(crate) fn subscribe_inner(&self, observer: BoxObserver<T>, token: Disposable) {
        (self.on_subscribe)(observer, token);
    }

    /// Subscribe a full observer. The returned token cancels the run.
    pub fn subscribe_with<O>(&self, observer: O) -> Disposable
    where
        O: Observer<T>,
    {
        let token = Disposable::new();
        self.subscribe_inner(Box::new(observer), token.clone());
        token
    }

    /// Subscribe to values only. Errors go to the unhandled-error hook.
    pub fn subscribe<N>(&self, on_next: N) -> Disposable
    where
        N: FnMut(T) + Send + 'static,
    {
        self.subscribe_with(LambdaObserver::new(on_next))
    }

    pub fn subscribe_all<N, E, C>(&self, on_next: N, on_error: E, on_complete: C) -> Disposable
    where
        N: FnMut(T) + Send + 'static,
        E: FnMut(RxError) + Send + 'static,
        C: FnMut() + Send + 'static,
    {
        self.subscribe_with(
            LambdaObserver::new(on_next)
                .with_error(on_error)
                .with_complete(on_complete),
        )
    }

    /// Subscribe and block until the stream terminates, returning every
    /// value. Disposes the subscription and fails with
    /// [`RxError::Timeout`] if no terminal arrives within `timeout`.
    pub fn blocking_collect(&self, timeout: Duration) -> RxResult<Vec<T>> {
        let (tx, rx) = channel::unbounded();
        let token = self.subscribe_with(ChannelObserver { tx });
        let deadline = Instant::now() + timeout;
        let mut values = Vec::new();

        loop {
            match rx.recv_deadline(deadline) {
                Ok(Signal::Next(v)) => values.push(v),
                Ok(Signal::Complete) => return Ok(values),
                Ok(Signal::Error(e)) => return Err(e),
                Err(channel::RecvTimeoutError::Timeout) => {
                    token.dispose();
                    return Err(RxError::Timeout(timeout));
                }
                Err(channel::RecvTimeoutError::Disconnected) => {
                    return Err(RxError::Protocol("stream ended without a terminal signal"));
                }
            }
        }
    }
}

struct ChannelObserver<T> {
    tx: channel::Sender<Signal<T>>,
}

impl<T: Send + 'static> Observer<T> for ChannelObserver<T> {
    fn on_signal(&mut self, signal: Signal<T>) {
        let _ = self.tx.send(signal);
    }
}
