mod serialized;
mod test_observer;

pub(crate) use serialized::Serialized;
pub use test_observer::TestObserver;

use crate::disposable::Disposable;
use crate::error::RxError;
use crate::hooks;
use crate::signal::Signal;

/// Consumer side of the emission protocol.
///
/// `on_subscribe` is called at most once, before any signal. Signals arrive
/// sequentially, never concurrently, and end with at most one terminal.
pub trait Observer<T>: Send + 'static {
    /// Receives the cancellation handle of this subscription.
    fn on_subscribe(&mut self, _disposable: Disposable) {}

    fn on_signal(&mut self, signal: Signal<T>);

    #[inline]
    fn on_next(&mut self, value: T) {
        self.on_signal(Signal::Next(value));
    }

    #[inline]
    fn on_error(&mut self, error: RxError) {
        self.on_signal(Signal::Error(error));
    }

    #[inline]
    fn on_complete(&mut self) {
        self.on_signal(Signal::Complete);
    }
}

pub type BoxObserver<T> = Box<dyn Observer<T>>;

impl<T, O> Observer<T> for Box<O>
where
    O: Observer<T> + ?Sized,
{
    #[inline]
    fn on_subscribe(&mut self, disposable: Disposable) {
        (**self).on_subscribe(disposable);
    }

    #[inline]
    fn on_signal(&mut self, signal: Signal<T>) {
        (**self).on_signal(signal);
    }
}

/// Forwards to `inner` and disposes `token` once a terminal went through.
pub(crate) struct DisposeOnTerminal<T> {
    pub(crate) inner: BoxObserver<T>,
    pub(crate) token: Disposable,
}

impl<T: Send + 'static> Observer<T> for DisposeOnTerminal<T> {
    fn on_subscribe(&mut self, disposable: Disposable) {
        self.inner.on_subscribe(disposable);
    }

    fn on_signal(&mut self, signal: Signal<T>) {
        let terminal = signal.is_terminal();
        self.inner.on_signal(signal);
        if terminal {
            self.token.dispose();
        }
    }
}

type NextFn<T> = Box<dyn FnMut(T) + Send + 'static>;
type ErrorFn = Box<dyn FnMut(RxError) + Send + 'static>;
type CompleteFn = Box<dyn FnMut() + Send + 'static>;

/// Observer assembled from callbacks.
///
/// Without an error callback, errors go to [`hooks::on_error_unhandled`].
pub struct LambdaObserver<T> {
    on_next: NextFn<T>,
    on_error: Option<ErrorFn>,
    on_complete: Option<CompleteFn>,
    done: bool,
}

impl<T: Send + 'static> LambdaObserver<T> {
    pub fn new<N>(on_next: N) -> Self
    where
        N: FnMut(T) + Send + 'static,
    {
        Self {
            on_next: Box::new(on_next),
            on_error: None,
            on_complete: None,
            done: false,
        }
    }

    pub fn with_error<E>(mut self, on_error: E) -> Self
    where
        E: FnMut(RxError) + Send + 'static,
    {
        self.on_error = Some(Box::new(on_error));
        self
    }

    pub fn with_complete<C>(mut self, on_complete: C) -> Self
    where
        C: FnMut() + Send + 'static,
    {
        self.on_complete = Some(Box::new(on_complete));
        self
    }
}

impl<T: Send + 'static> Observer<T> for LambdaObserver<T> {
    fn on_signal(&mut self, signal: Signal<T>) {
        if self.done {
            return;
        }
        match signal {
            Signal::Next(v) => (self.on_next)(v),
            Signal::Error(e) => {
                self.done = true;
                match self.on_error.as_mut() {
                    Some(handler) => handler(e),
                    None => hooks::on_error_unhandled(e),
                }
            }
            Signal::Complete => {
                self.done = true;
                if let Some(handler) = self.on_complete.as_mut() {
                    handler();
                }
            }
        }
    }
}
