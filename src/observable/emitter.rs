use crate::disposable::Disposable;
use crate::error::RxError;
use crate::observer::BoxObserver;
use crate::signal::Signal;
use std::fmt;

/// Producer-side handle of one subscription.
///
/// Calls after a terminal or after the subscription was disposed are
/// ignored. Delivering a terminal disposes the subscription token, which
/// runs any teardown the producer registered with [`Emitter::on_dispose`].
pub struct Emitter<T> {
    downstream: Option<BoxObserver<T>>,
    token: Disposable,
}

impl<T: Send + 'static> Emitter<T> {
    pub(crate) fn new(downstream: BoxObserver<T>, token: Disposable) -> Self {
        Self {
            downstream: Some(downstream),
            token,
        }
    }

    pub fn next(&mut self, value: T) {
        if self.token.is_disposed() {
            tracing::trace!("emission after dispose ignored");
            return;
        }
        match self.downstream.as_mut() {
            Some(downstream) => downstream.on_next(value),
            None => tracing::debug!("emission after terminal ignored"),
        }
    }

    pub fn error(&mut self, err: impl Into<RxError>) {
        self.terminate(Signal::Error(err.into()));
    }

    pub fn complete(&mut self) {
        self.terminate(Signal::Complete);
    }

    /// Deliver a signal as-is.
    pub fn emit(&mut self, signal: Signal<T>) {
        match signal {
            Signal::Next(v) => self.next(v),
            terminal => self.terminate(terminal),
        }
    }

    /// True once the consumer disposed or a terminal was delivered.
    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.downstream.is_none() || self.token.is_disposed()
    }

    /// Register cleanup for the resources this producer holds. Runs on
    /// disposal or right after a terminal, whichever comes first.
    pub fn on_dispose<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.token.add_teardown(action);
    }

    #[inline]
    pub fn token(&self) -> &Disposable {
        &self.token
    }

    fn terminate(&mut self, signal: Signal<T>) {
        if self.token.is_disposed() {
            tracing::trace!("terminal after dispose ignored");
            return;
        }
        let Some(mut downstream) = self.downstream.take() else {
            tracing::debug!("second terminal ignored");
            return;
        };
        downstream.on_signal(signal);
        self.token.dispose();
    }
}

impl<T> fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("terminated", &self.downstream.is_none())
            .field("disposed", &self.token.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::TestObserver;

    #[test]
    fn nothing_after_terminal() {
        let to = TestObserver::<i32>::new();
        let token = Disposable::new();
        let mut e = Emitter::new(Box::new(to.clone()), token.clone());

        e.next(1);
        e.complete();
        e.next(2);
        e.error(RxError::Overflow);

        assert_eq!(to.values(), vec![1]);
        assert_eq!(to.completions(), 1);
        assert!(to.error().is_none());
        assert!(token.is_disposed());
        assert!(e.is_disposed());
        assert_eq!(to.violations(), 0);
    }

    #[test]
    fn nothing_after_dispose() {
        let to = TestObserver::<i32>::new();
        let token = Disposable::new();
        let mut e = Emitter::new(Box::new(to.clone()), token.clone());

        e.next(1);
        token.dispose();
        e.next(2);
        e.complete();

        assert_eq!(to.values(), vec![1]);
        assert!(!to.is_terminated());
    }
}
