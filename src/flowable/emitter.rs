use super::outlet::{Buffered, Outlet};
use crate::disposable::Disposable;
use crate::error::RxError;
use crate::signal::Signal;
use std::fmt;
use std::sync::Arc;

/// Producer-side handle of one Flowable subscription.
///
/// The producer may push at its own pace; items beyond the consumer's
/// outstanding demand are handled by the subscription's
/// [`BackpressureStrategy`](super::BackpressureStrategy). Calls after a
/// terminal or after cancellation are ignored.
pub struct FlowableEmitter<T> {
    outlet: Arc<Outlet<T, Buffered<T>>>,
}

impl<T: Send + 'static> FlowableEmitter<T> {
    pub(crate) fn new(outlet: Arc<Outlet<T, Buffered<T>>>) -> Self {
        Self { outlet }
    }

    pub fn next(&mut self, value: T) {
        self.outlet.offer(value);
    }

    pub fn error(&mut self, err: impl Into<RxError>) {
        self.outlet.finish(Signal::Error(err.into()));
    }

    pub fn complete(&mut self) {
        self.outlet.finish(Signal::Complete);
    }

    /// True once the consumer cancelled or the subscription terminated.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.outlet.token().is_disposed()
    }

    /// Demand the consumer has granted and not yet received.
    #[inline]
    pub fn requested(&self) -> u64 {
        self.outlet.requested()
    }

    /// Register cleanup that runs on cancellation or after the terminal.
    pub fn on_cancel<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.outlet.token().add_teardown(action);
    }

    #[inline]
    pub fn token(&self) -> &Disposable {
        self.outlet.token()
    }
}

impl<T> fmt::Debug for FlowableEmitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowableEmitter")
            .field("cancelled", &self.outlet.token().is_disposed())
            .finish()
    }
}
