use crate::disposable::Disposable;
use std::fmt;
use std::sync::Arc;

/// Producer side of the demand protocol.
pub(crate) trait Demand: Send + Sync + 'static {
    /// Grant `n` more items. `n == 0` is a protocol violation the producer
    /// must report downstream.
    fn request(&self, n: u64);
}

/// Consumer handle of one Flowable subscription: cancellation plus demand.
///
/// Clones refer to the same subscription.
#[derive(Clone)]
pub struct Subscription {
    token: Disposable,
    demand: Arc<dyn Demand>,
}

impl Subscription {
    pub(crate) fn new(token: Disposable, demand: Arc<dyn Demand>) -> Self {
        Self { token, demand }
    }

    /// Allow the producer to emit up to `n` more items. `u64::MAX` means
    /// unbounded. Ignored once cancelled.
    pub fn request(&self, n: u64) {
        if self.token.is_disposed() {
            return;
        }
        self.demand.request(n);
    }

    /// Stop the subscription. Idempotent.
    pub fn cancel(&self) {
        self.token.dispose();
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_disposed()
    }

    #[inline]
    pub fn token(&self) -> &Disposable {
        &self.token
    }

    /// Same demand channel, different cancellation token.
    pub(crate) fn with_token(&self, token: Disposable) -> Self {
        Self {
            token,
            demand: self.demand.clone(),
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
