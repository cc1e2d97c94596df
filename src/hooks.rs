//! Process-wide hooks.
//!
//! An error that reaches a consumer without an error callback is never
//! dropped: it is routed to the installed handler, or logged at `error`
//! level when none is installed.

use crate::error::RxError;
use arc_swap::ArcSwapOption;
use std::sync::{Arc, OnceLock};

struct ErrorHandler(Box<dyn Fn(&RxError) + Send + Sync + 'static>);

static ERROR_HANDLER: OnceLock<ArcSwapOption<ErrorHandler>> = OnceLock::new();

fn slot() -> &'static ArcSwapOption<ErrorHandler> {
    ERROR_HANDLER.get_or_init(ArcSwapOption::empty)
}

/// Install the handler that receives errors no subscriber handled.
pub fn set_error_handler<F>(handler: F)
where
    F: Fn(&RxError) + Send + Sync + 'static,
{
    slot().store(Some(Arc::new(ErrorHandler(Box::new(handler)))));
}

/// Remove the installed handler, falling back to logging.
pub fn reset_error_handler() {
    slot().store(None);
}

/// Surface an error that had no consumer-side handler.
pub fn on_error_unhandled(err: RxError) {
    match slot().load_full() {
        Some(handler) => (handler.0)(&err),
        None => tracing::error!(kind = ?err.kind(), "unhandled stream error: {}", err),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Tests touching the global handler take this lock.
    pub(crate) static HOOK_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn handler_receives_unhandled_errors() {
        let _guard = HOOK_LOCK.lock();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        set_error_handler(move |e| {
            assert!(e.to_string().contains("lost"));
            h.fetch_add(1, Ordering::SeqCst);
        });
        on_error_unhandled(RxError::upstream(anyhow::anyhow!("lost")));
        reset_error_handler();
        on_error_unhandled(RxError::upstream(anyhow::anyhow!("lost")));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
