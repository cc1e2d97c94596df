use crate::error::RxError;

/// One event of the emission protocol.
///
/// A subscription sees zero or more `Next` followed by at most one terminal
/// (`Error` or `Complete`); nothing is delivered after the terminal.
#[derive(Debug, Clone)]
pub enum Signal<T> {
    Next(T),
    Error(RxError),
    Complete,
}

impl<T> Signal<T> {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Signal::Next(_))
    }

    #[inline]
    pub fn is_next(&self) -> bool {
        matches!(self, Signal::Next(_))
    }

    /// Transform the payload of a `Next`, passing terminals through.
    pub fn map<R>(self, f: impl FnOnce(T) -> R) -> Signal<R> {
        match self {
            Signal::Next(v) => Signal::Next(f(v)),
            Signal::Error(e) => Signal::Error(e),
            Signal::Complete => Signal::Complete,
        }
    }

    /// Re-type a terminal signal. Returns `None` for `Next`.
    pub fn into_terminal<R>(self) -> Option<Signal<R>> {
        match self {
            Signal::Next(_) => None,
            Signal::Error(e) => Some(Signal::Error(e)),
            Signal::Complete => Some(Signal::Complete),
        }
    }
}
