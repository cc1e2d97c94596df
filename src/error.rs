// error.rs
use std::sync::Arc;
use std::time::Duration;
use std::{error::Error, fmt};

const ERR_MSG_OVERFLOW: &str = "could not emit value due to lack of requests";
const ERR_MSG_TIMEOUT: &str = "operation timed out";

pub type RxResult<T> = Result<T, RxError>;

/// Coarse classification of [`RxError`], handy for matching in tests and
/// handlers without touching the wrapped payload.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    Upstream,
    Operator,
    Overflow,
    Configuration,
    Protocol,
    Timeout,
}

/// Terminal error carried by a stream.
///
/// Errors are cheap to clone so one failure can be fanned out to every
/// subscriber of a group or a shared source.
#[derive(Debug, Clone)]
pub enum RxError {
    /// Raised by the source of the stream.
    Upstream(Arc<anyhow::Error>),
    /// Raised by a user-supplied function inside an operator.
    Operator(Arc<anyhow::Error>),
    /// Producer outran consumer demand under the `Error` backpressure policy.
    Overflow,
    /// Invalid operator parameters, reported at construction.
    Configuration(String),
    /// Misuse of the subscription contract (zero demand, second subscriber).
    Protocol(&'static str),
    /// A blocking wait did not observe a terminal signal in time.
    Timeout(Duration),
}

impl RxError {
    pub fn upstream(err: impl Into<anyhow::Error>) -> Self {
        RxError::Upstream(Arc::new(err.into()))
    }

    pub fn operator(err: impl Into<anyhow::Error>) -> Self {
        RxError::Operator(Arc::new(err.into()))
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        RxError::Configuration(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RxError::Upstream(_) => ErrorKind::Upstream,
            RxError::Operator(_) => ErrorKind::Operator,
            RxError::Overflow => ErrorKind::Overflow,
            RxError::Configuration(_) => ErrorKind::Configuration,
            RxError::Protocol(_) => ErrorKind::Protocol,
            RxError::Timeout(_) => ErrorKind::Timeout,
        }
    }

    #[inline]
    pub fn is_overflow(&self) -> bool {
        matches!(self, RxError::Overflow)
    }
}

impl fmt::Display for RxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upstream(err) => write!(f, "upstream error: {err}"),
            Self::Operator(err) => write!(f, "operator fault: {err}"),
            Self::Overflow => write!(f, "{ERR_MSG_OVERFLOW}"),
            Self::Configuration(msg) => write!(f, "invalid configuration: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol violation: {msg}"),
            Self::Timeout(after) => write!(f, "{ERR_MSG_TIMEOUT} after {after:?}"),
        }
    }
}

impl Error for RxError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RxError::Upstream(err) | RxError::Operator(err) => {
                let inner: &(dyn Error + Send + Sync + 'static) = &***err;
                Some(inner)
            }
            _ => None,
        }
    }
}

impl From<anyhow::Error> for RxError {
    fn from(err: anyhow::Error) -> Self {
        RxError::Upstream(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_kind() {
        let e = RxError::operator(anyhow::anyhow!("boom"));
        assert_eq!(e.kind(), ErrorKind::Operator);
        assert_eq!(e.to_string(), "operator fault: boom");
        assert!(e.source().is_some());

        let e: RxError = anyhow::anyhow!("io failed").into();
        assert_eq!(e.kind(), ErrorKind::Upstream);

        assert!(RxError::Overflow.is_overflow());
        assert!(RxError::configuration("n < 1").to_string().contains("n < 1"));
    }
}
