use serde::{Deserialize, Serialize};
use std::fmt;

/// What a Flowable producer does with items that arrive while the consumer
/// has no outstanding demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressureStrategy {
    /// Terminate with [`RxError::Overflow`](crate::error::RxError::Overflow).
    Error,
    /// Discard the newest item.
    Drop,
    /// Keep only the most recent undelivered item.
    Latest,
    /// Queue without bound until requested.
    #[default]
    Buffer,
}

impl fmt::Display for BackpressureStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackpressureStrategy::Error => "error",
            BackpressureStrategy::Drop => "drop",
            BackpressureStrategy::Latest => "latest",
            BackpressureStrategy::Buffer => "buffer",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_names() {
        assert_eq!(BackpressureStrategy::default(), BackpressureStrategy::Buffer);
        let s: BackpressureStrategy = serde_json::from_str("\"latest\"").unwrap();
        assert_eq!(s, BackpressureStrategy::Latest);
        assert_eq!(serde_json::to_string(&BackpressureStrategy::Drop).unwrap(), "\"drop\"");
    }
}
