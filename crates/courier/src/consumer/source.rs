use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// A message handed out by a [`MessageSource`], with the position needed to
/// commit or re-read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

impl SourceMessage {
    /// Human readable `topic/partition@offset`
    pub fn position(&self) -> String {
        format!("{}/{}@{}", self.topic, self.partition, self.offset)
    }
}

/// How a worker reacts to a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchClass {
    /// Back off briefly and try again.
    Transient,
    /// Expected during shutdown or when the fetch deadline passes; nothing to report.
    Cancelled,
    /// Log and try again on the next iteration.
    Other,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetch cancelled")]
    Cancelled,

    #[error("fetch timed out after {0:?}")]
    TimedOut(Duration),

    #[error("transient fetch error: {0}")]
    Transient(String),

    #[error("fetch failed: {0}")]
    Other(String),
}

/// Substrings of client errors that are worth retrying after a short pause.
const TRANSIENT_MARKERS: &[&str] = &[
    "multiple read calls return no data or error",
    "no data returned",
    "connection reset by peer",
    "i/o timeout",
    "broker not available",
    "broker transport failure",
    "all broker connections are down",
    "network error",
    "underflow",
];

/// Substrings that mean the caller gave up on the fetch.
const CANCELLED_MARKERS: &[&str] = &["context canceled", "deadline exceeded", "operation cancelled"];

impl FetchError {
    /// Build a fetch error from a client error message, classifying it by content.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if CANCELLED_MARKERS.iter().any(|m| lower.contains(m)) {
            FetchError::Cancelled
        } else if TRANSIENT_MARKERS.iter().any(|m| lower.contains(m)) {
            FetchError::Transient(message)
        } else {
            FetchError::Other(message)
        }
    }

    pub fn class(&self) -> FetchClass {
        match self {
            FetchError::Cancelled | FetchError::TimedOut(_) => FetchClass::Cancelled,
            FetchError::Transient(_) => FetchClass::Transient,
            FetchError::Other(_) => FetchClass::Other,
        }
    }
}

#[derive(Debug, Error)]
#[error("commit of {position} failed: {reason}")]
pub struct CommitError {
    pub position: String,
    pub reason: String,
}

impl CommitError {
    pub fn new(message: &SourceMessage, reason: impl Into<String>) -> Self {
        Self {
            position: message.position(),
            reason: reason.into(),
        }
    }
}

/// Group-coordinated message source shared by every worker of a [`super::Consumer`].
///
/// Several messages of one partition may be in flight on different workers at
/// once. A message handed out stays unfinished until it is committed, and the
/// durable commit position of a partition must never pass an unfinished offset.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Wait for the next message. Callers bound this with their own deadline.
    async fn fetch(&self) -> Result<SourceMessage, FetchError>;

    /// Mark `message` done. The partition's commit position advances to the
    /// lowest offset that is still unfinished.
    async fn commit(&self, message: &SourceMessage) -> Result<(), CommitError>;

    /// Keep `message` unfinished and hand it out again on a later fetch.
    async fn rewind(&self, message: &SourceMessage) -> Result<(), FetchError>;

    /// Leave the group and release the connection.
    async fn close(&self) -> Result<(), FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_messages() {
        for message in [
            "read tcp 10.0.0.1:5000: connection reset by peer",
            "dial tcp: i/o timeout",
            "[8] Broker Not Available: the broker is not available",
            "unexpected EOF: multiple Read calls return no data or error",
            "Local: Broker transport failure",
            "Local: All broker connections are down",
            "network error while fetching",
        ] {
            assert_eq!(
                FetchError::from_message(message).class(),
                FetchClass::Transient,
                "{message}"
            );
        }
    }

    #[test]
    fn test_cancellation_messages() {
        assert_eq!(
            FetchError::from_message("context canceled").class(),
            FetchClass::Cancelled
        );
        assert_eq!(
            FetchError::from_message("fetch: context deadline exceeded").class(),
            FetchClass::Cancelled
        );
        assert_eq!(
            FetchError::TimedOut(Duration::from_secs(30)).class(),
            FetchClass::Cancelled
        );
    }

    #[test]
    fn test_everything_else_is_other() {
        let err = FetchError::from_message("Topic authorization failed");
        assert_eq!(err.class(), FetchClass::Other);
        assert_eq!(err.to_string(), "fetch failed: Topic authorization failed");
    }

    #[test]
    fn test_position_format() {
        let message = SourceMessage {
            topic: "user-events".to_string(),
            partition: 2,
            offset: 17,
            key: None,
            payload: Vec::new(),
        };
        assert_eq!(message.position(), "user-events/2@17");
        assert_eq!(
            CommitError::new(&message, "rebalance in progress").to_string(),
            "commit of user-events/2@17 failed: rebalance in progress"
        );
    }
}
