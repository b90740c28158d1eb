use std::time::Duration;
use thiserror::Error;

/// Errors raised by the upstream feed session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("Negotiation failed for {url}: {reason}")]
    Negotiation { url: String, reason: String },

    #[error("Timed out after {timeout:?} opening channel to {url}")]
    TransportTimeout { url: String, timeout: Duration },

    #[error("Channel to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("Subscription failed: {0}")]
    Subscription(String),

    #[error("Failed to decode message: {0}")]
    Decode(String),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Connection already in progress")]
    AlreadyConnecting,

    #[error("Connection attempt cancelled")]
    Cancelled,
}

impl FeedError {
    /// Errors that count as a failed handshake attempt
    pub fn counts_as_attempt(&self) -> bool {
        matches!(
            self,
            FeedError::Negotiation { .. }
                | FeedError::TransportTimeout { .. }
                | FeedError::Transport { .. }
                | FeedError::Subscription(_)
        )
    }
}

pub type FeedResult<T> = std::result::Result<T, FeedError>;

/// Errors raised by the downstream broker publisher
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("Not connected to broker")]
    NotConnected,

    #[error("Broker rejected publish to {topic}: {reason}")]
    Rejected { topic: String, reason: String },

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timed out after {0:?} waiting for broker")]
    Timeout(Duration),
}

pub type PublishResult<T> = std::result::Result<T, PublishError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_errors_count_as_attempts() {
        let negotiation = FeedError::Negotiation {
            url: "http://x".into(),
            reason: "status 500".into(),
        };
        assert!(negotiation.counts_as_attempt());
        assert!(FeedError::Subscription("closed".into()).counts_as_attempt());
        assert!(!FeedError::AlreadyConnecting.counts_as_attempt());
        assert!(!FeedError::Cancelled.counts_as_attempt());
    }

    #[test]
    fn test_error_messages_carry_context() {
        let err = FeedError::TransportTimeout {
            url: "wss://feed/connect".into(),
            timeout: Duration::from_secs(10),
        };
        let msg = err.to_string();
        assert!(msg.contains("wss://feed/connect"));
        assert!(msg.contains("10s"));
    }
}
