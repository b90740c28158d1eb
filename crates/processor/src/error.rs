use pitwall_core::ListenerLimitExceeded;
use pitwall_ports::{FeedError, PublishError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessorError {
    /// Downstream could not be brought up; fatal for `start()`
    #[error("Sink error: {0}")]
    Sink(#[from] PublishError),

    /// Upstream handshake failed; the processor keeps running
    #[error("Source error: {0}")]
    Source(#[from] FeedError),

    #[error("Processor already running")]
    AlreadyRunning,

    #[error("Listener error: {0}")]
    Listener(#[from] ListenerLimitExceeded),
}

impl ProcessorError {
    /// Whether the processor is left running after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ProcessorError::Source(_))
    }
}

pub type ProcessorResult<T> = std::result::Result<T, ProcessorError>;
