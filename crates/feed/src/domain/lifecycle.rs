use pitwall_ports::FeedError;
use std::time::Duration;

use super::session::SessionState;

/// Session lifecycle signals broadcast by the feed client
#[derive(Debug, Clone, PartialEq)]
pub enum FeedLifecycle {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    Connected,
    /// `reason` is set when the channel dropped on its own, `None` for explicit teardown
    Disconnected {
        reason: Option<String>,
    },
    Reconnecting {
        attempt: u32,
        delay: Duration,
    },
    /// Terminal: attempts exhausted
    ConnectionFailed {
        attempts: u32,
        last_error: FeedError,
    },
}

impl FeedLifecycle {
    /// Dropped after being connected, as opposed to an explicit disconnect
    pub fn is_unexpected_drop(&self) -> bool {
        matches!(self, FeedLifecycle::Disconnected { reason: Some(_) })
    }
}
