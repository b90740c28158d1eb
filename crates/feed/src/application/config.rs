use std::time::Duration;

use crate::domain::StreamSelection;

pub const DEFAULT_NEGOTIATE_URL: &str = "https://livetiming.formula1.com/signalr/negotiate";
pub const DEFAULT_CONNECT_URL: &str = "wss://livetiming.formula1.com/signalr/connect";
pub const DEFAULT_HUB: &str = "Streaming";
pub const DEFAULT_USER_AGENT: &str = "BestHTTP";
pub const DEFAULT_ACCEPT_ENCODING: &str = "gzip,identity";

/// Feed client configuration (application layer)
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub negotiate_url: String,
    pub connect_url: String,
    pub hub: String,
    pub streams: StreamSelection,
    /// Handshake attempts before the session is declared failed
    pub max_reconnect_attempts: u32,
    /// Delay before the first retry; doubles on each following one
    pub base_reconnect_delay: Duration,
    pub negotiate_timeout: Duration,
    pub channel_timeout: Duration,
    pub user_agent: String,
    pub accept_encoding: String,
    /// Raw frames kept for diagnostics
    pub message_window: usize,
    pub max_listeners: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            negotiate_url: DEFAULT_NEGOTIATE_URL.to_string(),
            connect_url: DEFAULT_CONNECT_URL.to_string(),
            hub: DEFAULT_HUB.to_string(),
            streams: StreamSelection::default(),
            max_reconnect_attempts: 5,
            base_reconnect_delay: Duration::from_millis(2000),
            negotiate_timeout: Duration::from_secs(10),
            channel_timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_encoding: DEFAULT_ACCEPT_ENCODING.to_string(),
            message_window: 100,
            max_listeners: pitwall_core::DEFAULT_MAX_LISTENERS,
        }
    }
}

impl FeedConfig {
    pub fn with_urls(mut self, negotiate_url: impl Into<String>, connect_url: impl Into<String>) -> Self {
        self.negotiate_url = negotiate_url.into();
        self.connect_url = connect_url.into();
        self
    }

    pub fn with_streams(mut self, streams: impl Into<StreamSelection>) -> Self {
        self.streams = streams.into();
        self
    }

    pub fn with_reconnect(mut self, max_attempts: u32, base_delay: Duration) -> Self {
        self.max_reconnect_attempts = max_attempts;
        self.base_reconnect_delay = base_delay;
        self
    }

    pub fn with_timeouts(mut self, negotiate: Duration, channel: Duration) -> Self {
        self.negotiate_timeout = negotiate;
        self.channel_timeout = channel;
        self
    }
}

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32
        .checked_shl(attempt.saturating_sub(1))
        .unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}
