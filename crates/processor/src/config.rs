use pitwall_core::DEFAULT_MAX_LISTENERS;
use std::time::Duration;

/// Batching configuration
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Flush as soon as this many events are queued; also the batch cap
    pub batch_size: usize,
    /// Upper bound on how long the oldest queued event waits
    pub batch_timeout: Duration,
    /// Cap on batch report listeners
    pub max_listeners: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_timeout: Duration::from_millis(1000),
            max_listeners: DEFAULT_MAX_LISTENERS,
        }
    }
}

impl ProcessorConfig {
    pub fn with_batch(mut self, batch_size: usize, batch_timeout: Duration) -> Self {
        // A zero batch would never drain
        self.batch_size = batch_size.max(1);
        self.batch_timeout = batch_timeout;
        self
    }
}
