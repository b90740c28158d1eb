use async_trait::async_trait;
use pitwall_core::{DomainEvent, ListenerLimitExceeded};
use tokio::sync::mpsc;

use crate::error::FeedResult;

/// Upstream producer of domain events
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Run the full connection handshake
    async fn connect(&self) -> FeedResult<()>;

    /// Tear the session down; idempotent and infallible
    async fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Register for decoded events
    fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<DomainEvent>, ListenerLimitExceeded>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Ensure trait is object-safe
    fn _assert_source_object_safe(_: &dyn EventSource) {}
}
