use async_trait::async_trait;
use pitwall_core::DomainEvent;

use crate::error::PublishResult;

/// Downstream consumer of domain events
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn connect(&self) -> PublishResult<()>;

    /// Close the downstream session; idempotent
    async fn disconnect(&self);

    /// Publish one event; failures are isolated to that event
    async fn publish_event(&self, event: &DomainEvent) -> PublishResult<()>;

    fn is_connected(&self) -> bool;
}
