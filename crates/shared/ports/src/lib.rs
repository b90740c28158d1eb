//! Pitwall Ports
//!
//! Capability traits at the boundary between the batching processor and
//! the concrete feed client / broker publisher, plus the shared error
//! taxonomy. The processor only ever sees these traits, so tests can drive
//! it with in-memory sources and sinks.

mod error;
mod sink;
mod source;

pub use error::{FeedError, FeedResult, PublishError, PublishResult};
pub use sink::EventSink;
pub use source::EventSource;
