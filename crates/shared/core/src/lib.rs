//! Pitwall Core Domain
//!
//! Pure domain types shared by every pitwall component.
//! No I/O lives here: the feed client, publisher and processor crates
//! build on these types and the ports crate wires them together.
//!
//! ```text
//!  feed ──DomainEvent──▶ processor ──DomainEvent──▶ publisher ──▶ broker
//!                                                     │
//!                                   topic::should_retain
//! ```

pub mod event;
pub mod notify;
pub mod status;
pub mod topic;

// Re-export commonly used types at crate root
pub use event::{DomainEvent, EventCategory, Timestamp, normalize_event_type};
pub use notify::{DEFAULT_MAX_LISTENERS, ListenerLimitExceeded, ListenerSet};
pub use status::BridgeStatus;
pub use topic::{RetainPolicy, event_topic, matches, should_retain};
