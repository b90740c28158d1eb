//! Pitwall Batching Processor
//!
//! Sits between an [`EventSource`](pitwall_ports::EventSource) and an
//! [`EventSink`](pitwall_ports::EventSink) and decouples the feed's arrival
//! rate from the broker's publish rate.
//!
//! ```text
//!  source ──▶ intake ──▶ queue ──(size | timer)──▶ flush ──▶ sink
//!                          ▲                          │
//!                          └──── remainder ───────────┘
//! ```
//!
//! A flush takes at most `batch_size` events oldest-first and publishes them
//! concurrently. Only one flush runs at a time; failed events are dropped.

pub mod config;
pub mod error;
pub mod processor;

pub use config::ProcessorConfig;
pub use error::{ProcessorError, ProcessorResult};
pub use processor::{BatchReport, EventProcessor, ProcessorStats};
