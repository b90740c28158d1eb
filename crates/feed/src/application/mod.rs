//! Application Layer - session orchestration
//!
//! - FeedConfig: immutable client settings
//! - FeedClient: handshake, retry schedule, frame dispatch

pub mod client;
pub mod config;

pub use client::FeedClient;
pub use config::{FeedConfig, backoff_delay};
