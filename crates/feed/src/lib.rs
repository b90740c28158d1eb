//! Pitwall Feed
//!
//! Session client for the live-timing push hub.
//!
//! # Architecture
//!
//! A session is established in three steps, each with its own failure:
//!
//! ```text
//!   connect()
//!      │
//!      ▼
//! ┌─────────────┐  HTTP GET   ┌─────────────┐  WebSocket  ┌─────────────┐
//! │ Negotiating │────────────▶│   Opening   │────────────▶│ Subscribing │
//! └──────┬──────┘   token     └──────┬──────┘   upgrade   └──────┬──────┘
//!        │                           │                           │ send
//!        │ failure                   │ failure                   ▼
//!        ▼                           ▼                    ┌─────────────┐
//! ┌──────────────────────────────────────────┐            │  Connected  │
//! │ Reconnecting (base * 2^(n-1))  │  Failed │            └──────┬──────┘
//! └──────────────────────────────────────────┘                   │ drop
//!                                                                ▼
//!                                                   FeedLifecycle::Disconnected
//! ```
//!
//! Inbound frames are decoded into [`Envelope`] values and fanned out as
//! [`pitwall_core::DomainEvent`]s to every subscriber.

pub mod application;
pub mod domain;
pub mod infrastructure;

// Re-export key types
pub use application::{FeedClient, FeedConfig, backoff_delay};
pub use domain::{
    Envelope, FeedLifecycle, FeedSession, HubMessage, MessageWindow, SessionState,
    StreamSelection, StreamSet,
};
pub use infrastructure::{HubChannel, Negotiation, Negotiator};
