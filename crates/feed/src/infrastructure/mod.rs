//! Infrastructure Layer - adapters to the upstream hub
//!
//! - Negotiator: HTTP token request
//! - HubChannel: WebSocket duplex channel with writer/reader tasks

pub mod channel;
pub mod negotiator;

pub use channel::{ChannelEvent, ChannelHeaders, HubChannel};
pub use negotiator::{Negotiation, Negotiator};
