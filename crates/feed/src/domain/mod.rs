//! Domain Layer - hub protocol shapes and session rules
//!
//! Nothing here performs I/O.

pub mod envelope;
pub mod lifecycle;
pub mod protocol;
pub mod session;
pub mod streams;
pub mod window;

pub use envelope::{Envelope, HubMessage};
pub use lifecycle::FeedLifecycle;
pub use protocol::{NegotiateResponse, SubscribeRequest};
pub use session::{FeedSession, InvalidTransition, SessionState};
pub use streams::{StreamSelection, StreamSet, UnknownStreamSet};
pub use window::MessageWindow;
