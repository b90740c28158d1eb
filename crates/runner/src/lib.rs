//! Pitwall Runner - Live-Timing to MQTT Bridge
//!
//! Wires the components together and runs them as one service:
//!
//! - **Config**: JSON file with defaults, environment overrides, validation
//! - **Bridge**: start/stop ordering and feed supervision
//! - **Health**: read-only `/health` and `/status` endpoint
//!
//! ## Architecture
//!
//! ```text
//!        ┌──────────────────┐
//!        │  Live-timing hub │
//!        └────────┬─────────┘
//!                 │ frames
//!                 ▼
//!        ┌──────────────────┐  lifecycle  ┌──────────────────┐
//!        │   Feed client    │────────────▶│    Supervisor    │
//!        └────────┬─────────┘             │ (reconnect/exit) │
//!                 │ DomainEvent           └──────────────────┘
//!                 ▼
//!        ┌──────────────────┐             ┌──────────────────┐
//!        │    Processor     │◀────────────│  Health server   │
//!        │  (size | timer)  │   status    │ /health /status  │
//!        └────────┬─────────┘             └──────────────────┘
//!                 │ per event
//!                 ▼
//!        ┌──────────────────┐
//!        │  MQTT publisher  │──▶ <prefix>/<event_type>
//!        └──────────────────┘
//! ```

pub mod bridge;
pub mod config;
pub mod health;

// Re-export main types
pub use bridge::{Bridge, BridgeConfig, BridgeError, BridgeProbe, Supervision};
pub use config::{BridgeConfigFile, ConfigError, load_config, load_default_config};
pub use health::{HealthServer, StatusProvider, StatusReport};
