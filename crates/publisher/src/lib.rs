//! Pitwall Publisher
//!
//! Republishes domain events to an MQTT broker.
//!
//! ```text
//!            connect()                         disconnect()
//!               │                                   │
//!   will: <prefix>/status = offline (retained)      ▼
//!               │                      <prefix>/status = offline
//!               ▼                                   │
//!   CONNACK ─▶ <prefix>/status = online             ▼
//!               │                               DISCONNECT
//!               ▼
//!   <prefix>/homeassistant/discovery (retained)
//!               │
//!   publish_event ─▶ <prefix>/<event_type>, retain from pattern rules
//! ```

pub mod config;
pub mod message;
pub mod publisher;

pub use config::{BrokerAddress, BrokerAddressError, PublisherConfig, qos_from_level};
pub use message::{DiscoveryMessage, EventMessage};
pub use publisher::{MqttPublisher, PublisherStats};
pub use rumqttc::QoS;
