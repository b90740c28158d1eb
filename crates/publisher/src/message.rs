use pitwall_core::DomainEvent;
use serde::Serialize;
use serde_json::Value;

use crate::config::PublisherConfig;

/// JSON body published for each event
#[derive(Debug, Serialize)]
pub struct EventMessage<'a> {
    #[serde(rename = "type")]
    pub event_type: &'a str,
    pub stream: &'a str,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<String>,
    pub data: &'a Value,
}

impl<'a> EventMessage<'a> {
    pub fn from_event(event: &'a DomainEvent) -> Self {
        Self {
            event_type: &event.event_type,
            stream: &event.stream,
            timestamp: event.timestamp.to_rfc3339(),
            category: event.category.map(|c| c.as_str()),
            processed_at: event.processed_at.map(|t| t.to_rfc3339()),
            data: &event.payload,
        }
    }
}

#[derive(Debug, Serialize)]
struct DiscoveryDevice<'a> {
    identifiers: [&'a str; 1],
    name: &'static str,
    manufacturer: &'static str,
    sw_version: &'static str,
}

/// Announcement published (retained) once the broker session is up
#[derive(Debug, Serialize)]
pub struct DiscoveryMessage<'a> {
    device: DiscoveryDevice<'a>,
    availability_topic: String,
    payload_available: &'a str,
    payload_not_available: &'a str,
    /// Wildcard covering every event topic
    event_topics: String,
    topic_prefix: &'a str,
}

impl<'a> DiscoveryMessage<'a> {
    pub fn new(config: &'a PublisherConfig, client_id: &'a str) -> Self {
        Self {
            device: DiscoveryDevice {
                identifiers: [client_id],
                name: "F1 Live Timing Bridge",
                manufacturer: "pitwall",
                sw_version: env!("CARGO_PKG_VERSION"),
            },
            availability_topic: config.birth_topic(),
            payload_available: &config.birth_payload,
            payload_not_available: &config.will_payload,
            event_topics: format!("{}/+", config.topic_prefix),
            topic_prefix: &config.topic_prefix,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_event() -> DomainEvent {
        let mut event = DomainEvent::new("WeatherData", json!({"AirTemp": "21.3"}));
        let queued_at = event.timestamp;
        event.enrich(queued_at);
        event
    }

    #[test]
    fn test_event_message_shape() {
        let event = sample_event();
        let body = serde_json::to_value(EventMessage::from_event(&event)).unwrap();

        assert_eq!(body["type"], "weatherdata");
        assert_eq!(body["stream"], "WeatherData");
        assert_eq!(body["category"], "weather");
        assert_eq!(body["data"], json!({"AirTemp": "21.3"}));
        assert_eq!(body["timestamp"], event.timestamp.to_rfc3339());
    }

    #[test]
    fn test_unenriched_event_omits_category() {
        let event = DomainEvent::new("TrackStatus", json!({"Status": "1"}));
        let body = serde_json::to_value(EventMessage::from_event(&event)).unwrap();
        assert!(body.get("category").is_none());
        assert!(body.get("processed_at").is_none());
    }

    #[test]
    fn test_discovery_message() {
        let config = PublisherConfig::default();
        let body = serde_json::to_value(DiscoveryMessage::new(&config, "bridge-1")).unwrap();

        assert_eq!(body["device"]["identifiers"], json!(["bridge-1"]));
        assert_eq!(body["availability_topic"], "f1/status");
        assert_eq!(body["payload_available"], "online");
        assert_eq!(body["payload_not_available"], "offline");
        assert_eq!(body["event_topics"], "f1/+");
    }
}
