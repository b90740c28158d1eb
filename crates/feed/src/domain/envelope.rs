//! Hub envelope decoding
//!
//! Every inbound text frame is one JSON object. Which key is present decides
//! what the frame is, tried in this order:
//!
//! | key | meaning                          | variant        |
//! |-----|----------------------------------|----------------|
//! | `M` | array of hub method invocations  | `Hub`          |
//! | `R` | invocation result (snapshot)     | `Response`     |
//! | `C` | message cursor / keepalive       | `Connection`   |
//! | `S` | transport state (init marker)    | `State`        |
//! | `I` | invocation id ack                | `Identifier`   |

use pitwall_core::DomainEvent;
use pitwall_ports::{FeedError, FeedResult};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Hub method carrying stream data
pub const FEED_METHOD: &str = "feed";

/// One hub method invocation inside an `M` array
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HubMessage {
    #[serde(rename = "H", default)]
    pub hub: Option<String>,
    #[serde(rename = "M", default)]
    pub method: String,
    #[serde(rename = "A", default)]
    pub args: Vec<Value>,
}

impl HubMessage {
    /// `(stream, data, timestamp)` when this is a feed invocation with usable arguments
    pub fn feed_args(&self) -> Option<(&str, &Value, Option<&Value>)> {
        if !self.method.eq_ignore_ascii_case(FEED_METHOD) || self.args.len() < 2 {
            return None;
        }
        let stream = self.args[0].as_str()?;
        Some((stream, &self.args[1], self.args.get(2)))
    }

    pub fn to_event(&self) -> Option<DomainEvent> {
        let (stream, data, timestamp) = self.feed_args()?;
        Some(DomainEvent::from_feed(stream, data.clone(), timestamp))
    }
}

/// Decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Hub(Vec<HubMessage>),
    Response(Map<String, Value>),
    Connection(Value),
    State(Value),
    Identifier(Value),
    Unrecognized(Value),
}

impl Envelope {
    /// Decode a raw text frame
    pub fn decode(text: &str) -> FeedResult<Self> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| FeedError::Decode(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> FeedResult<Self> {
        let Value::Object(mut obj) = value else {
            return Err(FeedError::Decode(format!(
                "expected JSON object, got {}",
                json_kind(&value)
            )));
        };

        if let Some(Value::Array(items)) = obj.get("M") {
            let messages = items
                .iter()
                .filter_map(|item| match HubMessage::deserialize(item) {
                    Ok(msg) => Some(msg),
                    Err(e) => {
                        tracing::debug!(error = %e, "Skipping malformed hub message");
                        None
                    }
                })
                .collect();
            return Ok(Envelope::Hub(messages));
        }

        if matches!(obj.get("R"), Some(Value::Object(_)))
            && let Some(Value::Object(result)) = obj.remove("R")
        {
            return Ok(Envelope::Response(result));
        }

        if let Some(cursor) = obj.remove("C") {
            return Ok(Envelope::Connection(cursor));
        }
        if let Some(state) = obj.remove("S") {
            return Ok(Envelope::State(state));
        }
        if let Some(id) = obj.remove("I") {
            return Ok(Envelope::Identifier(id));
        }

        Ok(Envelope::Unrecognized(Value::Object(obj)))
    }

    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Hub(_) => "hub",
            Envelope::Response(_) => "response",
            Envelope::Connection(_) => "connection",
            Envelope::State(_) => "state",
            Envelope::Identifier(_) => "identifier",
            Envelope::Unrecognized(_) => "unrecognized",
        }
    }

    /// Domain events carried by this frame.
    ///
    /// Hub frames yield one event per feed invocation, response frames one
    /// event per key of the result object. Everything else yields none.
    pub fn into_events(self) -> Vec<DomainEvent> {
        match self {
            Envelope::Hub(messages) => messages.iter().filter_map(HubMessage::to_event).collect(),
            Envelope::Response(result) => result
                .into_iter()
                .map(|(stream, data)| DomainEvent::new(stream, data))
                .collect(),
            Envelope::Connection(_)
            | Envelope::State(_)
            | Envelope::Identifier(_)
            | Envelope::Unrecognized(_) => Vec::new(),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_response_snapshot() {
        let env = Envelope::decode(r#"{"R":{"TrackStatus":{"Status":"2"}}}"#).unwrap();
        let events = env.into_events();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "trackstatus");
        assert_eq!(events[0].stream, "TrackStatus");
        assert_eq!(events[0].payload, json!({"Status": "2"}));
    }

    #[test]
    fn test_decode_hub_feed_messages() {
        let text = json!({
            "C": "d-123",
            "M": [
                {"H": "Streaming", "M": "feed", "A": ["WeatherData", {"AirTemp": "20.1"}, "2024-03-02T15:04:05.123Z"]},
                {"H": "Streaming", "M": "feed", "A": ["CarData.z", "7ZbBasdf"]},
            ]
        })
        .to_string();

        let env = Envelope::decode(&text).unwrap();
        assert_eq!(env.kind(), "hub");

        let events = env.into_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "weatherdata");
        assert_eq!(events[0].timestamp.to_rfc3339(), "2024-03-02T15:04:05.123+00:00");
        assert_eq!(events[1].event_type, "cardataz");
        assert_eq!(events[1].payload, json!("7ZbBasdf"));
    }

    #[test]
    fn test_hub_non_feed_and_short_args_dropped() {
        let text = json!({
            "M": [
                {"H": "Streaming", "M": "other", "A": ["TrackStatus", {}]},
                {"H": "Streaming", "M": "feed", "A": ["TrackStatus"]},
                {"H": "Streaming", "M": "feed", "A": [42, {}]},
                {"H": "Streaming", "M": "Feed", "A": ["LapCount", {"CurrentLap": 3}]},
            ]
        })
        .to_string();

        let events = Envelope::decode(&text).unwrap().into_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "lapcount");
    }

    #[test]
    fn test_m_takes_priority_over_r() {
        let env = Envelope::decode(r#"{"M":[],"R":{"X":1}}"#).unwrap();
        assert!(matches!(env, Envelope::Hub(ref m) if m.is_empty()));
    }

    #[test]
    fn test_non_object_r_falls_through() {
        let env = Envelope::decode(r#"{"R":true,"I":"1"}"#).unwrap();
        assert_eq!(env, Envelope::Identifier(json!("1")));
    }

    #[test]
    fn test_control_frames_yield_no_events() {
        let cases = [
            (r#"{"C":"d-1","S":1}"#, "connection"),
            (r#"{"S":1}"#, "state"),
            (r#"{"I":"1"}"#, "identifier"),
            (r#"{}"#, "unrecognized"),
        ];
        for (text, kind) in cases {
            let env = Envelope::decode(text).unwrap();
            assert_eq!(env.kind(), kind, "{text}");
            assert!(env.into_events().is_empty());
        }
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(Envelope::decode("not json"), Err(FeedError::Decode(_))));
        assert!(matches!(Envelope::decode("[1,2]"), Err(FeedError::Decode(_))));
    }
}
