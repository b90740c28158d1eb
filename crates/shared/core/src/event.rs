use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Timestamp in UTC
pub type Timestamp = DateTime<Utc>;

/// Fallback event type for stream names with no usable characters
pub const UNKNOWN_EVENT_TYPE: &str = "unknown";

/// Coarse classification attached by the processor before publishing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Timing,
    Position,
    Telemetry,
    Weather,
    RaceControl,
    Session,
    Radio,
    Other,
}

impl EventCategory {
    /// Classify a normalized event type
    pub fn classify(event_type: &str) -> Self {
        // Most specific names first: "racecontrolmessages" must not land in Session
        if event_type.contains("racecontrol")
            || event_type.contains("trackstatus")
            || event_type.contains("rcmseries")
        {
            EventCategory::RaceControl
        } else if event_type.contains("radio") {
            EventCategory::Radio
        } else if event_type.contains("weather") {
            EventCategory::Weather
        } else if event_type.contains("cardata") {
            EventCategory::Telemetry
        } else if event_type.contains("position") {
            EventCategory::Position
        } else if event_type.contains("timing")
            || event_type.contains("lapcount")
            || event_type.contains("topthree")
            || event_type.contains("pitlane")
        {
            EventCategory::Timing
        } else if event_type.contains("session")
            || event_type.contains("clock")
            || event_type.contains("heartbeat")
            || event_type.contains("driverlist")
        {
            EventCategory::Session
        } else {
            EventCategory::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Timing => "timing",
            EventCategory::Position => "position",
            EventCategory::Telemetry => "telemetry",
            EventCategory::Weather => "weather",
            EventCategory::RaceControl => "race_control",
            EventCategory::Session => "session",
            EventCategory::Radio => "radio",
            EventCategory::Other => "other",
        }
    }
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercase the stream name and strip everything that is not ASCII alphanumeric.
///
/// `"CarData.z"` becomes `"cardataz"`. Never returns an empty string.
pub fn normalize_event_type(stream: &str) -> String {
    let normalized: String = stream
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();

    if normalized.is_empty() {
        UNKNOWN_EVENT_TYPE.to_string()
    } else {
        normalized
    }
}

/// One decoded unit of feed data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Normalized form of `stream`, used as the topic suffix
    pub event_type: String,
    /// Stream name exactly as the upstream hub sent it
    pub stream: String,
    pub timestamp: Timestamp,
    pub payload: Value,
    /// Set by the processor when the event is queued
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<EventCategory>,
}

impl DomainEvent {
    /// Create an event with an explicit timestamp
    pub fn new_with_time(stream: impl Into<String>, payload: Value, timestamp: Timestamp) -> Self {
        let stream = stream.into();
        Self {
            event_type: normalize_event_type(&stream),
            stream,
            timestamp,
            payload,
            processed_at: None,
            category: None,
        }
    }

    /// Create an event stamped with the current time
    pub fn new(stream: impl Into<String>, payload: Value) -> Self {
        Self::new_with_time(stream, payload, Utc::now())
    }

    /// Create an event from a feed message, preferring the feed's own timestamp
    pub fn from_feed(stream: impl Into<String>, payload: Value, timestamp: Option<&Value>) -> Self {
        let timestamp = timestamp
            .and_then(Value::as_str)
            .and_then(parse_feed_timestamp)
            .unwrap_or_else(Utc::now);
        Self::new_with_time(stream, payload, timestamp)
    }

    /// Attach processing metadata
    pub fn enrich(&mut self, processed_at: Timestamp) {
        self.processed_at = Some(processed_at);
        self.category = Some(EventCategory::classify(&self.event_type));
    }

    pub fn is_enriched(&self) -> bool {
        self.processed_at.is_some()
    }
}

/// Parse the timestamp format used by the feed.
///
/// Accepts RFC 3339 and the offset-less `2024-03-02T15:04:05.1234567` form,
/// which is treated as UTC.
pub fn parse_feed_timestamp(raw: &str) -> Option<Timestamp> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    let trimmed = raw.trim_end_matches('Z');
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_normalize_event_type() {
        assert_eq!(normalize_event_type("TrackStatus"), "trackstatus");
        assert_eq!(normalize_event_type("CarData.z"), "cardataz");
        assert_eq!(normalize_event_type("Weather_Data-2"), "weatherdata2");
    }

    #[test]
    fn test_normalize_empty_falls_back_to_unknown() {
        assert_eq!(normalize_event_type(""), "unknown");
        assert_eq!(normalize_event_type("._-"), "unknown");
    }

    #[test]
    fn test_classify_categories() {
        assert_eq!(EventCategory::classify("timingdata"), EventCategory::Timing);
        assert_eq!(EventCategory::classify("lapcount"), EventCategory::Timing);
        assert_eq!(EventCategory::classify("positionz"), EventCategory::Position);
        assert_eq!(EventCategory::classify("cardataz"), EventCategory::Telemetry);
        assert_eq!(EventCategory::classify("weatherdata"), EventCategory::Weather);
        assert_eq!(
            EventCategory::classify("racecontrolmessages"),
            EventCategory::RaceControl
        );
        assert_eq!(EventCategory::classify("trackstatus"), EventCategory::RaceControl);
        assert_eq!(EventCategory::classify("sessioninfo"), EventCategory::Session);
        assert_eq!(EventCategory::classify("extrapolatedclock"), EventCategory::Session);
        assert_eq!(EventCategory::classify("teamradio"), EventCategory::Radio);
        assert_eq!(EventCategory::classify("somethingelse"), EventCategory::Other);
    }

    #[test]
    fn test_from_feed_uses_feed_timestamp() {
        let ts = json!("2024-03-02T15:04:05.123Z");
        let event = DomainEvent::from_feed("TrackStatus", json!({"Status": "1"}), Some(&ts));

        let expected = Utc.with_ymd_and_hms(2024, 3, 2, 15, 4, 5).unwrap()
            + chrono::Duration::milliseconds(123);
        assert_eq!(event.timestamp, expected);
        assert_eq!(event.event_type, "trackstatus");
        assert_eq!(event.stream, "TrackStatus");
    }

    #[test]
    fn test_from_feed_unparseable_timestamp_uses_now() {
        let before = Utc::now();
        let event = DomainEvent::from_feed("Heartbeat", json!({}), Some(&json!("not a time")));
        assert!(event.timestamp >= before);
    }

    #[test]
    fn test_parse_offsetless_timestamp() {
        let ts = parse_feed_timestamp("2024-03-02T15:04:05.1234567").unwrap();
        assert_eq!(ts.timestamp(), Utc.with_ymd_and_hms(2024, 3, 2, 15, 4, 5).unwrap().timestamp());
    }

    #[test]
    fn test_enrich_sets_metadata() {
        let mut event = DomainEvent::new("WeatherData", json!({"AirTemp": "21.3"}));
        assert!(!event.is_enriched());

        let now = Utc::now();
        event.enrich(now);

        assert_eq!(event.processed_at, Some(now));
        assert_eq!(event.category, Some(EventCategory::Weather));
    }
}
