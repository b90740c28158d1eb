//! Retain-pattern matching for outbound topics
//!
//! Patterns use MQTT-style wildcards: `+` matches exactly one level and a
//! trailing `#` matches any number of remaining levels. Patterns are written
//! relative to the topic prefix, so `weather/#` with prefix `f1` applies to
//! `f1/weather/...`.

use serde::{Deserialize, Serialize};

const LEVEL_SEPARATOR: char = '/';
const SINGLE_LEVEL: &str = "+";
const MULTI_LEVEL: &str = "#";

/// Build the outbound topic for an event type
pub fn event_topic(prefix: &str, event_type: &str) -> String {
    format!("{}/{}", prefix, event_type)
}

/// Check whether a prefix-less topic matches a retain pattern.
///
/// Invalid patterns (a `#` anywhere but the last level) never match.
pub fn matches(topic: &str, pattern: &str) -> bool {
    if topic == pattern {
        return true;
    }

    let topic_parts: Vec<&str> = topic.split(LEVEL_SEPARATOR).collect();

    if pattern.contains(MULTI_LEVEL) {
        if pattern != MULTI_LEVEL && !pattern.ends_with("/#") {
            tracing::warn!(pattern = %pattern, "Invalid retain pattern: '#' must be the last level");
            return false;
        }

        let pattern_parts: Vec<&str> = pattern.split(LEVEL_SEPARATOR).collect();
        let prefix_parts = &pattern_parts[..pattern_parts.len() - 1];

        // "#" inside a level ("a#/#") is still invalid
        if prefix_parts.iter().any(|p| p.contains(MULTI_LEVEL)) {
            tracing::warn!(pattern = %pattern, "Invalid retain pattern: '#' must be the last level");
            return false;
        }

        // `<=` keeps "a/#" matching the bare parent "a"
        if prefix_parts.len() > topic_parts.len() {
            return false;
        }

        return prefix_parts
            .iter()
            .zip(topic_parts.iter())
            .all(|(p, t)| *p == SINGLE_LEVEL || p == t);
    }

    let pattern_parts: Vec<&str> = pattern.split(LEVEL_SEPARATOR).collect();
    if pattern_parts.len() != topic_parts.len() {
        return false;
    }

    pattern_parts
        .iter()
        .zip(topic_parts.iter())
        .all(|(p, t)| *p == SINGLE_LEVEL || p == t)
}

/// Decide the retain flag for a fully-qualified topic.
///
/// The first matching pattern wins; with no match the global default applies.
pub fn should_retain<S: AsRef<str>>(
    full_topic: &str,
    patterns: &[S],
    global_default: bool,
    topic_prefix: &str,
) -> bool {
    if patterns.is_empty() {
        return global_default;
    }

    let stripped = strip_prefix(full_topic, topic_prefix);

    if patterns.iter().any(|p| matches(stripped, p.as_ref())) {
        return true;
    }

    global_default
}

fn strip_prefix<'a>(full_topic: &'a str, prefix: &str) -> &'a str {
    if prefix.is_empty() {
        return full_topic;
    }
    full_topic
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix(LEVEL_SEPARATOR))
        .unwrap_or(full_topic)
}

/// Retain rules bound to a prefix, immutable once built
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetainPolicy {
    pub patterns: Vec<String>,
    pub default: bool,
    pub prefix: String,
}

impl RetainPolicy {
    pub fn new(patterns: Vec<String>, default: bool, prefix: impl Into<String>) -> Self {
        Self {
            patterns,
            default,
            prefix: prefix.into(),
        }
    }

    /// Resolve the retain flag for a fully-qualified topic
    pub fn resolve(&self, full_topic: &str) -> bool {
        should_retain(full_topic, &self.patterns, self.default, &self.prefix)
    }

    /// Topic for an event type under this policy's prefix
    pub fn topic_for(&self, event_type: &str) -> String {
        event_topic(&self.prefix, event_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // matches
    // ========================================================================

    #[test]
    fn test_exact_match_is_reflexive() {
        for topic in ["", "timing", "weather/humidity", "a/b/c/d"] {
            assert!(matches(topic, topic), "{topic} should match itself");
        }
    }

    #[test]
    fn test_single_level_wildcard() {
        assert!(matches("timing", "+"));
        assert!(matches("weather/humidity", "weather/+"));
        assert!(matches("a/b/c", "a/+/c"));
        assert!(!matches("weather/humidity/current", "weather/+"));
        assert!(!matches("weather", "weather/+"));
    }

    #[test]
    fn test_multi_level_wildcard() {
        assert!(matches("anything/at/all", "#"));
        assert!(matches("weather/humidity", "weather/#"));
        assert!(matches("weather/humidity/current", "weather/#"));
        assert!(matches("a/x/c/d", "a/+/c/#"));
        assert!(!matches("timing/laps", "weather/#"));
    }

    #[test]
    fn test_multi_level_matches_bare_parent() {
        // Parent level itself counts as a match for "<parent>/#"
        assert!(matches("a", "a/#"));
    }

    #[test]
    fn test_hash_not_last_is_invalid() {
        assert!(!matches("a/b/c", "a/#/c"));
        assert!(!matches("a/b", "#/b"));
        assert!(!matches("ab", "a#"));
        assert!(!matches("a#/b", "a#/#"));
    }

    #[test]
    fn test_segment_count_must_match_without_hash() {
        assert!(!matches("a/b", "a"));
        assert!(!matches("a", "a/b"));
    }

    // ========================================================================
    // should_retain
    // ========================================================================

    #[test]
    fn test_no_patterns_uses_default() {
        let none: [&str; 0] = [];
        assert!(should_retain("f1/timing", &none, true, "f1"));
        assert!(!should_retain("f1/timing", &none, false, "f1"));
    }

    #[test]
    fn test_prefix_stripped_before_matching() {
        let patterns = ["weather/#"];
        assert!(should_retain("f1/weather/humidity/current", &patterns, false, "f1"));
        assert!(!should_retain("f1/timing", &patterns, false, "f1"));
        assert!(should_retain("f1/timing", &patterns, true, "f1"));
    }

    #[test]
    fn test_prefix_only_stripped_at_level_boundary() {
        let patterns = ["weather"];
        // "f1weather" does not start with "f1/"
        assert!(!should_retain("f1weather", &patterns, false, "f1"));
        assert!(should_retain("f1/weather", &patterns, false, "f1"));
    }

    #[test]
    fn test_first_matching_pattern_wins() {
        let patterns = vec!["a/#".to_string(), "timing".to_string()];
        assert!(should_retain("f1/timing", &patterns, false, "f1"));
    }

    #[test]
    fn test_invalid_pattern_falls_back_to_default() {
        let patterns = ["weather/#/current"];
        assert!(!should_retain("f1/weather/x/current", &patterns, false, "f1"));
    }

    #[test]
    fn test_retain_policy_resolve() {
        let policy = RetainPolicy::new(vec!["sessioninfo".into(), "weather/#".into()], false, "f1");
        assert_eq!(policy.topic_for("sessioninfo"), "f1/sessioninfo");
        assert!(policy.resolve("f1/sessioninfo"));
        assert!(!policy.resolve("f1/cardataz"));
    }
}
