use pitwall_feed::StreamSelection;
use pitwall_publisher::BrokerAddress;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use super::types::BridgeConfigFile;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Load bridge configuration from a JSON file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<BridgeConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: BridgeConfigFile = serde_json::from_str(&content)?;
    Ok(config)
}

/// Load configuration from a JSON string
pub fn load_config_from_str(json: &str) -> Result<BridgeConfigFile, ConfigError> {
    let config: BridgeConfigFile = serde_json::from_str(json)?;
    Ok(config)
}

/// Load the default embedded configuration
pub fn load_default_config() -> Result<BridgeConfigFile, ConfigError> {
    let default_config = include_str!("bridge_config.json");
    load_config_from_str(default_config)
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl BridgeConfigFile {
    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`; blank values are ignored
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // Feed
        if let Some(v) = get("F1_NEGOTIATE_URL") {
            self.feed.negotiate_url = v;
        }
        if let Some(v) = get("F1_CONNECT_URL") {
            self.feed.connect_url = v;
        }
        if let Some(v) = get("F1_HUB") {
            self.feed.hub = v;
        }
        if let Some(v) = get("F1_STREAMS") {
            self.feed.streams = StreamSelection::parse(&v);
        }
        if let Some(v) = get("F1_MAX_RECONNECT_ATTEMPTS") {
            self.feed.max_reconnect_attempts = parse_value("F1_MAX_RECONNECT_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("F1_RECONNECT_DELAY_MS") {
            self.feed.base_reconnect_delay_ms = parse_value("F1_RECONNECT_DELAY_MS", &v)?;
        }

        // Broker
        if let Some(v) = get("MQTT_BROKER_URL") {
            self.mqtt.broker_url = v;
        }
        if let Some(v) = get("MQTT_CLIENT_ID") {
            self.mqtt.client_id = Some(v);
        }
        if let Some(v) = get("MQTT_USERNAME") {
            self.mqtt.username = Some(v);
        }
        if let Some(v) = get("MQTT_PASSWORD") {
            self.mqtt.password = Some(v);
        }
        if let Some(v) = get("MQTT_QOS") {
            self.mqtt.qos = parse_value("MQTT_QOS", &v)?;
        }
        if let Some(v) = get("MQTT_RETAIN") {
            self.mqtt.retain = parse_flag("MQTT_RETAIN", &v)?;
        }
        if let Some(v) = get("MQTT_RETAINED_TOPICS") {
            self.mqtt.retained_topics = split_list(&v);
        }
        if let Some(v) = get("MQTT_TOPIC_PREFIX") {
            self.mqtt.topic_prefix = v;
        }

        // Processor
        if let Some(v) = get("BATCH_SIZE") {
            self.processor.batch_size = parse_value("BATCH_SIZE", &v)?;
        }
        if let Some(v) = get("BATCH_TIMEOUT_MS") {
            self.processor.batch_timeout_ms = parse_value("BATCH_TIMEOUT_MS", &v)?;
        }

        if let Some(v) = get("HEALTH_PORT") {
            self.health.port = parse_value("HEALTH_PORT", &v)?;
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processor.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "processor.batch_size must be at least 1".to_string(),
            ));
        }
        if self.mqtt.qos > 2 {
            return Err(ConfigError::Invalid(format!(
                "mqtt.qos must be 0, 1 or 2, got {}",
                self.mqtt.qos
            )));
        }
        if self.feed.max_reconnect_attempts == 0 {
            return Err(ConfigError::Invalid(
                "feed.max_reconnect_attempts must be at least 1".to_string(),
            ));
        }
        if self.mqtt.topic_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid("mqtt.topic_prefix is empty".to_string()));
        }

        for (key, url) in [
            ("feed.negotiate_url", &self.feed.negotiate_url),
            ("feed.connect_url", &self.feed.connect_url),
            ("mqtt.broker_url", &self.mqtt.broker_url),
        ] {
            if url.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} is empty", key)));
            }
        }
        BrokerAddress::parse(&self.mqtt.broker_url)
            .map_err(|e| ConfigError::Invalid(format!("mqtt.broker_url: {}", e)))?;

        if self.feed.streams.resolve().is_empty() {
            return Err(ConfigError::Invalid("feed.streams selects nothing".to_string()));
        }
        Ok(())
    }
}
