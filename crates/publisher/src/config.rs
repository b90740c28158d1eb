use pitwall_core::RetainPolicy;
use rumqttc::QoS;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_TOPIC_PREFIX: &str = "f1";
pub const STATUS_SUFFIX: &str = "status";
pub const DISCOVERY_SUFFIX: &str = "homeassistant/discovery";
pub const ONLINE: &str = "online";
pub const OFFLINE: &str = "offline";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerAddressError {
    #[error("Invalid broker URL: {0}")]
    Parse(String),
    #[error("Unsupported broker scheme: {0}")]
    Scheme(String),
    #[error("Broker URL has no host")]
    MissingHost,
    #[error("Invalid QoS level: {0}")]
    QoS(u8),
}

/// Parsed broker endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl BrokerAddress {
    /// Parse `mqtt://`, `tcp://` (plain) or `mqtts://`, `ssl://` (TLS) URLs
    pub fn parse(raw: &str) -> Result<Self, BrokerAddressError> {
        let url = Url::parse(raw).map_err(|e| BrokerAddressError::Parse(e.to_string()))?;

        let (tls, default_port) = match url.scheme() {
            "mqtt" | "tcp" => (false, 1883),
            "mqtts" | "ssl" => (true, 8883),
            other => return Err(BrokerAddressError::Scheme(other.to_string())),
        };

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or(BrokerAddressError::MissingHost)?
            .to_string();

        let username = Some(url.username())
            .filter(|u| !u.is_empty())
            .map(str::to_string);

        Ok(BrokerAddress {
            host,
            port: url.port().unwrap_or(default_port),
            tls,
            username,
            password: url.password().map(str::to_string),
        })
    }
}

/// Map a numeric QoS level
pub fn qos_from_level(level: u8) -> Result<QoS, BrokerAddressError> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(BrokerAddressError::QoS(other)),
    }
}

/// Broker publisher configuration
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub broker_url: String,
    /// Generated when unset
    pub client_id: Option<String>,
    /// Take precedence over URL userinfo
    pub username: Option<String>,
    pub password: Option<String>,
    /// QoS for event messages
    pub qos: u8,
    /// Retain flag for topics no retain pattern matches
    pub retain: bool,
    pub retained_topics: Vec<String>,
    pub topic_prefix: String,
    /// Defaults to `<prefix>/status`
    pub birth_topic: Option<String>,
    pub birth_payload: String,
    /// Defaults to `<prefix>/status`
    pub will_topic: Option<String>,
    pub will_payload: String,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    pub discovery: bool,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            broker_url: "mqtt://localhost:1883".to_string(),
            client_id: None,
            username: None,
            password: None,
            qos: 1,
            retain: false,
            retained_topics: Vec::new(),
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
            birth_topic: None,
            birth_payload: ONLINE.to_string(),
            will_topic: None,
            will_payload: OFFLINE.to_string(),
            keep_alive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            discovery: true,
        }
    }
}

impl PublisherConfig {
    pub fn with_broker(mut self, broker_url: impl Into<String>) -> Self {
        self.broker_url = broker_url.into();
        self
    }

    pub fn with_retained_topics(mut self, patterns: Vec<String>) -> Self {
        self.retained_topics = patterns;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = prefix.into();
        self
    }

    pub fn status_topic(&self) -> String {
        format!("{}/{}", self.topic_prefix, STATUS_SUFFIX)
    }

    pub fn birth_topic(&self) -> String {
        self.birth_topic.clone().unwrap_or_else(|| self.status_topic())
    }

    pub fn will_topic(&self) -> String {
        self.will_topic.clone().unwrap_or_else(|| self.status_topic())
    }

    pub fn discovery_topic(&self) -> String {
        format!("{}/{}", self.topic_prefix, DISCOVERY_SUFFIX)
    }

    pub fn retain_policy(&self) -> RetainPolicy {
        RetainPolicy::new(
            self.retained_topics.clone(),
            self.retain,
            self.topic_prefix.clone(),
        )
    }

    /// Configured client id, or a fresh `pitwall-<uuid>`
    pub fn resolve_client_id(&self) -> String {
        self.client_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("pitwall-{}", uuid::Uuid::new_v4().simple()))
    }
}
