use pitwall_feed::{FeedConfig, StreamSelection};
use pitwall_feed::application::config::{
    DEFAULT_ACCEPT_ENCODING, DEFAULT_CONNECT_URL, DEFAULT_HUB, DEFAULT_NEGOTIATE_URL,
    DEFAULT_USER_AGENT,
};
use pitwall_processor::ProcessorConfig;
use pitwall_publisher::PublisherConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration file; every section and field is optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfigFile {
    #[serde(default)]
    pub feed: FeedSection,
    #[serde(default)]
    pub mqtt: MqttSection,
    #[serde(default)]
    pub processor: ProcessorSection,
    #[serde(default)]
    pub orchestrator: OrchestratorSection,
    #[serde(default)]
    pub health: HealthSection,
}

/// Upstream live-timing feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSection {
    #[serde(default = "default_negotiate_url")]
    pub negotiate_url: String,
    #[serde(default = "default_connect_url")]
    pub connect_url: String,
    #[serde(default = "default_hub")]
    pub hub: String,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_base_reconnect_delay_ms")]
    pub base_reconnect_delay_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub negotiate_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub channel_timeout_ms: u64,
    /// Set name (`"standard"`) or explicit list of stream names
    #[serde(default)]
    pub streams: StreamSelection,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_accept_encoding")]
    pub accept_encoding: String,
    #[serde(default = "default_message_window")]
    pub message_window: usize,
}

impl Default for FeedSection {
    fn default() -> Self {
        FeedSection {
            negotiate_url: default_negotiate_url(),
            connect_url: default_connect_url(),
            hub: default_hub(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            base_reconnect_delay_ms: default_base_reconnect_delay_ms(),
            negotiate_timeout_ms: default_timeout_ms(),
            channel_timeout_ms: default_timeout_ms(),
            streams: StreamSelection::default(),
            user_agent: default_user_agent(),
            accept_encoding: default_accept_encoding(),
            message_window: default_message_window(),
        }
    }
}

impl FeedSection {
    /// Convert to the feed client's configuration
    pub fn to_feed_config(&self) -> FeedConfig {
        FeedConfig {
            hub: self.hub.clone(),
            user_agent: self.user_agent.clone(),
            accept_encoding: self.accept_encoding.clone(),
            message_window: self.message_window,
            ..FeedConfig::default()
        }
        .with_urls(&self.negotiate_url, &self.connect_url)
        .with_streams(self.streams.clone())
        .with_reconnect(
            self.max_reconnect_attempts,
            Duration::from_millis(self.base_reconnect_delay_ms),
        )
        .with_timeouts(
            Duration::from_millis(self.negotiate_timeout_ms),
            Duration::from_millis(self.channel_timeout_ms),
        )
    }
}

/// Downstream MQTT broker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttSection {
    #[serde(default = "default_broker_url")]
    pub broker_url: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_qos")]
    pub qos: u8,
    #[serde(default)]
    pub retain: bool,
    /// Topic patterns (relative to the prefix) published retained
    #[serde(default)]
    pub retained_topics: Vec<String>,
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    #[serde(default)]
    pub birth_topic: Option<String>,
    #[serde(default = "default_birth_payload")]
    pub birth_payload: String,
    #[serde(default)]
    pub will_topic: Option<String>,
    #[serde(default = "default_will_payload")]
    pub will_payload: String,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_true")]
    pub discovery: bool,
}

impl Default for MqttSection {
    fn default() -> Self {
        MqttSection {
            broker_url: default_broker_url(),
            client_id: None,
            username: None,
            password: None,
            qos: default_qos(),
            retain: false,
            retained_topics: Vec::new(),
            topic_prefix: default_topic_prefix(),
            birth_topic: None,
            birth_payload: default_birth_payload(),
            will_topic: None,
            will_payload: default_will_payload(),
            keep_alive_secs: default_keep_alive_secs(),
            connect_timeout_ms: default_timeout_ms(),
            discovery: true,
        }
    }
}

impl MqttSection {
    pub fn to_publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            client_id: self.client_id.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            qos: self.qos,
            retain: self.retain,
            birth_topic: self.birth_topic.clone(),
            birth_payload: self.birth_payload.clone(),
            will_topic: self.will_topic.clone(),
            will_payload: self.will_payload.clone(),
            keep_alive: Duration::from_secs(self.keep_alive_secs),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            discovery: self.discovery,
            ..PublisherConfig::default()
        }
        .with_broker(&self.broker_url)
        .with_retained_topics(self.retained_topics.clone())
        .with_prefix(&self.topic_prefix)
    }
}

/// Batching between feed and broker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorSection {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
}

impl Default for ProcessorSection {
    fn default() -> Self {
        ProcessorSection {
            batch_size: default_batch_size(),
            batch_timeout_ms: default_batch_timeout_ms(),
        }
    }
}

impl ProcessorSection {
    pub fn to_processor_config(&self) -> ProcessorConfig {
        ProcessorConfig::default()
            .with_batch(self.batch_size, Duration::from_millis(self.batch_timeout_ms))
    }
}

/// Supervision of the feed session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSection {
    /// Reconnect the feed after it drops once connected
    #[serde(default = "default_true")]
    pub reconnect_on_drop: bool,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        OrchestratorSection {
            reconnect_on_drop: true,
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

/// Health/status HTTP endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_health_host")]
    pub host: String,
    #[serde(default = "default_health_port")]
    pub port: u16,
}

impl Default for HealthSection {
    fn default() -> Self {
        HealthSection {
            enabled: true,
            host: default_health_host(),
            port: default_health_port(),
        }
    }
}

impl HealthSection {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_true() -> bool {
    true
}

fn default_negotiate_url() -> String {
    DEFAULT_NEGOTIATE_URL.to_string()
}

fn default_connect_url() -> String {
    DEFAULT_CONNECT_URL.to_string()
}

fn default_hub() -> String {
    DEFAULT_HUB.to_string()
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_base_reconnect_delay_ms() -> u64 {
    2000
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_accept_encoding() -> String {
    DEFAULT_ACCEPT_ENCODING.to_string()
}

fn default_message_window() -> usize {
    100
}

fn default_broker_url() -> String {
    "mqtt://localhost:1883".to_string()
}

fn default_qos() -> u8 {
    1
}

fn default_topic_prefix() -> String {
    "f1".to_string()
}

fn default_birth_payload() -> String {
    "online".to_string()
}

fn default_will_payload() -> String {
    "offline".to_string()
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_batch_size() -> usize {
    10
}

fn default_batch_timeout_ms() -> u64 {
    1000
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

fn default_health_host() -> String {
    "0.0.0.0".to_string()
}

fn default_health_port() -> u16 {
    3000
}
