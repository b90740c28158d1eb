//! Bridge orchestration
//!
//! Owns the three components and the supervision of the feed session.
//! The publisher is connected before the feed so the birth message is out
//! before any event can arrive.

use parking_lot::Mutex;
use pitwall_core::BridgeStatus;
use pitwall_feed::{FeedClient, FeedConfig, FeedLifecycle, SessionState};
use pitwall_ports::{EventSink, EventSource, FeedError};
use pitwall_processor::{EventProcessor, ProcessorConfig, ProcessorError};
use pitwall_publisher::{MqttPublisher, PublisherConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::{BridgeConfigFile, ConfigError};
use crate::health::{HealthServer, StatusProvider, StatusReport};

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Processor error: {0}")]
    Processor(#[from] ProcessorError),
    #[error("Health server error: {0}")]
    Health(#[from] std::io::Error),
}

/// How the orchestrator reacts to the feed dropping
#[derive(Debug, Clone, Copy)]
pub struct Supervision {
    pub reconnect_on_drop: bool,
    pub reconnect_delay: Duration,
}

impl Default for Supervision {
    fn default() -> Self {
        Self {
            reconnect_on_drop: true,
            reconnect_delay: Duration::from_millis(5000),
        }
    }
}

/// Immutable settings for one bridge instance
#[derive(Debug, Clone, Default)]
pub struct BridgeConfig {
    pub feed: FeedConfig,
    pub publisher: PublisherConfig,
    pub processor: ProcessorConfig,
    pub supervision: Supervision,
    /// Bind address of the health endpoint; disabled when `None`
    pub health_addr: Option<String>,
}

impl BridgeConfig {
    /// Validate a loaded file and convert it
    pub fn from_file(file: &BridgeConfigFile) -> Result<Self, ConfigError> {
        file.validate()?;
        Ok(BridgeConfig {
            feed: file.feed.to_feed_config(),
            publisher: file.mqtt.to_publisher_config(),
            processor: file.processor.to_processor_config(),
            supervision: Supervision {
                reconnect_on_drop: file.orchestrator.reconnect_on_drop,
                reconnect_delay: Duration::from_millis(file.orchestrator.reconnect_delay_ms),
            },
            health_addr: file.health.enabled.then(|| file.health.bind_addr()),
        })
    }
}

#[derive(Default)]
struct Tasks {
    supervisor: Option<JoinHandle<()>>,
    health: Option<HealthServer>,
}

/// Feed → processor → publisher, plus supervision and the health endpoint
pub struct Bridge {
    config: BridgeConfig,
    feed: FeedClient,
    publisher: MqttPublisher,
    processor: EventProcessor,
    failure: watch::Sender<Option<FeedError>>,
    tasks: Mutex<Tasks>,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        let feed = FeedClient::new(config.feed.clone());
        let publisher = MqttPublisher::new(config.publisher.clone());
        let processor = EventProcessor::new(
            config.processor.clone(),
            Arc::new(feed.clone()) as Arc<dyn EventSource>,
            Arc::new(publisher.clone()) as Arc<dyn EventSink>,
        );
        let (failure, _) = watch::channel(None);

        Self {
            config,
            feed,
            publisher,
            processor,
            failure,
            tasks: Mutex::new(Tasks::default()),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn feed(&self) -> &FeedClient {
        &self.feed
    }

    pub fn processor(&self) -> &EventProcessor {
        &self.processor
    }

    /// Bring the bridge up.
    ///
    /// Fails only when the broker is unreachable or the health endpoint
    /// cannot bind. A feed that does not connect on the first attempt is
    /// left to its own retry schedule.
    pub async fn start(&self) -> Result<(), BridgeError> {
        let supervisor = tokio::spawn(supervise_feed(
            self.feed.clone(),
            self.feed.lifecycle(),
            self.config.supervision,
            self.failure.clone(),
        ));
        self.tasks.lock().supervisor = Some(supervisor);

        if let Some(addr) = &self.config.health_addr {
            match HealthServer::bind(addr, Arc::new(self.probe())).await {
                Ok(server) => self.tasks.lock().health = Some(server),
                Err(e) => {
                    self.stop_tasks().await;
                    return Err(e.into());
                }
            }
        }

        match self.processor.start().await {
            Ok(()) => info!("Bridge started"),
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "Bridge started without feed, retry schedule armed")
            }
            Err(e) => {
                error!(error = %e, "Bridge failed to start");
                self.stop_tasks().await;
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Drain the queue, disconnect feed then broker, stop the endpoint
    pub async fn shutdown(&self) {
        info!("Shutting down bridge");
        if let Some(supervisor) = self.tasks.lock().supervisor.take() {
            supervisor.abort();
        }
        self.processor.stop().await;
        self.stop_tasks().await;
        info!("Bridge stopped");
    }

    async fn stop_tasks(&self) {
        let (supervisor, health) = {
            let mut tasks = self.tasks.lock();
            (tasks.supervisor.take(), tasks.health.take())
        };
        if let Some(supervisor) = supervisor {
            supervisor.abort();
        }
        if let Some(health) = health {
            health.shutdown().await;
        }
    }

    pub fn status(&self) -> BridgeStatus {
        self.processor.status()
    }

    pub fn health_addr(&self) -> Option<SocketAddr> {
        self.tasks.lock().health.as_ref().map(HealthServer::local_addr)
    }

    /// Snapshot source for the health endpoint
    pub fn probe(&self) -> BridgeProbe {
        BridgeProbe {
            feed: self.feed.clone(),
            publisher: self.publisher.clone(),
            processor: self.processor.clone(),
        }
    }

    /// Terminal feed failure, if one happened
    pub fn failure(&self) -> Option<FeedError> {
        self.failure.borrow().clone()
    }

    /// Resolve once the feed has given up reconnecting
    pub async fn terminal_failure(&self) -> FeedError {
        let mut rx = self.failure.subscribe();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(err) = current {
                return err;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// React to feed lifecycle signals until the channel closes
async fn supervise_feed(
    feed: FeedClient,
    mut lifecycle: broadcast::Receiver<FeedLifecycle>,
    supervision: Supervision,
    failure: watch::Sender<Option<FeedError>>,
) {
    loop {
        let signal = match lifecycle.recv().await {
            Ok(signal) => signal,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "Lifecycle signals dropped");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return,
        };

        match signal {
            FeedLifecycle::Connected => {
                info!(streams = feed.subscribed_streams().len(), "Feed connected")
            }
            FeedLifecycle::Reconnecting { attempt, delay } => {
                info!(attempt, delay = ?delay, "Feed retry scheduled")
            }
            FeedLifecycle::Disconnected {
                reason: Some(reason),
            } => {
                if !supervision.reconnect_on_drop {
                    warn!(reason = %reason, "Feed dropped, reconnect disabled");
                    continue;
                }
                warn!(
                    reason = %reason,
                    delay = ?supervision.reconnect_delay,
                    "Feed dropped, reconnecting"
                );
                tokio::time::sleep(supervision.reconnect_delay).await;

                // Someone else already reconnected or tore down
                if feed.state() != SessionState::Disconnected {
                    continue;
                }
                if let Err(e) = feed.connect().await {
                    warn!(error = %e, "Feed reconnect failed");
                }
            }
            FeedLifecycle::ConnectionFailed {
                attempts,
                last_error,
            } => {
                error!(attempts, error = %last_error, "Feed connection failed permanently");
                failure.send_replace(Some(last_error));
            }
            FeedLifecycle::StateChanged { .. } | FeedLifecycle::Disconnected { reason: None } => {}
        }
    }
}

/// Cheap clone of the component handles, used by the health endpoint
#[derive(Clone)]
pub struct BridgeProbe {
    feed: FeedClient,
    publisher: MqttPublisher,
    processor: EventProcessor,
}

impl StatusProvider for BridgeProbe {
    fn status(&self) -> BridgeStatus {
        self.processor.status()
    }

    fn report(&self) -> StatusReport {
        let bridge = self.processor.status();
        StatusReport {
            bridge,
            healthy: bridge.is_healthy(),
            feed_state: self.feed.state().to_string(),
            reconnect_attempt: self.feed.reconnect_attempt(),
            subscribed_streams: self.feed.subscribed_streams(),
            processor: self.processor.stats(),
            publisher: self.publisher.stats(),
        }
    }
}
