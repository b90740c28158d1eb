use async_trait::async_trait;
use parking_lot::Mutex;
use pitwall_core::{DomainEvent, RetainPolicy};
use pitwall_ports::{EventSink, PublishError, PublishResult};
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet,
    QoS, Transport,
};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{BrokerAddress, PublisherConfig, qos_from_level};
use crate::message::{DiscoveryMessage, EventMessage};

const REQUEST_CAPACITY: usize = 64;
/// Pause between event loop polls after a connection error
const RETRY_PAUSE: Duration = Duration::from_secs(1);
/// How long disconnect waits for the offline message to flush
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Publish counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublisherStats {
    pub published: u64,
    pub failed: u64,
    pub connacks: u64,
}

struct Session {
    client: AsyncClient,
    task: JoinHandle<()>,
    client_id: String,
    /// Signalled when the broker acknowledges the offline message
    offline_acked: Arc<Notify>,
}

struct Inner {
    config: PublisherConfig,
    policy: RetainPolicy,
    connected: AtomicBool,
    /// Set while disconnect tears the session down
    stopping: AtomicBool,
    session: Mutex<Option<Session>>,
    published: AtomicU64,
    failed: AtomicU64,
    connacks: AtomicU64,
}

/// MQTT publisher for domain events.
///
/// Presentation layer - owns the broker session. Announces itself with a
/// retained birth message on every CONNACK and leaves a retained will so
/// the broker marks the bridge offline on an unclean drop.
#[derive(Clone)]
pub struct MqttPublisher {
    inner: Arc<Inner>,
}

impl MqttPublisher {
    pub fn new(config: PublisherConfig) -> Self {
        MqttPublisher {
            inner: Arc::new(Inner {
                policy: config.retain_policy(),
                config,
                connected: AtomicBool::new(false),
                stopping: AtomicBool::new(false),
                session: Mutex::new(None),
                published: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                connacks: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.inner.config
    }

    pub fn retain_policy(&self) -> &RetainPolicy {
        &self.inner.policy
    }

    pub fn stats(&self) -> PublisherStats {
        PublisherStats {
            published: self.inner.published.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
            connacks: self.inner.connacks.load(Ordering::Relaxed),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Open the broker session and wait for the first CONNACK
    pub async fn connect(&self) -> PublishResult<()> {
        if self.inner.session.lock().is_some() && self.is_connected() {
            return Ok(());
        }
        // Replace a session that never came up
        self.shutdown_session().await;

        let config = &self.inner.config;
        let address = BrokerAddress::parse(&config.broker_url)
            .map_err(|e| PublishError::Connection(e.to_string()))?;
        let client_id = config.resolve_client_id();
        let options = self.mqtt_options(&address, &client_id)?;

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (ready_tx, mut ready_rx) = watch::channel(false);
        let offline_acked = Arc::new(Notify::new());

        self.inner.stopping.store(false, Ordering::SeqCst);
        let task = tokio::spawn(run_event_loop(
            Arc::clone(&self.inner),
            client.clone(),
            eventloop,
            ready_tx,
            Arc::clone(&offline_acked),
        ));

        *self.inner.session.lock() = Some(Session {
            client,
            task,
            client_id: client_id.clone(),
            offline_acked,
        });

        info!(
            host = %address.host,
            port = address.port,
            tls = address.tls,
            client_id = %client_id,
            "Connecting to broker"
        );

        let wait = async {
            while !*ready_rx.borrow_and_update() {
                if ready_rx.changed().await.is_err() {
                    return false;
                }
            }
            true
        };

        match tokio::time::timeout(config.connect_timeout, wait).await {
            Ok(true) => {}
            Ok(false) => {
                self.shutdown_session().await;
                return Err(PublishError::Connection("event loop stopped".to_string()));
            }
            Err(_) => {
                warn!(timeout = ?config.connect_timeout, "Broker did not acknowledge connection");
                self.shutdown_session().await;
                return Err(PublishError::Timeout(config.connect_timeout));
            }
        }

        if config.discovery {
            self.publish_discovery(&client_id).await;
        }
        Ok(())
    }

    fn mqtt_options(&self, address: &BrokerAddress, client_id: &str) -> PublishResult<MqttOptions> {
        let config = &self.inner.config;

        let mut options = MqttOptions::new(client_id, address.host.clone(), address.port);
        options.set_keep_alive(config.keep_alive);
        options.set_clean_session(true);
        options.set_last_will(LastWill::new(
            config.will_topic(),
            config.will_payload.clone().into_bytes(),
            QoS::AtLeastOnce,
            true,
        ));

        let username = config.username.clone().or_else(|| address.username.clone());
        let password = config.password.clone().or_else(|| address.password.clone());
        if let Some(username) = username {
            options.set_credentials(username, password.unwrap_or_default());
        }

        if address.tls {
            options.set_transport(Transport::tls_with_default_config());
        }

        // Validate the event QoS up front so publish_event cannot hit it
        qos_from_level(config.qos).map_err(|e| PublishError::Connection(e.to_string()))?;

        Ok(options)
    }

    async fn publish_discovery(&self, client_id: &str) {
        let config = &self.inner.config;
        let payload = match serde_json::to_vec(&DiscoveryMessage::new(config, client_id)) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "Failed to encode discovery message");
                return;
            }
        };

        match self
            .publish(&config.discovery_topic(), payload, QoS::AtLeastOnce, true)
            .await
        {
            Ok(()) => debug!(topic = %config.discovery_topic(), "Discovery announced"),
            Err(e) => warn!(error = %e, "Failed to publish discovery message"),
        }
    }

    /// Publish raw bytes.
    ///
    /// Rejected immediately when the broker session is not up; there is no
    /// offline outbox.
    pub async fn publish(
        &self,
        topic: &str,
        payload: impl Into<Vec<u8>>,
        qos: QoS,
        retain: bool,
    ) -> PublishResult<()> {
        if !self.is_connected() {
            return Err(PublishError::NotConnected);
        }
        let client = self
            .inner
            .session
            .lock()
            .as_ref()
            .map(|s| s.client.clone())
            .ok_or(PublishError::NotConnected)?;

        client
            .publish(topic, qos, retain, payload.into())
            .await
            .map_err(|e| PublishError::Rejected {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    /// Publish one event to `<prefix>/<event_type>` with rule-resolved retain
    pub async fn publish_event(&self, event: &DomainEvent) -> PublishResult<()> {
        let topic = self.inner.policy.topic_for(&event.event_type);
        let retain = self.inner.policy.resolve(&topic);
        let qos = qos_from_level(self.inner.config.qos)
            .map_err(|e| PublishError::Serialization(e.to_string()))?;

        let payload = serde_json::to_vec(&EventMessage::from_event(event))
            .map_err(|e| PublishError::Serialization(e.to_string()))?;

        match self.publish(&topic, payload, qos, retain).await {
            Ok(()) => {
                self.inner.published.fetch_add(1, Ordering::Relaxed);
                debug!(topic = %topic, retain, "Event published");
                Ok(())
            }
            Err(e) => {
                self.inner.failed.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Announce offline on the will topic, then close the session.
    /// Idempotent.
    ///
    /// DISCONNECT goes out only once the broker has acknowledged the offline
    /// message (or `DRAIN_TIMEOUT` passed); the event loop then keeps
    /// reading until the broker closes the socket.
    pub async fn disconnect(&self) {
        let Some(session) = self.inner.session.lock().take() else {
            return;
        };
        self.inner.stopping.store(true, Ordering::SeqCst);

        if self.is_connected() {
            let config = &self.inner.config;
            match session
                .client
                .publish(
                    config.will_topic(),
                    QoS::AtLeastOnce,
                    true,
                    config.will_payload.clone().into_bytes(),
                )
                .await
            {
                Ok(()) => {
                    if tokio::time::timeout(DRAIN_TIMEOUT, session.offline_acked.notified())
                        .await
                        .is_err()
                    {
                        warn!(timeout = ?DRAIN_TIMEOUT, "Offline status not acknowledged");
                    }
                }
                Err(e) => warn!(error = %e, "Failed to publish offline status"),
            }
            if let Err(e) = session.client.disconnect().await {
                debug!(error = %e, "Disconnect request failed");
            }
        }

        self.inner.connected.store(false, Ordering::SeqCst);
        finish_task(session.task).await;
        info!(client_id = %session.client_id, "Disconnected from broker");
    }

    /// Drop a session without the offline announcement
    async fn shutdown_session(&self) {
        let session = self.inner.session.lock().take();
        if let Some(session) = session {
            self.inner.stopping.store(true, Ordering::SeqCst);
            self.inner.connected.store(false, Ordering::SeqCst);
            session.task.abort();
        }
    }
}

async fn finish_task(mut task: JoinHandle<()>) {
    if tokio::time::timeout(DRAIN_TIMEOUT, &mut task).await.is_err() {
        task.abort();
    }
}

/// Drive the rumqttc event loop until disconnect.
///
/// rumqttc reconnects on the next poll after an error, so errors only
/// flip the connected flag and pause briefly. Once stopping, the loop runs
/// until the connection closes so nothing queued for the broker is lost.
async fn run_event_loop(
    inner: Arc<Inner>,
    client: AsyncClient,
    mut eventloop: EventLoop,
    ready: watch::Sender<bool>,
    offline_acked: Arc<Notify>,
) {
    let config = &inner.config;
    // Packet id of the offline message, the first publish sent while stopping
    let mut offline_pkid: Option<u16> = None;

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code != ConnectReturnCode::Success {
                    warn!(code = ?ack.code, "Broker refused connection");
                    continue;
                }

                inner.connacks.fetch_add(1, Ordering::Relaxed);
                inner.connected.store(true, Ordering::SeqCst);
                info!(session_present = ack.session_present, "Broker connection acknowledged");

                // Queued from inside the loop, so it must not block on capacity
                if let Err(e) = client.try_publish(
                    config.birth_topic(),
                    QoS::AtLeastOnce,
                    true,
                    config.birth_payload.clone().into_bytes(),
                ) {
                    warn!(error = %e, "Failed to queue birth message");
                }
                ready.send_replace(true);
            }
            Ok(Event::Outgoing(Outgoing::Publish(pkid)))
                if offline_pkid.is_none() && inner.stopping.load(Ordering::SeqCst) =>
            {
                offline_pkid = Some(pkid);
            }
            Ok(Event::Incoming(Packet::PubAck(ack))) if Some(ack.pkid) == offline_pkid => {
                offline_acked.notify_one();
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                inner.connected.store(false, Ordering::SeqCst);
            }
            Ok(_) => {}
            Err(e) => {
                inner.connected.store(false, Ordering::SeqCst);
                ready.send_replace(false);
                if inner.stopping.load(Ordering::SeqCst) {
                    break;
                }
                warn!(error = %e, "Broker connection error");
                tokio::time::sleep(RETRY_PAUSE).await;
            }
        }
    }

    debug!("Broker event loop stopped");
}

#[async_trait]
impl EventSink for MqttPublisher {
    async fn connect(&self) -> PublishResult<()> {
        MqttPublisher::connect(self).await
    }

    async fn disconnect(&self) {
        MqttPublisher::disconnect(self).await
    }

    async fn publish_event(&self, event: &DomainEvent) -> PublishResult<()> {
        MqttPublisher::publish_event(self, event).await
    }

    fn is_connected(&self) -> bool {
        MqttPublisher::is_connected(self)
    }
}
