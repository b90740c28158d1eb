//! Bridge integration tests
//!
//! Runs the whole bridge against an in-process hub (negotiate endpoint and
//! WebSocket channel) and an in-process MQTT 3.1.1 broker.

use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use parking_lot::Mutex;
use pitwall_core::BridgeStatus;
use pitwall_feed::{FeedConfig, SessionState, StreamSelection};
use pitwall_ports::FeedError;
use pitwall_processor::{ProcessorConfig, ProcessorError, ProcessorStats};
use pitwall_publisher::{PublisherConfig, PublisherStats};
use pitwall_runner::{
    Bridge, BridgeConfig, BridgeError, StatusProvider, StatusReport, Supervision,
    health::HealthServer,
};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;

// ============================================================================
// Mock Hub
// ============================================================================

#[derive(Default)]
struct MockHub {
    negotiate_calls: AtomicU32,
    /// Every negotiation answers 500
    unavailable: AtomicBool,
    frames: Mutex<Vec<String>>,
    drop_signal: Notify,
}

async fn negotiate_handler(State(hub): State<Arc<MockHub>>) -> Response {
    hub.negotiate_calls.fetch_add(1, Ordering::SeqCst);
    if hub.unavailable.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "unavailable").into_response();
    }
    Json(json!({"ConnectionToken": "abc", "ConnectionId": "c1"})).into_response()
}

async fn connect_handler(
    State(hub): State<Arc<MockHub>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(mut socket: WebSocket, hub: Arc<MockHub>) {
    loop {
        tokio::select! {
            msg = socket.recv() => match msg {
                Some(Ok(Message::Text(_))) => {
                    let frames = hub.frames.lock().clone();
                    for frame in frames {
                        if socket.send(Message::Text(frame.into())).await.is_err() {
                            return;
                        }
                    }
                }
                Some(Ok(_)) => {}
                _ => return,
            },
            _ = hub.drop_signal.notified() => {
                let _ = socket.send(Message::Close(None)).await;
                return;
            }
        }
    }
}

async fn start_mock_hub(hub: Arc<MockHub>) -> SocketAddr {
    let app = Router::new()
        .route("/signalr/negotiate", get(negotiate_handler))
        .route("/signalr/connect", get(connect_handler))
        .with_state(hub);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

// ============================================================================
// Mock Broker
// ============================================================================

#[derive(Debug, Clone)]
struct RecordedPublish {
    topic: String,
    payload: Vec<u8>,
    retain: bool,
}

#[derive(Default)]
struct MockBroker {
    publishes: Mutex<Vec<RecordedPublish>>,
}

impl MockBroker {
    fn publishes_to(&self, topic: &str) -> Vec<RecordedPublish> {
        self.publishes
            .lock()
            .iter()
            .filter(|p| p.topic == topic)
            .cloned()
            .collect()
    }
}

async fn read_packet(stream: &mut TcpStream) -> Option<(u8, Vec<u8>)> {
    let header = stream.read_u8().await.ok()?;
    let mut len = 0usize;
    let mut multiplier = 1usize;
    loop {
        let byte = stream.read_u8().await.ok()?;
        len += (byte & 0x7F) as usize * multiplier;
        if byte & 0x80 == 0 {
            break;
        }
        multiplier *= 128;
    }
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await.ok()?;
    Some((header, body))
}

async fn handle_broker_connection(mut stream: TcpStream, broker: Arc<MockBroker>) {
    while let Some((header, body)) = read_packet(&mut stream).await {
        let reply: Vec<u8> = match header >> 4 {
            1 => vec![0x20, 0x02, 0x00, 0x00],
            3 => {
                let qos = (header >> 1) & 0x03;
                let topic_len = u16::from_be_bytes([body[0], body[1]]) as usize;
                let topic = String::from_utf8_lossy(&body[2..2 + topic_len]).to_string();
                let mut pos = 2 + topic_len;
                let mut ack = Vec::new();
                if qos > 0 {
                    ack = vec![0x40, 0x02, body[pos], body[pos + 1]];
                    pos += 2;
                }
                broker.publishes.lock().push(RecordedPublish {
                    topic,
                    payload: body[pos..].to_vec(),
                    retain: header & 0x01 == 1,
                });
                ack
            }
            12 => vec![0xD0, 0x00],
            14 => return,
            _ => Vec::new(),
        };
        if !reply.is_empty() && stream.write_all(&reply).await.is_err() {
            return;
        }
    }
}

async fn start_mock_broker() -> (SocketAddr, Arc<MockBroker>) {
    let broker = Arc::new(MockBroker::default());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let accept_broker = Arc::clone(&broker);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(handle_broker_connection(stream, Arc::clone(&accept_broker)));
        }
    });
    (addr, broker)
}

// ============================================================================
// Helpers
// ============================================================================

fn bridge_config(hub: SocketAddr, broker: SocketAddr) -> BridgeConfig {
    BridgeConfig {
        feed: FeedConfig::default()
            .with_urls(
                format!("http://{}/signalr/negotiate", hub),
                format!("ws://{}/signalr/connect", hub),
            )
            .with_streams(StreamSelection::parse("TrackStatus,WeatherData"))
            .with_reconnect(2, Duration::from_millis(20))
            .with_timeouts(Duration::from_secs(2), Duration::from_secs(2)),
        publisher: PublisherConfig {
            client_id: Some("pitwall-bridge-test".to_string()),
            connect_timeout: Duration::from_secs(5),
            ..PublisherConfig::default()
        }
        .with_broker(format!("mqtt://{}", broker))
        .with_retained_topics(vec!["trackstatus".to_string()]),
        processor: ProcessorConfig::default().with_batch(2, Duration::from_millis(100)),
        supervision: Supervision {
            reconnect_on_drop: true,
            reconnect_delay: Duration::from_millis(50),
        },
        health_addr: Some("127.0.0.1:0".to_string()),
    }
}

async fn wait_until(cond: impl Fn() -> bool) -> bool {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

fn feed_frame(stream: &str, data: Value) -> String {
    json!({
        "M": [{"H": "Streaming", "M": "feed", "A": [stream, data, "2024-05-26T13:05:00.123Z"]}]
    })
    .to_string()
}

// ============================================================================
// End-to-End Tests
// ============================================================================

#[tokio::test]
async fn test_feed_frames_republished_to_broker() {
    let hub = Arc::new(MockHub::default());
    hub.frames.lock().push(feed_frame("TrackStatus", json!({"Status": "2"})));
    hub.frames.lock().push(json!({"R": {"WeatherData": {"AirTemp": "21.3"}}}).to_string());
    let hub_addr = start_mock_hub(Arc::clone(&hub)).await;
    let (broker_addr, broker) = start_mock_broker().await;

    let bridge = Bridge::new(bridge_config(hub_addr, broker_addr));
    bridge.start().await.unwrap();
    assert!(bridge.status().is_healthy());

    assert!(wait_until(|| !broker.publishes_to("f1/weatherdata").is_empty()).await);

    let track = &broker.publishes_to("f1/trackstatus")[0];
    assert!(track.retain);
    let body: Value = serde_json::from_slice(&track.payload).unwrap();
    assert_eq!(body["type"], "trackstatus");
    assert_eq!(body["category"], "race_control");
    assert_eq!(body["data"], json!({"Status": "2"}));

    let weather = &broker.publishes_to("f1/weatherdata")[0];
    assert!(!weather.retain);

    let status = broker.publishes_to("f1/status");
    assert_eq!(status[0].payload, b"online");

    bridge.shutdown().await;
    assert!(wait_until(|| {
        broker
            .publishes_to("f1/status")
            .last()
            .map(|p| p.payload == b"offline")
            .unwrap_or(false)
    })
    .await);
    assert!(!bridge.feed().is_connected());
}

#[tokio::test]
async fn test_unreachable_broker_aborts_start() {
    let hub = Arc::new(MockHub::default());
    let hub_addr = start_mock_hub(Arc::clone(&hub)).await;

    // Accepts TCP but never answers CONNECT
    let silent = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let silent_addr = silent.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = silent.accept().await {
            held.push(stream);
        }
    });

    let mut config = bridge_config(hub_addr, silent_addr);
    config.publisher.connect_timeout = Duration::from_millis(200);
    let bridge = Bridge::new(config);

    let err = bridge.start().await.unwrap_err();
    assert!(matches!(err, BridgeError::Processor(ProcessorError::Sink(_))));

    // The feed is never contacted and the endpoint is gone
    assert_eq!(hub.negotiate_calls.load(Ordering::SeqCst), 0);
    assert!(bridge.health_addr().is_none());
}

#[tokio::test]
async fn test_exhausted_feed_attempts_reported_as_terminal() {
    let hub = Arc::new(MockHub::default());
    hub.unavailable.store(true, Ordering::SeqCst);
    let hub_addr = start_mock_hub(Arc::clone(&hub)).await;
    let (broker_addr, _broker) = start_mock_broker().await;

    let bridge = Bridge::new(bridge_config(hub_addr, broker_addr));
    // First attempt fails but the bridge stays up
    bridge.start().await.unwrap();

    let err = tokio::time::timeout(Duration::from_secs(5), bridge.terminal_failure())
        .await
        .expect("terminal failure");
    assert!(matches!(err, FeedError::Negotiation { .. }));
    assert_eq!(hub.negotiate_calls.load(Ordering::SeqCst), 2);
    assert_eq!(bridge.feed().state(), SessionState::Failed);
    assert!(bridge.failure().is_some());

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_dropped_feed_reconnected_by_supervisor() {
    let hub = Arc::new(MockHub::default());
    let hub_addr = start_mock_hub(Arc::clone(&hub)).await;
    let (broker_addr, _broker) = start_mock_broker().await;

    let bridge = Bridge::new(bridge_config(hub_addr, broker_addr));
    bridge.start().await.unwrap();
    assert_eq!(hub.negotiate_calls.load(Ordering::SeqCst), 1);

    // Let the hub settle back into its receive loop
    tokio::time::sleep(Duration::from_millis(50)).await;
    hub.drop_signal.notify_waiters();

    assert!(wait_until(|| hub.negotiate_calls.load(Ordering::SeqCst) == 2).await);
    assert!(wait_until(|| bridge.feed().is_connected()).await);
    assert!(bridge.failure().is_none());

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_drop_not_reconnected_when_disabled() {
    let hub = Arc::new(MockHub::default());
    let hub_addr = start_mock_hub(Arc::clone(&hub)).await;
    let (broker_addr, _broker) = start_mock_broker().await;

    let mut config = bridge_config(hub_addr, broker_addr);
    config.supervision.reconnect_on_drop = false;
    let bridge = Bridge::new(config);
    bridge.start().await.unwrap();

    // Let the hub settle back into its receive loop
    tokio::time::sleep(Duration::from_millis(50)).await;
    hub.drop_signal.notify_waiters();
    assert!(wait_until(|| bridge.feed().state() == SessionState::Disconnected).await);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(hub.negotiate_calls.load(Ordering::SeqCst), 1);

    bridge.shutdown().await;
}

// ============================================================================
// Health Endpoint Tests
// ============================================================================

struct FixedStatus {
    healthy: AtomicBool,
}

impl StatusProvider for FixedStatus {
    fn status(&self) -> BridgeStatus {
        let up = self.healthy.load(Ordering::SeqCst);
        BridgeStatus {
            queue_size: 4,
            processing: false,
            upstream_connected: up,
            downstream_connected: true,
        }
    }

    fn report(&self) -> StatusReport {
        let bridge = self.status();
        StatusReport {
            bridge,
            healthy: bridge.is_healthy(),
            feed_state: "connected".to_string(),
            reconnect_attempt: 0,
            subscribed_streams: vec!["TrackStatus".to_string()],
            processor: ProcessorStats::default(),
            publisher: PublisherStats::default(),
        }
    }
}

#[tokio::test]
async fn test_health_reflects_both_sides() {
    let provider = Arc::new(FixedStatus {
        healthy: AtomicBool::new(false),
    });
    let server = HealthServer::bind("127.0.0.1:0", provider.clone())
        .await
        .unwrap();
    let url = format!("http://{}/health", server.local_addr());

    let down = reqwest::get(&url).await.unwrap();
    assert_eq!(down.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = down.json().await.unwrap();
    assert_eq!(body["upstream_connected"], false);

    provider.healthy.store(true, Ordering::SeqCst);
    let up = reqwest::get(&url).await.unwrap();
    assert_eq!(up.status(), reqwest::StatusCode::OK);
    let body: Value = up.json().await.unwrap();
    assert_eq!(body["queue_size"], 4);

    server.shutdown().await;
}

#[tokio::test]
async fn test_status_report_shape() {
    let provider = Arc::new(FixedStatus {
        healthy: AtomicBool::new(true),
    });
    let server = HealthServer::bind("127.0.0.1:0", provider).await.unwrap();

    let body: Value = reqwest::get(format!("http://{}/status", server.local_addr()))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["healthy"], true);
    assert_eq!(body["queue_size"], 4);
    assert_eq!(body["feed_state"], "connected");
    assert_eq!(body["subscribed_streams"], json!(["TrackStatus"]));
    assert_eq!(body["processor"]["published"], 0);
    assert_eq!(body["publisher"]["connacks"], 0);

    server.shutdown().await;
}

#[tokio::test]
async fn test_bridge_serves_health_endpoint() {
    let hub = Arc::new(MockHub::default());
    let hub_addr = start_mock_hub(Arc::clone(&hub)).await;
    let (broker_addr, _broker) = start_mock_broker().await;

    let bridge = Bridge::new(bridge_config(hub_addr, broker_addr));
    bridge.start().await.unwrap();
    let addr = bridge.health_addr().expect("health endpoint bound");

    let health = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
    assert_eq!(health.status(), reqwest::StatusCode::OK);

    let report: Value = reqwest::get(format!("http://{}/status", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report["feed_state"], "connected");
    assert_eq!(
        report["subscribed_streams"],
        json!(["TrackStatus", "WeatherData"])
    );
    assert_eq!(report["publisher"]["connacks"], 1);

    bridge.shutdown().await;
    assert!(reqwest::get(format!("http://{}/health", addr)).await.is_err());
}
