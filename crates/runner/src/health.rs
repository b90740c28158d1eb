//! Read-only health and status endpoint
//!
//! `GET /health` answers 200 when both sides of the bridge are connected and
//! 503 otherwise. `GET /status` returns the full report.

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use pitwall_core::BridgeStatus;
use pitwall_processor::ProcessorStats;
use pitwall_publisher::PublisherStats;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Detailed status served on `/status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    #[serde(flatten)]
    pub bridge: BridgeStatus,
    pub healthy: bool,
    pub feed_state: String,
    pub reconnect_attempt: u32,
    pub subscribed_streams: Vec<String>,
    pub processor: ProcessorStats,
    pub publisher: PublisherStats,
}

/// Source of the data the endpoint serves
pub trait StatusProvider: Send + Sync {
    fn status(&self) -> BridgeStatus;

    fn report(&self) -> StatusReport;
}

type SharedProvider = Arc<dyn StatusProvider>;

pub fn router(provider: SharedProvider) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .with_state(provider)
}

async fn health(State(provider): State<SharedProvider>) -> (StatusCode, Json<BridgeStatus>) {
    let status = provider.status();
    let code = if status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

async fn status(State(provider): State<SharedProvider>) -> Json<StatusReport> {
    Json(provider.report())
}

/// Running health server
pub struct HealthServer {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl HealthServer {
    pub async fn bind(addr: &str, provider: SharedProvider) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let (shutdown, stop) = oneshot::channel::<()>();

        let app = router(provider);
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = stop.await;
                })
                .await;
            if let Err(e) = served {
                warn!(error = %e, "Health server failed");
            }
        });

        info!(addr = %addr, "Health endpoint listening");
        Ok(HealthServer {
            addr,
            shutdown,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        let mut task = self.task;
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut task).await.is_err() {
            task.abort();
        }
    }
}
