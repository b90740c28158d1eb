use futures_util::{SinkExt, StreamExt};
use pitwall_ports::{FeedError, FeedResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::{ACCEPT_ENCODING, COOKIE, USER_AGENT};
use url::Url;

use crate::domain::SubscribeRequest;

/// What the reader task reports back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Frame(String),
    /// Channel ended on its own (server close, transport error, EOF)
    Closed { reason: String },
}

/// Request headers for the channel upgrade
#[derive(Debug, Clone)]
pub struct ChannelHeaders {
    pub user_agent: String,
    pub accept_encoding: String,
    pub cookie: Option<String>,
}

/// Open duplex channel to the hub
/// Infrastructure component - owns the writer and reader tasks
pub struct HubChannel {
    id: u64,
    url: String,
    tx: mpsc::Sender<Message>,
    open: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl HubChannel {
    /// Open the channel, resolving only once the upgrade completed.
    ///
    /// Returns the channel handle plus the stream of inbound frames.
    pub async fn open(
        id: u64,
        url: Url,
        headers: &ChannelHeaders,
        timeout: Duration,
    ) -> FeedResult<(Self, mpsc::UnboundedReceiver<ChannelEvent>)> {
        // Logged URL without the token
        let mut shown = url.clone();
        shown.set_query(None);
        let shown = shown.to_string();

        let transport_err = |reason: String| FeedError::Transport {
            url: shown.clone(),
            reason,
        };

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| transport_err(e.to_string()))?;

        let req_headers = request.headers_mut();
        req_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&headers.user_agent).map_err(|e| transport_err(e.to_string()))?,
        );
        req_headers.insert(
            ACCEPT_ENCODING,
            HeaderValue::from_str(&headers.accept_encoding)
                .map_err(|e| transport_err(e.to_string()))?,
        );
        if let Some(cookie) = &headers.cookie {
            req_headers.insert(
                COOKIE,
                HeaderValue::from_str(cookie).map_err(|e| transport_err(e.to_string()))?,
            );
        }

        let (ws_stream, _) = match tokio::time::timeout(timeout, connect_async(request)).await {
            Err(_) => {
                return Err(FeedError::TransportTimeout {
                    url: shown.clone(),
                    timeout,
                });
            }
            Ok(Err(e)) => return Err(transport_err(e.to_string())),
            Ok(Ok(stream)) => stream,
        };
        let (mut write, mut read) = ws_stream.split();

        // Channel for sending frames to the WebSocket
        let (tx, mut rx) = mpsc::channel::<Message>(32);

        // Channel for frames received from the WebSocket
        let (event_tx, event_rx) = mpsc::unbounded_channel::<ChannelEvent>();

        let open = Arc::new(AtomicBool::new(true));

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = write.send(msg).await {
                    tracing::debug!(error = %e, "Channel write failed");
                    break;
                }
            }
            let _ = write.close().await;
        });

        let reader_open = Arc::clone(&open);
        let reader = tokio::spawn(async move {
            let reason = loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if event_tx.send(ChannelEvent::Frame(text.to_string())).is_err() {
                            break "receiver dropped".to_string();
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(f) => format!("closed by server ({}) {}", f.code, f.reason),
                            None => "closed by server".to_string(),
                        };
                    }
                    Some(Ok(Message::Ping(data))) => {
                        tracing::trace!("Received ping: {:?}", data);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break e.to_string(),
                    None => break "stream ended".to_string(),
                }
            };

            reader_open.store(false, Ordering::SeqCst);
            let _ = event_tx.send(ChannelEvent::Closed { reason });
        });

        Ok((
            HubChannel {
                id,
                url: shown,
                tx,
                open,
                reader,
            },
            event_rx,
        ))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Queue a text frame for the writer task
    pub async fn send_text(&self, text: String) -> FeedResult<()> {
        if !self.is_open() {
            return Err(FeedError::ConnectionLost("channel not open".to_string()));
        }
        self.tx
            .send(Message::Text(text.into()))
            .await
            .map_err(|_| FeedError::ConnectionLost("writer task ended".to_string()))
    }

    /// Send the subscribe invocation without waiting for its result.
    ///
    /// Fails with `Subscription` unless the channel is open.
    pub async fn subscribe(&self, request: &SubscribeRequest) -> FeedResult<()> {
        if !self.is_open() {
            return Err(FeedError::Subscription("channel not open".to_string()));
        }
        let json =
            serde_json::to_string(request).map_err(|e| FeedError::Subscription(e.to_string()))?;
        self.send_text(json)
            .await
            .map_err(|e| FeedError::Subscription(e.to_string()))
    }

    /// Send a close frame and stop both tasks
    pub async fn close(self) {
        self.open.store(false, Ordering::SeqCst);
        let _ = self.tx.send(Message::Close(None)).await;
        self.reader.abort();
    }
}
