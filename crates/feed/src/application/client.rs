use async_trait::async_trait;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use pitwall_core::{DomainEvent, ListenerLimitExceeded, ListenerSet};
use pitwall_ports::{EventSource, FeedError, FeedResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::protocol::connect_url;
use crate::domain::{
    Envelope, FeedLifecycle, FeedSession, MessageWindow, SessionState, StreamSelection,
    SubscribeRequest,
};
use crate::infrastructure::{ChannelEvent, ChannelHeaders, HubChannel, Negotiator};

use super::config::{FeedConfig, backoff_delay};

const LIFECYCLE_CAPACITY: usize = 64;

/// Mutable client state, guarded by one lock
struct ClientState {
    session: FeedSession,
    /// Applied at the start of the next handshake
    selection: StreamSelection,
    channel: Option<HubChannel>,
    retry_task: Option<JoinHandle<()>>,
    /// Generation of the handshake currently running, if any
    in_flight: Option<u64>,
}

struct Inner {
    config: FeedConfig,
    negotiator: Negotiator,
    state: Mutex<ClientState>,
    window: Mutex<MessageWindow>,
    events: ListenerSet<DomainEvent>,
    lifecycle: broadcast::Sender<FeedLifecycle>,
    attempts_started: AtomicU64,
}

/// Session client for the live-timing hub.
///
/// Application layer - drives negotiate → open → subscribe, schedules
/// backoff retries for failed handshakes and decodes inbound frames into
/// domain events.
///
/// A drop after the session reached `Connected` is only reported
/// (`FeedLifecycle::Disconnected { reason: Some(..) }`); reconnecting from
/// there is the caller's decision.
#[derive(Clone)]
pub struct FeedClient {
    inner: Arc<Inner>,
}

impl FeedClient {
    pub fn new(config: FeedConfig) -> Self {
        let negotiator = Negotiator::new(
            config.negotiate_url.clone(),
            config.hub.clone(),
            config.user_agent.clone(),
            config.negotiate_timeout,
        );
        let (lifecycle, _) = broadcast::channel(LIFECYCLE_CAPACITY);

        FeedClient {
            inner: Arc::new(Inner {
                state: Mutex::new(ClientState {
                    session: FeedSession::new(),
                    selection: config.streams.clone(),
                    channel: None,
                    retry_task: None,
                    in_flight: None,
                }),
                window: Mutex::new(MessageWindow::new(config.message_window)),
                events: ListenerSet::new(config.max_listeners),
                negotiator,
                lifecycle,
                attempts_started: AtomicU64::new(0),
                config,
            }),
        }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.inner.config
    }

    /// Run the handshake.
    ///
    /// On failure a retry is scheduled (until attempts run out) and the
    /// error of this attempt is returned.
    pub async fn connect(&self) -> FeedResult<()> {
        let generation = {
            let mut st = self.inner.state.lock();

            if st.session.state() == SessionState::Connected {
                return Ok(());
            }
            if st.in_flight == Some(st.session.generation) {
                return Err(FeedError::AlreadyConnecting);
            }
            if let Some(task) = st.retry_task.take() {
                task.abort();
            }
            if st.session.state() == SessionState::Failed {
                st.session.reset_attempts();
            }
            st.session.bump_generation()
        };

        Arc::clone(&self.inner).attempt(generation).await
    }

    /// Tear down the session. Idempotent.
    pub async fn disconnect(&self) {
        let channel = {
            let mut st = self.inner.state.lock();
            st.session.bump_generation();
            st.in_flight = None;

            if let Some(task) = st.retry_task.take() {
                task.abort();
            }
            let channel = st.channel.take();

            let previous = st.session.state();
            st.session.reset();
            self.inner.window.lock().clear();

            if previous != SessionState::Disconnected {
                info!(from = %previous, "Feed session disconnected");
                self.inner.emit(FeedLifecycle::StateChanged {
                    from: previous,
                    to: SessionState::Disconnected,
                });
                self.inner.emit(FeedLifecycle::Disconnected { reason: None });
            }
            channel
        };

        if let Some(channel) = channel {
            channel.close().await;
        }
    }

    /// Choose the streams for the next connect; the live session is untouched
    pub fn set_streams(&self, selection: impl Into<StreamSelection>) {
        let selection = selection.into();
        debug!(streams = ?selection.resolve(), "Stream selection updated");
        self.inner.state.lock().selection = selection;
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.lock().session.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    pub fn reconnect_attempt(&self) -> u32 {
        self.inner.state.lock().session.reconnect_attempt()
    }

    /// Streams sent in the most recent subscribe
    pub fn subscribed_streams(&self) -> Vec<String> {
        self.inner.state.lock().session.subscribed_streams.clone()
    }

    /// Total handshakes begun by this client
    pub fn attempts_started(&self) -> u64 {
        self.inner.attempts_started.load(Ordering::SeqCst)
    }

    /// Most recent raw frames, oldest first
    pub fn recent_messages(&self) -> Vec<String> {
        self.inner.window.lock().snapshot()
    }

    pub fn subscribe_events(
        &self,
    ) -> Result<mpsc::UnboundedReceiver<DomainEvent>, ListenerLimitExceeded> {
        self.inner.events.subscribe()
    }

    pub fn lifecycle(&self) -> broadcast::Receiver<FeedLifecycle> {
        self.inner.lifecycle.subscribe()
    }
}

impl Inner {
    fn emit(&self, signal: FeedLifecycle) {
        // No receivers is fine
        let _ = self.lifecycle.send(signal);
    }

    /// Transition under the caller's lock and broadcast the change
    fn set_state(&self, st: &mut ClientState, next: SessionState) {
        match st.session.transition(next) {
            Ok(previous) => {
                debug!(from = %previous, to = %next, "Feed state changed");
                self.emit(FeedLifecycle::StateChanged {
                    from: previous,
                    to: next,
                });
            }
            Err(e) => error!(error = %e, "Rejected feed state change"),
        }
    }

    /// One handshake attempt for `generation`, boxed so retries can re-enter it
    fn attempt(self: Arc<Self>, generation: u64) -> BoxFuture<'static, FeedResult<()>> {
        Box::pin(async move {
            let (streams, attempt_no, channel_id) = {
                let mut st = self.state.lock();
                if st.session.generation != generation {
                    return Err(FeedError::Cancelled);
                }
                if st.in_flight == Some(generation) {
                    return Err(FeedError::AlreadyConnecting);
                }
                st.in_flight = Some(generation);
                st.retry_task = None;

                let streams = st.selection.resolve();
                st.session.subscribed_streams = streams.clone();
                self.set_state(&mut st, SessionState::Negotiating);

                let channel_id = self.attempts_started.fetch_add(1, Ordering::SeqCst) + 1;
                (streams, st.session.reconnect_attempt() + 1, channel_id)
            };
            let _abandoned = AbandonGuard {
                inner: Arc::clone(&self),
                generation,
            };

            info!(
                attempt = attempt_no,
                max_attempts = self.config.max_reconnect_attempts,
                url = %self.config.negotiate_url,
                "Starting feed handshake"
            );

            let result = Arc::clone(&self)
                .handshake(generation, channel_id, streams)
                .await;

            match result {
                Ok(channel) => self.complete(generation, channel).await,
                Err(err) => Err(self.fail(generation, err)),
            }
        })
    }

    async fn handshake(
        self: Arc<Self>,
        generation: u64,
        channel_id: u64,
        streams: Vec<String>,
    ) -> FeedResult<HubChannel> {
        let negotiation = self.negotiator.negotiate().await?;

        let headers = ChannelHeaders {
            user_agent: self.config.user_agent.clone(),
            accept_encoding: self.config.accept_encoding.clone(),
            cookie: negotiation.cookie.clone(),
        };
        let url = connect_url(&self.config.connect_url, &self.config.hub, &negotiation.token)
            .map_err(|e| FeedError::Transport {
                url: self.config.connect_url.clone(),
                reason: format!("invalid URL: {}", e),
            })?;

        {
            let mut st = self.state.lock();
            if st.session.generation != generation {
                return Err(FeedError::Cancelled);
            }
            st.session.connection_token = Some(negotiation.token);
            st.session.connection_id = negotiation.connection_id;
            st.session.cookie = negotiation.cookie;
            self.set_state(&mut st, SessionState::Opening);
        }

        let (channel, frames) =
            HubChannel::open(channel_id, url, &headers, self.config.channel_timeout).await?;
        tokio::spawn(Arc::clone(&self).dispatch(channel_id, frames));

        let stale = {
            let mut st = self.state.lock();
            if st.session.generation != generation {
                true
            } else {
                self.set_state(&mut st, SessionState::Subscribing);
                false
            }
        };
        if stale {
            channel.close().await;
            return Err(FeedError::Cancelled);
        }

        let request = SubscribeRequest::new(self.config.hub.clone(), streams);
        if let Err(e) = channel.subscribe(&request).await {
            channel.close().await;
            return Err(e);
        }

        info!(streams = ?request.args[0], "Subscribe sent");
        Ok(channel)
    }

    async fn complete(self: &Arc<Self>, generation: u64, channel: HubChannel) -> FeedResult<()> {
        let mut channel = Some(channel);

        let outcome = {
            let mut st = self.state.lock();

            if st.session.generation != generation {
                if st.in_flight == Some(generation) {
                    st.in_flight = None;
                }
                Err(FeedError::Cancelled)
            } else if !channel.as_ref().is_some_and(HubChannel::is_open) {
                // Dropped between subscribe and now
                Err(FeedError::Subscription(
                    "channel closed during subscribe".to_string(),
                ))
            } else {
                st.in_flight = None;
                self.set_state(&mut st, SessionState::Connected);
                st.channel = channel.take();
                self.emit(FeedLifecycle::Connected);
                info!(streams = st.session.subscribed_streams.len(), "Feed connected");
                Ok(())
            }
        };

        if let Some(channel) = channel {
            channel.close().await;
        }

        match outcome {
            Err(FeedError::Cancelled) => Err(FeedError::Cancelled),
            Err(err) => Err(self.fail(generation, err)),
            Ok(()) => Ok(()),
        }
    }

    /// Count a failed attempt and either schedule a retry or give up
    fn fail(self: &Arc<Self>, generation: u64, err: FeedError) -> FeedError {
        let mut st = self.state.lock();
        if st.in_flight == Some(generation) {
            st.in_flight = None;
        }
        if st.session.generation != generation || !err.counts_as_attempt() {
            return err;
        }

        let attempt = st.session.record_failure();
        let max = self.config.max_reconnect_attempts;

        if attempt < max {
            let delay = backoff_delay(self.config.base_reconnect_delay, attempt);
            warn!(
                attempt,
                max_attempts = max,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Feed handshake failed, retrying"
            );
            self.set_state(&mut st, SessionState::Reconnecting);

            let inner = Arc::clone(self);
            st.retry_task = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                // Failures are logged and rescheduled inside
                let _ = inner.attempt(generation).await;
            }));
            self.emit(FeedLifecycle::Reconnecting { attempt, delay });
        } else {
            error!(
                attempts = attempt,
                error = %err,
                "Feed handshake failed, giving up"
            );
            self.set_state(&mut st, SessionState::Failed);
            self.emit(FeedLifecycle::ConnectionFailed {
                attempts: attempt,
                last_error: err.clone(),
            });
        }

        err
    }

    /// Consume frames of one channel until it ends
    async fn dispatch(self: Arc<Self>, channel_id: u64, mut frames: mpsc::UnboundedReceiver<ChannelEvent>) {
        while let Some(event) = frames.recv().await {
            match event {
                ChannelEvent::Frame(text) => self.handle_frame(text),
                ChannelEvent::Closed { reason } => {
                    self.on_channel_closed(channel_id, reason);
                    break;
                }
            }
        }
    }

    fn handle_frame(&self, text: String) {
        self.window.lock().push(text.clone());

        let envelope = match Envelope::decode(&text) {
            Ok(env) => env,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable frame");
                return;
            }
        };

        match &envelope {
            Envelope::Hub(messages) => {
                for msg in messages.iter().filter(|m| m.feed_args().is_none()) {
                    debug!(method = %msg.method, args = msg.args.len(), "Ignoring hub message");
                }
            }
            Envelope::Response(result) => {
                debug!(streams = result.len(), "Received snapshot response");
            }
            Envelope::Connection(cursor) => debug!(cursor = %cursor, "Connection frame"),
            Envelope::State(state) => debug!(state = %state, "State frame"),
            Envelope::Identifier(id) => debug!(id = %id, "Invocation ack"),
            Envelope::Unrecognized(value) => {
                if value.as_object().is_some_and(|o| !o.is_empty()) {
                    debug!(frame = %value, "Unrecognized frame");
                }
            }
        }

        for event in envelope.into_events() {
            self.events.emit(event);
        }
    }

    fn on_channel_closed(&self, channel_id: u64, reason: String) {
        let mut st = self.state.lock();

        let current = st.channel.as_ref().map(HubChannel::id) == Some(channel_id);
        if !current || st.session.state() != SessionState::Connected {
            // Handshake in progress or already torn down; the owner handles it
            debug!(channel_id, reason = %reason, "Ignoring close of inactive channel");
            return;
        }

        warn!(reason = %reason, "Feed connection lost");
        st.channel = None;
        st.session.clear_credentials();
        self.set_state(&mut st, SessionState::Disconnected);
        self.emit(FeedLifecycle::Disconnected {
            reason: Some(FeedError::ConnectionLost(reason).to_string()),
        });
    }
}

/// Resets a handshake whose future was dropped before it settled.
///
/// `complete` and `fail` clear `in_flight`, so after either one this is a
/// no-op.
struct AbandonGuard {
    inner: Arc<Inner>,
    generation: u64,
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        let mut st = self.inner.state.lock();
        if st.in_flight != Some(self.generation) {
            return;
        }

        warn!(generation = self.generation, "Feed handshake abandoned");
        st.in_flight = None;
        st.session.bump_generation();
        st.session.clear_credentials();
        if st.session.state() != SessionState::Disconnected {
            self.inner.set_state(&mut st, SessionState::Disconnected);
            self.inner.emit(FeedLifecycle::Disconnected { reason: None });
        }
    }
}

#[async_trait]
impl EventSource for FeedClient {
    async fn connect(&self) -> FeedResult<()> {
        FeedClient::connect(self).await
    }

    async fn disconnect(&self) {
        FeedClient::disconnect(self).await
    }

    fn is_connected(&self) -> bool {
        FeedClient::is_connected(self)
    }

    fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<DomainEvent>, ListenerLimitExceeded> {
        self.subscribe_events()
    }
}
