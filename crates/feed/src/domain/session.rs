use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Connection state of a feed session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Negotiating,
    Opening,
    Subscribing,
    Connected,
    /// Waiting on a backoff timer before the next handshake
    Reconnecting,
    /// Attempts exhausted; only an explicit connect leaves this state
    Failed,
}

impl SessionState {
    /// A handshake phase is running
    pub fn is_handshaking(&self) -> bool {
        matches!(
            self,
            SessionState::Negotiating | SessionState::Opening | SessionState::Subscribing
        )
    }

    /// Whether `self -> next` is a legal step.
    ///
    /// Any state may drop straight to `Disconnected` (explicit teardown).
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;

        if next == Disconnected {
            return *self != Disconnected;
        }

        match (self, next) {
            (Disconnected | Reconnecting | Failed, Negotiating) => true,
            (Negotiating, Opening) => true,
            (Opening, Subscribing) => true,
            (Subscribing, Connected) => true,
            (Negotiating | Opening | Subscribing, Reconnecting | Failed) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Negotiating => "negotiating",
            SessionState::Opening => "opening",
            SessionState::Subscribing => "subscribing",
            SessionState::Connected => "connected",
            SessionState::Reconnecting => "reconnecting",
            SessionState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid session transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub to: SessionState,
}

/// One logical session with the upstream hub
#[derive(Debug, Clone)]
pub struct FeedSession {
    /// Issued by negotiation, required before the channel opens
    pub connection_token: Option<String>,
    pub connection_id: Option<String>,
    /// `Set-Cookie` value replayed on the channel request
    pub cookie: Option<String>,
    state: SessionState,
    reconnect_attempt: u32,
    pub subscribed_streams: Vec<String>,
    /// Bumped by explicit connect/disconnect; stale timers compare against it
    pub generation: u64,
}

impl Default for FeedSession {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedSession {
    pub fn new() -> Self {
        Self {
            connection_token: None,
            connection_id: None,
            cookie: None,
            state: SessionState::Disconnected,
            reconnect_attempt: 0,
            subscribed_streams: Vec::new(),
            generation: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn reconnect_attempt(&self) -> u32 {
        self.reconnect_attempt
    }

    /// Move to `next`, returning the previous state
    pub fn transition(&mut self, next: SessionState) -> Result<SessionState, InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        let previous = self.state;
        self.state = next;
        if next == SessionState::Connected {
            self.reconnect_attempt = 0;
        }
        Ok(previous)
    }

    /// Record a failed handshake, returning the new attempt count
    pub fn record_failure(&mut self) -> u32 {
        self.reconnect_attempt = self.reconnect_attempt.saturating_add(1);
        self.clear_credentials();
        self.reconnect_attempt
    }

    /// Start a fresh attempt cycle after terminal failure
    pub fn reset_attempts(&mut self) {
        self.reconnect_attempt = 0;
    }

    pub fn clear_credentials(&mut self) {
        self.connection_token = None;
        self.connection_id = None;
        self.cookie = None;
    }

    pub fn bump_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Explicit teardown: back to `Disconnected` with a clean slate
    pub fn reset(&mut self) {
        self.clear_credentials();
        self.reconnect_attempt = 0;
        self.state = SessionState::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut session = FeedSession::new();
        for next in [Negotiating, Opening, Subscribing, Connected] {
            session.transition(next).unwrap();
        }
        assert_eq!(session.state(), Connected);
    }

    #[test]
    fn test_phases_cannot_be_skipped() {
        let mut session = FeedSession::new();
        assert!(session.transition(Opening).is_err());
        assert!(session.transition(Connected).is_err());

        session.transition(Negotiating).unwrap();
        let err = session.transition(Subscribing).unwrap_err();
        assert_eq!(err.from, Negotiating);
        assert_eq!(err.to, Subscribing);
    }

    #[test]
    fn test_connected_only_leaves_to_disconnected() {
        let mut session = FeedSession::new();
        for next in [Negotiating, Opening, Subscribing, Connected] {
            session.transition(next).unwrap();
        }
        assert!(session.transition(Reconnecting).is_err());
        assert!(session.transition(Negotiating).is_err());
        assert!(session.transition(Disconnected).is_ok());
    }

    #[test]
    fn test_failure_counts_and_connected_resets() {
        let mut session = FeedSession::new();
        session.transition(Negotiating).unwrap();
        session.connection_token = Some("abc".into());

        assert_eq!(session.record_failure(), 1);
        assert!(session.connection_token.is_none());
        session.transition(Reconnecting).unwrap();
        session.transition(Negotiating).unwrap();
        assert_eq!(session.record_failure(), 2);
        session.transition(Reconnecting).unwrap();

        session.transition(Negotiating).unwrap();
        session.transition(Opening).unwrap();
        session.transition(Subscribing).unwrap();
        session.transition(Connected).unwrap();
        assert_eq!(session.reconnect_attempt(), 0);
    }

    #[test]
    fn test_failed_allows_fresh_negotiation() {
        let mut session = FeedSession::new();
        session.transition(Negotiating).unwrap();
        session.transition(Failed).unwrap();
        assert!(session.transition(Opening).is_err());
        assert!(session.transition(Negotiating).is_ok());
    }

    #[test]
    fn test_disconnected_to_disconnected_rejected() {
        let mut session = FeedSession::new();
        assert!(session.transition(Disconnected).is_err());
    }
}
