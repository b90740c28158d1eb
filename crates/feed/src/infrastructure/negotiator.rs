use pitwall_ports::{FeedError, FeedResult};
use reqwest::Client;
use reqwest::header::{SET_COOKIE, USER_AGENT};
use std::time::Duration;
use tracing::debug;

use crate::domain::NegotiateResponse;
use crate::domain::protocol::negotiate_url;

/// Result of a successful negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiation {
    pub token: String,
    pub connection_id: Option<String>,
    /// First `Set-Cookie` header, verbatim
    pub cookie: Option<String>,
}

/// HTTP client for the negotiate step
/// Infrastructure component - handles the one-shot token request
#[derive(Clone)]
pub struct Negotiator {
    client: Client,
    base_url: String,
    hub: String,
    user_agent: String,
    timeout: Duration,
}

impl Negotiator {
    pub fn new(
        base_url: impl Into<String>,
        hub: impl Into<String>,
        user_agent: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Negotiator {
            client: Client::new(),
            base_url: base_url.into(),
            hub: hub.into(),
            user_agent: user_agent.into(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Request a connection token.
    ///
    /// The whole exchange (request and body) is bounded by the timeout.
    pub async fn negotiate(&self) -> FeedResult<Negotiation> {
        let url = negotiate_url(&self.base_url, &self.hub)
            .map_err(|e| self.error(format!("invalid URL: {}", e)))?;

        let exchange = async {
            let resp = self
                .client
                .get(url)
                .header(USER_AGENT, &self.user_agent)
                .send()
                .await
                .map_err(|e| self.error(e.to_string()))?;

            let status = resp.status();
            if !status.is_success() {
                return Err(self.error(format!("unexpected status {}", status)));
            }

            let cookie = resp
                .headers()
                .get(SET_COOKIE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let body = resp.text().await.map_err(|e| self.error(e.to_string()))?;
            Ok::<_, FeedError>((cookie, body))
        };

        let (cookie, body) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| self.error(format!("timed out after {:?}", self.timeout)))??;

        let parsed: NegotiateResponse = serde_json::from_str(&body)
            .map_err(|e| self.error(format!("invalid response body: {}", e)))?;

        let token = parsed
            .connection_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| self.error("response has no ConnectionToken".to_string()))?;

        debug!(
            url = %self.base_url,
            connection_id = ?parsed.connection_id,
            has_cookie = cookie.is_some(),
            "Negotiation succeeded"
        );

        Ok(Negotiation {
            token,
            connection_id: parsed.connection_id,
            cookie,
        })
    }

    fn error(&self, reason: String) -> FeedError {
        FeedError::Negotiation {
            url: self.base_url.clone(),
            reason,
        }
    }
}
