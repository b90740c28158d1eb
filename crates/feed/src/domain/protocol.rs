//! Wire shapes of the hub protocol

use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

pub const CLIENT_PROTOCOL: &str = "1.5";
pub const TRANSPORT: &str = "webSockets";
pub const SUBSCRIBE_METHOD: &str = "Subscribe";

/// `connectionData` query value: `[{"name":"<hub>"}]`
pub fn connection_data(hub: &str) -> String {
    json!([{ "name": hub }]).to_string()
}

/// Negotiation URL with protocol and hub query parameters
pub fn negotiate_url(base: &str, hub: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(base)?;
    url.query_pairs_mut()
        .append_pair("clientProtocol", CLIENT_PROTOCOL)
        .append_pair("connectionData", &connection_data(hub));
    Ok(url)
}

/// Duplex channel URL carrying the negotiated token
pub fn connect_url(base: &str, hub: &str, token: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(base)?;
    url.query_pairs_mut()
        .append_pair("transport", TRANSPORT)
        .append_pair("clientProtocol", CLIENT_PROTOCOL)
        .append_pair("connectionToken", token)
        .append_pair("connectionData", &connection_data(hub));
    Ok(url)
}

/// Body of a successful negotiation
#[derive(Debug, Clone, Deserialize)]
pub struct NegotiateResponse {
    #[serde(rename = "ConnectionToken", default)]
    pub connection_token: Option<String>,
    #[serde(rename = "ConnectionId", default)]
    pub connection_id: Option<String>,
}

/// Outbound subscribe invocation
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeRequest {
    #[serde(rename = "H")]
    pub hub: String,
    #[serde(rename = "M")]
    pub method: &'static str,
    /// Single argument: the list of stream names
    #[serde(rename = "A")]
    pub args: [Vec<String>; 1],
    #[serde(rename = "I")]
    pub id: u64,
}

impl SubscribeRequest {
    pub fn new(hub: impl Into<String>, streams: Vec<String>) -> Self {
        Self {
            hub: hub.into(),
            method: SUBSCRIBE_METHOD,
            args: [streams],
            id: 1,
        }
    }
}
