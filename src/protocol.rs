//! Wire message types for both the WebSocket command set and the HTTP
//! endpoints. Alias fields are resolved by serde (`#[serde(alias = "...")]`)
//! onto one canonical field, rather than the dual-field-plus-accessor
//! shim the original broker used.

use serde::{Deserialize, Serialize};

/// A decoded WebSocket frame: `<verb> <json-body>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub verb: String,
    pub body: String,
}

impl Envelope {
    /// Splits `raw` on the first whitespace run into a verb and the
    /// remaining body. A frame with no body (e.g. bare `ping`) yields an
    /// empty body string.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let (verb, body) = match raw.split_once(char::is_whitespace) {
            Some((v, b)) => (v, b.trim_start()),
            None => (raw, ""),
        };
        Some(Self { verb: verb.to_lowercase(), body: body.to_string() })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecureMessage {
    #[serde(alias = "tkn")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscribeMessage {
    #[serde(alias = "ch")]
    pub channel: String,
    #[serde(default, alias = "ci")]
    pub client_info: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnsubscribeMessage {
    #[serde(alias = "ch")]
    pub channel: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishMessage {
    #[serde(alias = "ch")]
    pub channel: String,
    #[serde(alias = "msg")]
    pub message: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default, alias = "ext")]
    pub extention: Option<String>,
    #[serde(default, alias = "ci")]
    pub client_info: Option<String>,
}

/// The payload actually fanned out to subscribers. Deliberately has no
/// `client_info`/label field -- publish never forwards the publisher's
/// label into the delivered message.
///
/// `tag` and `extention` always serialize, defaulting to `""` when the
/// publisher omitted them -- the wire contract is the full four-field
/// object, not a sparse one.
#[derive(Debug, Clone, Serialize)]
pub struct PublishSendMessage {
    pub channel: String,
    pub message: String,
    pub tag: String,
    pub extention: String,
}

impl PublishSendMessage {
    #[must_use]
    pub fn new(channel: String, message: String, tag: Option<String>, extention: Option<String>) -> Self {
        Self { channel, message, tag: tag.unwrap_or_default(), extention: extention.unwrap_or_default() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreMessage {
    #[serde(alias = "cmd")]
    pub command: String,
    pub key: String,
    #[serde(default, alias = "val")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PluginMessage {
    #[serde(alias = "cmd")]
    pub command: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultMessage {
    pub result: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub error: String,
}

impl ResultMessage {
    #[must_use]
    pub fn success() -> Self {
        Self { result: "success", error: String::new() }
    }

    #[must_use]
    pub fn fail(error: impl Into<String>) -> Self {
        Self { result: "fail", error: error.into() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusMessage {
    pub version: String,
    pub channels: std::collections::BTreeMap<String, Vec<String>>,
}
