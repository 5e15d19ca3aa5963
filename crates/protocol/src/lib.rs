//! Control-plane wire protocol.
//!
//! All communication between the companion process and the remote control
//! plane is JSON envelopes over a single WebSocket. One envelope shape
//! covers every direction; `type` discriminates, `id` correlates a
//! response with the request that caused it.

use {
    serde::{Deserialize, Serialize},
    thiserror::Error,
};

// ── Constants ────────────────────────────────────────────────────────────────

pub const MAX_PAYLOAD_BYTES: usize = 524_288; // 512 KB
pub const HEARTBEAT_INTERVAL_MS: u64 = 30_000; // 30s
pub const HEARTBEAT_TIMEOUT_MS: u64 = 10_000; // 10s
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 60_000; // 60s
pub const DEFAULT_OUTBOUND_BUFFER: usize = 256; // envelopes held while offline

// ── Envelope ─────────────────────────────────────────────────────────────────

/// Discriminator for every envelope on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeType {
    /// Sent by the companion on connect: which plugins are available.
    Registration,
    /// A routed plugin request or its successful response.
    PluginMessage,
    /// Unsolicited status push (lifecycle changes, health).
    StatusUpdate,
    /// Error response correlated to a request id.
    Error,
    /// Remote update to a plugin's configuration snapshot.
    ConfigUpdate,
    /// Heartbeat; echoed back with the same id as acknowledgement.
    Ping,
}

/// The unit of all cross-boundary communication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    /// Epoch milliseconds at creation.
    pub timestamp: i64,
    pub r#type: EnvelopeType,
    #[serde(rename = "pluginId", default, skip_serializing_if = "String::is_empty")]
    pub plugin_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub action: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
}

impl Envelope {
    /// Fresh envelope with a v4 id and the current timestamp.
    #[must_use]
    pub fn new(r#type: EnvelopeType, plugin_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            r#type,
            plugin_id: plugin_id.into(),
            action: String::new(),
            payload: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Successful response to this envelope, correlated by id.
    #[must_use]
    pub fn reply(&self, payload: serde_json::Value) -> Self {
        Self {
            id: self.id.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            r#type: EnvelopeType::PluginMessage,
            plugin_id: self.plugin_id.clone(),
            action: self.action.clone(),
            payload,
        }
    }

    /// Error response to this envelope, correlated by id.
    #[must_use]
    pub fn reply_error(&self, error: ErrorShape) -> Self {
        Self {
            id: self.id.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            r#type: EnvelopeType::Error,
            plugin_id: self.plugin_id.clone(),
            action: self.action.clone(),
            payload: serde_json::to_value(&error).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Heartbeat acknowledgement: a ping echoing this envelope's id.
    #[must_use]
    pub fn pong(&self) -> Self {
        Self {
            id: self.id.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            r#type: EnvelopeType::Ping,
            plugin_id: String::new(),
            action: String::new(),
            payload: serde_json::Value::Null,
        }
    }
}

// ── Error shape ──────────────────────────────────────────────────────────────

/// Error payload carried by `EnvelopeType::Error` envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorShape {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorShape {
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

// ── Decode ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid envelope json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("envelope exceeds {MAX_PAYLOAD_BYTES} bytes ({0})")]
    TooLarge(usize),
}

/// Parse one wire frame into an envelope, enforcing the payload bound.
pub fn decode(text: &str) -> Result<Envelope, DecodeError> {
    if text.len() > MAX_PAYLOAD_BYTES {
        return Err(DecodeError::TooLarge(text.len()));
    }
    Ok(serde_json::from_str(text)?)
}
