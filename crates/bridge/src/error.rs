use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Decode(#[from] benchlink_protocol::DecodeError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// A sent heartbeat went unacknowledged within the bound.
    #[error("heartbeat unacknowledged, forcing reconnect")]
    HeartbeatTimeout,

    /// The caller's wait expired. Only the wait is cancelled; whatever
    /// the remote side is doing continues.
    #[error("call `{id}` timed out after {timeout_ms}ms")]
    CallTimeout { id: String, timeout_ms: u64 },

    /// The bridge task has exited; no further traffic is possible.
    #[error("connection bridge is shut down")]
    Closed,
}

pub type Result<T> = std::result::Result<T, Error>;
