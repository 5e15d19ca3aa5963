use {benchlink_common::capability::UnknownCapability, thiserror::Error};

use crate::lifecycle::LifecyclePhase;

#[derive(Debug, Error)]
pub enum Error {
    // ── Load-time validation ────────────────────────────────────────────
    #[error("invalid manifest for `{plugin_id}`: {reason}")]
    InvalidManifest { plugin_id: String, reason: String },

    #[error("manifest for `{plugin_id}` declares a capability outside the closed vocabulary: {source}")]
    UnknownCapability {
        plugin_id: String,
        #[source]
        source: UnknownCapability,
    },

    #[error("entry point `{entry_point}` for `{plugin_id}` is not registered")]
    UnresolvedEntryPoint {
        plugin_id: String,
        entry_point: String,
    },

    #[error("plugin `{plugin_id}` is already loaded")]
    Duplicate { plugin_id: String },

    // ── Lifecycle ───────────────────────────────────────────────────────
    /// A transition method called from the wrong phase. The instance's
    /// state is unchanged.
    #[error("cannot {attempted} plugin `{plugin_id}` from phase {from}")]
    Lifecycle {
        plugin_id: String,
        from: LifecyclePhase,
        attempted: &'static str,
    },

    /// A lifecycle hook errored; the instance is parked in `Failed`.
    #[error("plugin `{plugin_id}` {hook} failed: {message}")]
    Hook {
        plugin_id: String,
        hook: &'static str,
        message: String,
    },

    // ── Routing ─────────────────────────────────────────────────────────
    #[error("no plugin `{plugin_id}` is loaded")]
    UnknownPlugin { plugin_id: String },

    #[error("plugin `{plugin_id}` is not started (phase {phase})")]
    NotStarted {
        plugin_id: String,
        phase: LifecyclePhase,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] benchlink_config::plugin_store::Error),
}

impl Error {
    /// Wire code used when the error travels back as an error envelope.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidManifest { .. }
            | Self::UnknownCapability { .. }
            | Self::UnresolvedEntryPoint { .. }
            | Self::Duplicate { .. } => "load_error",
            Self::Lifecycle { .. } => "lifecycle_error",
            Self::Hook { .. } => "plugin_failed",
            Self::UnknownPlugin { .. } | Self::NotStarted { .. } => "routing_error",
            Self::Io(_) | Self::Config(_) => "internal_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
