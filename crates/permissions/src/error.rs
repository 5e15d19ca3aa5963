use {benchlink_common::Capability, thiserror::Error};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// A runtime request outside the plugin's declared permission ceiling.
    /// Declared and requested capability sets must never diverge.
    #[error("plugin `{plugin_id}` requested undeclared capability `{capability}`")]
    Undeclared {
        plugin_id: String,
        capability: Capability,
    },

    #[error("plugin `{plugin_id}` is not registered with the capability broker")]
    Unregistered { plugin_id: String },
}

pub type Result<T> = std::result::Result<T, Error>;
