//! Per-plugin configuration store.
//!
//! A plugin's effective configuration snapshot is its manifest's
//! `default_config` merged (key by key, override wins) with persisted
//! overrides. Overrides arrive from `[plugins.<id>.config]` tables and
//! from remote `config_update` envelopes; the latter are persisted here so
//! they survive restarts.

use std::path::PathBuf;

use {serde_json::Value, thiserror::Error, tracing::debug};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("config update for {plugin_id} is not a JSON object")]
    NotAnObject { plugin_id: String },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Shallow-merge `overlay` over `base`. Both are expected to be objects;
/// a non-object overlay replaces `base` wholesale.
#[must_use]
pub fn merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(b), Value::Object(o)) => {
            let mut out = b.clone();
            for (k, v) in o {
                out.insert(k.clone(), v.clone());
            }
            Value::Object(out)
        },
        (_, overlay) => overlay.clone(),
    }
}

/// Persists per-plugin override objects as JSON files under one directory.
pub struct PluginConfigStore {
    dir: PathBuf,
}

impl PluginConfigStore {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, plugin_id: &str) -> PathBuf {
        self.dir.join(format!("{plugin_id}.json"))
    }

    /// Persisted overrides for one plugin; empty object when none exist.
    pub fn overrides(&self, plugin_id: &str) -> Result<Value> {
        let path = self.path_for(plugin_id);
        if !path.exists() {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        let raw = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// The effective snapshot: manifest defaults with overrides applied.
    pub fn snapshot(&self, plugin_id: &str, defaults: &Value) -> Result<Value> {
        Ok(merge(defaults, &self.overrides(plugin_id)?))
    }

    /// Merge `patch` into the persisted overrides and return the new
    /// effective snapshot against `defaults`.
    pub fn apply_update(
        &self,
        plugin_id: &str,
        defaults: &Value,
        patch: &Value,
    ) -> Result<Value> {
        if !patch.is_object() {
            return Err(Error::NotAnObject {
                plugin_id: plugin_id.to_string(),
            });
        }
        let merged = merge(&self.overrides(plugin_id)?, patch);
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path_for(plugin_id), serde_json::to_string_pretty(&merged)?)?;
        debug!(plugin_id, "persisted plugin config update");
        Ok(merge(defaults, &merged))
    }
}
