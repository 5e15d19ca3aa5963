//! Persisted permission grants.
//!
//! One JSON file maps `"<plugin_id>:<capability>"` to the operator's
//! decision. The whole file is rewritten on every change; the store is
//! small and the write keeps it human-editable.

use std::{collections::BTreeMap, path::PathBuf};

use {
    benchlink_common::Capability,
    serde::{Deserialize, Serialize},
    tracing::debug,
};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoredDecision {
    Granted,
    Denied,
}

/// The persisted `(plugin_id, capability) → decision` map.
pub struct GrantStore {
    path: PathBuf,
    grants: BTreeMap<String, StoredDecision>,
}

fn key(plugin_id: &str, capability: Capability) -> String {
    format!("{plugin_id}:{capability}")
}

impl GrantStore {
    /// Load the store from `path`; a missing file is an empty store.
    pub fn load(path: PathBuf) -> Result<Self> {
        let grants = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, grants })
    }

    pub fn get(&self, plugin_id: &str, capability: Capability) -> Option<bool> {
        self.grants
            .get(&key(plugin_id, capability))
            .map(|d| *d == StoredDecision::Granted)
    }

    /// Persist an explicit operator decision.
    pub fn set(&mut self, plugin_id: &str, capability: Capability, granted: bool) -> Result<()> {
        let decision = if granted {
            StoredDecision::Granted
        } else {
            StoredDecision::Denied
        };
        self.grants.insert(key(plugin_id, capability), decision);
        self.persist()
    }

    /// Delete a persisted decision. Returns whether one existed. Only
    /// future requests are affected.
    pub fn remove(&mut self, plugin_id: &str, capability: Capability) -> Result<bool> {
        let existed = self.grants.remove(&key(plugin_id, capability)).is_some();
        if existed {
            self.persist()?;
        }
        Ok(existed)
    }

    /// All persisted `(key, granted)` pairs, sorted by key.
    pub fn entries(&self) -> impl Iterator<Item = (&str, bool)> {
        self.grants
            .iter()
            .map(|(k, d)| (k.as_str(), *d == StoredDecision::Granted))
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&self.grants)?)?;
        debug!(path = %self.path.display(), entries = self.grants.len(), "persisted grant store");
        Ok(())
    }
}
