//! The broker itself: declared-ceiling enforcement, persisted-decision
//! idempotency, prompt-on-miss.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use {
    benchlink_common::{Capability, CapabilitySet},
    benchlink_events::{EventBus, RuntimeEvent},
    serde::Serialize,
    tokio::sync::RwLock,
    tracing::{info, warn},
};

use crate::{
    error::{Error, Result},
    prompt::{ApprovalDecision, ApprovalPrompt},
    store::GrantStore,
};

/// State of one `(plugin_id, capability)` grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    /// A prompt is in flight and unanswered.
    Pending,
}

/// One row of the grant listing surfaced to operators.
#[derive(Debug, Clone, Serialize)]
pub struct GrantRecord {
    pub plugin_id: String,
    pub capability: String,
    pub granted: bool,
}

/// Mediates every privileged operation.
///
/// Denial is ordinary control flow: `request` returns `Ok(false)` and the
/// caller fails its own operation with a `PermissionDenied` result. An
/// `Err` from here means the request itself was invalid (undeclared
/// capability, unregistered plugin) or the store could not be written.
pub struct CapabilityBroker {
    store: RwLock<GrantStore>,
    declared: RwLock<HashMap<String, CapabilitySet>>,
    in_flight: RwLock<HashSet<String>>,
    prompt: Arc<dyn ApprovalPrompt>,
    bus: Arc<EventBus>,
}

impl CapabilityBroker {
    #[must_use]
    pub fn new(store: GrantStore, prompt: Arc<dyn ApprovalPrompt>, bus: Arc<EventBus>) -> Self {
        Self {
            store: RwLock::new(store),
            declared: RwLock::new(HashMap::new()),
            in_flight: RwLock::new(HashSet::new()),
            prompt,
            bus,
        }
    }

    /// Install a plugin's declared permission ceiling at load time.
    pub async fn register_plugin(&self, plugin_id: &str, declared: CapabilitySet) {
        self.declared
            .write()
            .await
            .insert(plugin_id.to_string(), declared);
    }

    /// Drop a plugin's ceiling when it is destroyed. Persisted grants are
    /// kept; they apply again if the plugin is reloaded.
    pub async fn unregister_plugin(&self, plugin_id: &str) {
        self.declared.write().await.remove(plugin_id);
    }

    /// Resolve whether `plugin_id` may exercise `capability`.
    ///
    /// Idempotent once persisted: repeated calls return the stored boolean
    /// without re-prompting. A prompt timeout resolves to `false` but is
    /// not persisted, so a later request asks again.
    pub async fn request(&self, plugin_id: &str, capability: Capability) -> Result<bool> {
        {
            let declared = self.declared.read().await;
            let ceiling = declared.get(plugin_id).ok_or_else(|| Error::Unregistered {
                plugin_id: plugin_id.to_string(),
            })?;
            if !ceiling.contains(&capability) {
                warn!(plugin_id, capability = %capability, "undeclared capability requested");
                return Err(Error::Undeclared {
                    plugin_id: plugin_id.to_string(),
                    capability,
                });
            }
        }

        if let Some(granted) = self.store.read().await.get(plugin_id, capability) {
            return Ok(granted);
        }

        let flight_key = format!("{plugin_id}:{capability}");
        self.in_flight.write().await.insert(flight_key.clone());
        let decision = self.prompt.decide(plugin_id, capability).await;
        self.in_flight.write().await.remove(&flight_key);

        let granted = match decision {
            ApprovalDecision::Approved => {
                self.store
                    .write()
                    .await
                    .set(plugin_id, capability, true)?;
                true
            },
            ApprovalDecision::Denied => {
                self.store
                    .write()
                    .await
                    .set(plugin_id, capability, false)?;
                false
            },
            ApprovalDecision::Timeout => false,
        };

        info!(plugin_id, capability = %capability, granted, "permission resolved");
        self.bus.emit(&RuntimeEvent::PermissionResolved {
            plugin_id: plugin_id.to_string(),
            capability: capability.to_string(),
            granted,
        });
        Ok(granted)
    }

    /// Delete a persisted decision; only future requests are affected.
    pub async fn revoke(&self, plugin_id: &str, capability: Capability) -> Result<bool> {
        let existed = self.store.write().await.remove(plugin_id, capability)?;
        if existed {
            info!(plugin_id, capability = %capability, "permission revoked");
            self.bus.emit(&RuntimeEvent::PermissionRevoked {
                plugin_id: plugin_id.to_string(),
                capability: capability.to_string(),
            });
        }
        Ok(existed)
    }

    /// Current state of one grant, if any request was ever made.
    pub async fn state(&self, plugin_id: &str, capability: Capability) -> Option<PermissionState> {
        if let Some(granted) = self.store.read().await.get(plugin_id, capability) {
            return Some(if granted {
                PermissionState::Granted
            } else {
                PermissionState::Denied
            });
        }
        let flight_key = format!("{plugin_id}:{capability}");
        if self.in_flight.read().await.contains(&flight_key) {
            return Some(PermissionState::Pending);
        }
        None
    }

    /// Every persisted grant, for the operator listing.
    pub async fn grants(&self) -> Vec<GrantRecord> {
        self.store
            .read()
            .await
            .entries()
            .filter_map(|(key, granted)| {
                key.split_once(':').map(|(plugin_id, capability)| GrantRecord {
                    plugin_id: plugin_id.to_string(),
                    capability: capability.to_string(),
                    granted,
                })
            })
            .collect()
    }
}
