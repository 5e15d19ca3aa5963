//! The contract every concrete plugin implements.

use std::{path::PathBuf, sync::Arc};

use {
    async_trait::async_trait,
    benchlink_common::{Capability, PluginError},
    benchlink_events::EventBus,
    benchlink_permissions::CapabilityBroker,
    serde_json::Value,
};

use crate::manifest::PluginManifest;

/// Collaborators and identity injected into every hook invocation.
///
/// The context owns nothing a plugin must release; it is the plugin's
/// window onto the host. The data directory is exclusively this plugin's.
#[derive(Clone)]
pub struct PluginContext {
    pub manifest: Arc<PluginManifest>,
    pub data_dir: PathBuf,
    /// Effective configuration snapshot (manifest defaults merged with
    /// persisted overrides). Replaced wholesale on `config_update`.
    pub config: Value,
    pub broker: Arc<CapabilityBroker>,
    pub bus: Arc<EventBus>,
}

impl PluginContext {
    #[must_use]
    pub fn plugin_id(&self) -> &str {
        &self.manifest.id
    }

    /// Gate a privileged operation. Denial maps to the ordinary
    /// `PermissionDenied` result; a broker error (undeclared capability)
    /// is surfaced as-is so the divergence is loud.
    pub async fn require(&self, capability: Capability) -> Result<(), PluginError> {
        match self.broker.request(self.plugin_id(), capability).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(PluginError::permission_denied(capability)),
            Err(e) => Err(PluginError::other(e.to_string())),
        }
    }

    /// String-valued config key, if present.
    #[must_use]
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }

    /// Path-valued config key, if present and non-empty.
    #[must_use]
    pub fn config_path(&self, key: &str) -> Option<PathBuf> {
        self.config_str(key)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
    }
}

/// Lifecycle hooks plus the message handler.
///
/// The manager's lifecycle guard — not the plugin — prevents hooks from
/// running in the wrong phase or twice. `stop` must be safe even if
/// `start` partially failed. `on_message` dispatches on the action string
/// with a mandatory unknown-action branch, and consults
/// [`PluginContext::require`] before anything privileged.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// One-time setup: read config, prepare the data directory.
    async fn initialize(&mut self, _ctx: &PluginContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Acquire runtime resources: spawn a sidecar, begin watching.
    async fn start(&mut self, _ctx: &PluginContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Release everything `start` acquired.
    async fn stop(&mut self, _ctx: &PluginContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Final teardown after `stop`.
    async fn destroy(&mut self, _ctx: &PluginContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Handle one routed action.
    async fn on_message(
        &mut self,
        ctx: &PluginContext,
        action: &str,
        payload: Value,
    ) -> Result<Value, PluginError>;

    /// Free-form fields merged into the aggregated status report.
    fn status(&self) -> Value {
        Value::Object(serde_json::Map::new())
    }
}
