//! Typed configuration schema with serde defaults for every field.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Top-level configuration (`benchlink.toml` and friends).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchlinkConfig {
    pub bridge: BridgeConfig,
    pub permissions: PermissionsConfig,
    /// Per-plugin sections: `[plugins.<id>]`.
    pub plugins: HashMap<String, PluginEntry>,
}

/// Connection bridge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Control-plane WebSocket endpoint.
    pub url: String,
    pub heartbeat_interval_secs: u64,
    pub heartbeat_timeout_secs: u64,
    /// Cap for the exponential reconnect backoff.
    pub backoff_max_secs: u64,
    /// Envelopes held while disconnected; oldest dropped beyond this.
    pub outbound_buffer: usize,
    /// How long a routed call waits for its correlated response.
    pub call_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8787/companion".into(),
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 10,
            backoff_max_secs: 30,
            outbound_buffer: 256,
            call_timeout_secs: 60,
        }
    }
}

/// Capability broker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionsConfig {
    /// How long an operator-approval prompt may stay unanswered.
    pub approval_timeout_secs: u64,
    /// `plugin:capability` patterns the headless policy grants without
    /// prompting. `*` matches any plugin id, e.g. `*:file:read`.
    pub auto_grant: Vec<String>,
    /// Patterns the headless policy denies without prompting. Deny wins
    /// over grant when both match.
    pub auto_deny: Vec<String>,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            approval_timeout_secs: 120,
            auto_grant: Vec::new(),
            auto_deny: Vec::new(),
        }
    }
}

/// One `[plugins.<id>]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginEntry {
    pub enabled: bool,
    /// Free-form configuration merged over the manifest's defaults.
    pub config: serde_json::Value,
}

impl Default for PluginEntry {
    fn default() -> Self {
        Self {
            enabled: true,
            config: serde_json::Value::Object(serde_json::Map::new()),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let cfg = BenchlinkConfig::default();
        assert_eq!(cfg.bridge.heartbeat_interval_secs, 30);
        assert_eq!(cfg.bridge.outbound_buffer, 256);
        assert_eq!(cfg.permissions.approval_timeout_secs, 120);
        assert!(cfg.plugins.is_empty());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: BenchlinkConfig = toml::from_str(
            r#"
[bridge]
url = "ws://shop-server.local:9000/companion"

[plugins.container-tool]
enabled = false
"#,
        )
        .unwrap();
        assert_eq!(cfg.bridge.url, "ws://shop-server.local:9000/companion");
        assert_eq!(cfg.bridge.backoff_max_secs, 30);
        assert!(!cfg.plugins["container-tool"].enabled);
    }

    #[test]
    fn plugin_config_table_is_free_form() {
        let cfg: BenchlinkConfig = toml::from_str(
            r#"
[plugins.container-tool.config]
socket = "/var/run/docker.sock"
poll_secs = 15
"#,
        )
        .unwrap();
        let table = &cfg.plugins["container-tool"].config;
        assert_eq!(table["socket"], "/var/run/docker.sock");
        assert_eq!(table["poll_secs"], 15);
    }
}
