//! Daemon wiring: one event bus, one broker, one manager, one bridge.

use std::{path::PathBuf, sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    serde_json::{Value, json},
    tracing::{info, warn},
};

use {
    benchlink_bridge::{BridgeDelegate, ConnectionBridge, Options},
    benchlink_config::{BenchlinkConfig, BridgeConfig, PluginConfigStore, plugin_store},
    benchlink_events::{EventBus, EventKind, RuntimeEvent},
    benchlink_permissions::{CapabilityBroker, GrantStore, StaticApprovalPolicy},
    benchlink_protocol::{Envelope, EnvelopeType},
    benchlink_runtime::{FactoryRegistry, PluginManager, PluginManifest, bundled},
};

/// The user-global config directory, falling back to the working dir.
pub fn config_dir() -> PathBuf {
    benchlink_config::config_dir().unwrap_or_else(|| PathBuf::from("."))
}

pub fn grants_path() -> PathBuf {
    config_dir().join("grants.json")
}

pub fn default_plugin_dir() -> PathBuf {
    config_dir().join("plugins")
}

fn bridge_options(config: &BridgeConfig, url_override: Option<String>) -> Options {
    Options {
        url: url_override.unwrap_or_else(|| config.url.clone()),
        heartbeat_interval: Duration::from_secs(config.heartbeat_interval_secs),
        heartbeat_timeout: Duration::from_secs(config.heartbeat_timeout_secs),
        backoff_initial: Duration::from_secs(1),
        backoff_max: Duration::from_secs(config.backoff_max_secs),
        outbound_buffer: config.outbound_buffer,
        call_timeout: Duration::from_secs(config.call_timeout_secs),
    }
}

/// The bridge's inbound side: demultiplexed envelopes go to the plugin
/// manager; its response travels back out over the same socket.
struct ManagerDelegate {
    manager: Arc<PluginManager>,
}

#[async_trait]
impl BridgeDelegate for ManagerDelegate {
    async fn registration(&self) -> Value {
        self.manager.registration_payload().await
    }

    async fn handle(&self, envelope: Envelope) -> Option<Envelope> {
        match envelope.r#type {
            EnvelopeType::PluginMessage | EnvelopeType::ConfigUpdate => {
                Some(self.manager.route(&envelope).await)
            },
            // The control plane asking for a fresh status aggregate.
            EnvelopeType::StatusUpdate => {
                Some(envelope.reply(json!({ "plugins": self.manager.status().await })))
            },
            _ => None,
        }
    }
}

/// Forward lifecycle and failure events to the control plane as
/// unsolicited status pushes.
fn forward_events(bus: &EventBus, bridge: &ConnectionBridge) {
    for kind in [
        EventKind::PluginPhaseChanged,
        EventKind::PluginFailed,
        EventKind::PermissionResolved,
    ] {
        let bridge = bridge.clone();
        bus.subscribe(kind, move |event| {
            let plugin_id = match event {
                RuntimeEvent::PluginPhaseChanged { plugin_id, .. }
                | RuntimeEvent::PluginFailed { plugin_id, .. }
                | RuntimeEvent::PermissionResolved { plugin_id, .. } => plugin_id.clone(),
                _ => String::new(),
            };
            let envelope = Envelope::new(EnvelopeType::StatusUpdate, plugin_id)
                .with_payload(serde_json::to_value(event)?);
            // A closed bridge just means we are shutting down.
            let _ = bridge.send(envelope);
            Ok(())
        });
    }
}

async fn load_manifests(
    manager: &PluginManager,
    config: &BenchlinkConfig,
    plugin_dir: &PathBuf,
) {
    for mut manifest in bundled::manifests() {
        if let Some(entry) = config.plugins.get(&manifest.id) {
            manifest.enabled = entry.enabled;
            manifest.default_config =
                plugin_store::merge(&manifest.default_config, &entry.config);
        }
        if let Err(e) = manager.load(manifest).await {
            warn!(error = %e, "failed to load bundled plugin");
        }
    }

    match PluginManifest::discover(plugin_dir) {
        Ok(manifests) => {
            for manifest in manifests {
                let plugin_id = manifest.id.clone();
                if let Err(e) = manager.load(manifest).await {
                    warn!(plugin_id = %plugin_id, error = %e, "failed to load plugin manifest");
                }
            }
        },
        Err(e) => warn!(dir = %plugin_dir.display(), error = %e, "plugin discovery failed"),
    }
}

pub async fn run(url_override: Option<String>, plugin_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let config = benchlink_config::discover_and_load();
    let config_dir = config_dir();
    let data_root = benchlink_config::data_dir().unwrap_or_else(|| PathBuf::from("."));

    let bus = Arc::new(EventBus::new());
    let broker = Arc::new(CapabilityBroker::new(
        GrantStore::load(grants_path())?,
        Arc::new(StaticApprovalPolicy::new(
            config.permissions.auto_grant.clone(),
            config.permissions.auto_deny.clone(),
        )),
        Arc::clone(&bus),
    ));

    let mut registry = FactoryRegistry::new();
    bundled::register_all(&mut registry);

    let manager = Arc::new(PluginManager::new(
        registry,
        broker,
        Arc::clone(&bus),
        PluginConfigStore::new(config_dir.join("plugin-config")),
        data_root,
    ));

    let plugin_dir = plugin_dir.unwrap_or_else(default_plugin_dir);
    load_manifests(&manager, &config, &plugin_dir).await;

    manager.initialize_all().await;
    manager.start_all().await;

    let bridge = ConnectionBridge::spawn(
        bridge_options(&config.bridge, url_override),
        Arc::new(ManagerDelegate {
            manager: Arc::clone(&manager),
        }),
        Arc::clone(&bus),
    );
    forward_events(&bus, &bridge);

    info!("benchlink companion running");
    tokio::signal::ctrl_c().await?;

    info!("shutting down");
    manager.stop_all().await;
    manager.destroy_all().await;
    Ok(())
}
