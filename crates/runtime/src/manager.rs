//! Lifecycle orchestration and message routing.
//!
//! The manager owns every plugin instance behind its own async mutex:
//! one plugin's handlers serialize, different plugins interleave, and a
//! broken plugin never takes the host or its siblings down with it.

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use {
    benchlink_config::PluginConfigStore,
    benchlink_events::{EventBus, RuntimeEvent},
    benchlink_permissions::CapabilityBroker,
    benchlink_protocol::{Envelope, EnvelopeType, ErrorShape},
    serde::Serialize,
    tokio::sync::{Mutex, RwLock},
    tracing::{info, warn},
};

use crate::{
    contract::{Plugin, PluginContext},
    error::{Error, Result},
    lifecycle::LifecyclePhase,
    manifest::PluginManifest,
    registry::FactoryRegistry,
};

// ── Instance ────────────────────────────────────────────────────────────────

struct LoadedPlugin {
    ctx: PluginContext,
    phase: LifecyclePhase,
    plugin: Box<dyn Plugin>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hook {
    Initialize,
    Start,
    Stop,
    Destroy,
}

impl Hook {
    const fn name(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Destroy => "destroy",
        }
    }

    const fn next_phase(self) -> LifecyclePhase {
        match self {
            Self::Initialize => LifecyclePhase::Initialized,
            Self::Start => LifecyclePhase::Started,
            Self::Stop => LifecyclePhase::Initialized,
            Self::Destroy => LifecyclePhase::Destroyed,
        }
    }

    const fn allowed_from(self, phase: LifecyclePhase) -> bool {
        match self {
            Self::Initialize => matches!(phase, LifecyclePhase::Uninitialized),
            Self::Start => matches!(phase, LifecyclePhase::Initialized),
            Self::Stop => matches!(phase, LifecyclePhase::Started),
            Self::Destroy => matches!(phase, LifecyclePhase::Initialized | LifecyclePhase::Failed),
        }
    }
}

// ── Status ──────────────────────────────────────────────────────────────────

/// One plugin's row in the aggregated status report.
#[derive(Debug, Clone, Serialize)]
pub struct PluginStatusReport {
    pub plugin_id: String,
    pub name: String,
    pub version: String,
    pub phase: LifecyclePhase,
    pub permissions: Vec<String>,
    /// Plugin-contributed free-form fields.
    pub status: serde_json::Value,
}

// ── Manager ─────────────────────────────────────────────────────────────────

/// Owns plugin discovery, lifecycle, and routing.
pub struct PluginManager {
    registry: FactoryRegistry,
    broker: Arc<CapabilityBroker>,
    bus: Arc<EventBus>,
    config_store: PluginConfigStore,
    data_root: PathBuf,
    instances: RwLock<HashMap<String, Arc<Mutex<LoadedPlugin>>>>,
    /// Load order; lifecycle passes run forward, teardown runs reversed.
    order: RwLock<Vec<String>>,
    disabled: RwLock<Vec<String>>,
}

impl PluginManager {
    #[must_use]
    pub fn new(
        registry: FactoryRegistry,
        broker: Arc<CapabilityBroker>,
        bus: Arc<EventBus>,
        config_store: PluginConfigStore,
        data_root: PathBuf,
    ) -> Self {
        Self {
            registry,
            broker,
            bus,
            config_store,
            data_root,
            instances: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
            disabled: RwLock::new(Vec::new()),
        }
    }

    // ── Loading ─────────────────────────────────────────────────────────

    /// Validate a manifest and create its instance in `Uninitialized`.
    ///
    /// The private data directory is provisioned lazily, on `initialize`.
    pub async fn load(&self, manifest: PluginManifest) -> Result<()> {
        let declared = manifest.validate()?;

        if !manifest.enabled {
            info!(plugin_id = %manifest.id, "plugin disabled, not loading");
            self.disabled.write().await.push(manifest.id);
            return Ok(());
        }

        if !self.registry.contains(&manifest.entry_point) {
            return Err(Error::UnresolvedEntryPoint {
                plugin_id: manifest.id.clone(),
                entry_point: manifest.entry_point.clone(),
            });
        }

        let mut instances = self.instances.write().await;
        if instances.contains_key(&manifest.id) {
            return Err(Error::Duplicate {
                plugin_id: manifest.id.clone(),
            });
        }

        let plugin = self
            .registry
            .construct(&manifest.entry_point)
            .ok_or_else(|| Error::UnresolvedEntryPoint {
                plugin_id: manifest.id.clone(),
                entry_point: manifest.entry_point.clone(),
            })?;

        let config = self
            .config_store
            .snapshot(&manifest.id, &manifest.default_config)?;
        self.broker.register_plugin(&manifest.id, declared).await;

        let plugin_id = manifest.id.clone();
        let ctx = PluginContext {
            data_dir: self.data_root.join("plugins").join(&plugin_id),
            manifest: Arc::new(manifest),
            config,
            broker: Arc::clone(&self.broker),
            bus: Arc::clone(&self.bus),
        };

        instances.insert(
            plugin_id.clone(),
            Arc::new(Mutex::new(LoadedPlugin {
                ctx,
                phase: LifecyclePhase::Uninitialized,
                plugin,
            })),
        );
        drop(instances);
        self.order.write().await.push(plugin_id.clone());

        info!(plugin_id = %plugin_id, "plugin loaded");
        self.bus.emit(&RuntimeEvent::PluginLoaded { plugin_id });
        Ok(())
    }

    async fn instance(&self, plugin_id: &str) -> Result<Arc<Mutex<LoadedPlugin>>> {
        self.instances
            .read()
            .await
            .get(plugin_id)
            .cloned()
            .ok_or_else(|| Error::UnknownPlugin {
                plugin_id: plugin_id.to_string(),
            })
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    pub async fn initialize(&self, plugin_id: &str) -> Result<()> {
        self.run_hook(plugin_id, Hook::Initialize).await
    }

    pub async fn start(&self, plugin_id: &str) -> Result<()> {
        self.run_hook(plugin_id, Hook::Start).await
    }

    pub async fn stop(&self, plugin_id: &str) -> Result<()> {
        self.run_hook(plugin_id, Hook::Stop).await
    }

    pub async fn destroy(&self, plugin_id: &str) -> Result<()> {
        let result = self.run_hook(plugin_id, Hook::Destroy).await;
        if result.is_ok() {
            self.broker.unregister_plugin(plugin_id).await;
        }
        result
    }

    async fn run_hook(&self, plugin_id: &str, hook: Hook) -> Result<()> {
        let instance = self.instance(plugin_id).await?;
        let mut guard = instance.lock().await;

        if !hook.allowed_from(guard.phase) {
            return Err(Error::Lifecycle {
                plugin_id: plugin_id.to_string(),
                from: guard.phase,
                attempted: hook.name(),
            });
        }

        let inst = &mut *guard;
        let result = match hook {
            Hook::Initialize => {
                let data_dir = inst.ctx.data_dir.clone();
                let init = &mut inst.plugin;
                let ctx = &inst.ctx;
                async move {
                    tokio::fs::create_dir_all(&data_dir)
                        .await
                        .map_err(anyhow::Error::from)?;
                    init.initialize(ctx).await
                }
                .await
            },
            Hook::Start => inst.plugin.start(&inst.ctx).await,
            Hook::Stop => inst.plugin.stop(&inst.ctx).await,
            Hook::Destroy => inst.plugin.destroy(&inst.ctx).await,
        };

        match result {
            Ok(()) => {
                inst.phase = hook.next_phase();
                info!(plugin_id, phase = %inst.phase, "plugin {}", hook.name());
                self.bus.emit(&RuntimeEvent::PluginPhaseChanged {
                    plugin_id: plugin_id.to_string(),
                    phase: inst.phase.to_string(),
                });
                Ok(())
            },
            Err(e) => {
                inst.phase = LifecyclePhase::Failed;
                warn!(plugin_id, hook = hook.name(), error = %e, "plugin hook failed");
                self.bus.emit(&RuntimeEvent::PluginFailed {
                    plugin_id: plugin_id.to_string(),
                    action: None,
                    error: e.to_string(),
                });
                Err(Error::Hook {
                    plugin_id: plugin_id.to_string(),
                    hook: hook.name(),
                    message: e.to_string(),
                })
            },
        }
    }

    /// Initialize every loaded instance, in load order. One instance's
    /// failure marks it `Failed` and never aborts the pass.
    pub async fn initialize_all(&self) {
        for plugin_id in self.order.read().await.clone() {
            if let Err(e) = self.initialize(&plugin_id).await {
                warn!(plugin_id = %plugin_id, error = %e, "initialize failed, continuing");
            }
        }
    }

    /// Start every initialized instance, in load order, with the same
    /// isolation as [`Self::initialize_all`].
    pub async fn start_all(&self) {
        for plugin_id in self.order.read().await.clone() {
            if self.phase(&plugin_id).await != Some(LifecyclePhase::Initialized) {
                continue;
            }
            if let Err(e) = self.start(&plugin_id).await {
                warn!(plugin_id = %plugin_id, error = %e, "start failed, continuing");
            }
        }
    }

    /// Stop every started instance, reverse load order.
    pub async fn stop_all(&self) {
        for plugin_id in self.order.read().await.iter().rev() {
            if self.phase(plugin_id).await != Some(LifecyclePhase::Started) {
                continue;
            }
            if let Err(e) = self.stop(plugin_id).await {
                warn!(plugin_id = %plugin_id, error = %e, "stop failed, continuing");
            }
        }
    }

    /// Destroy every instance eligible for teardown, reverse load order.
    pub async fn destroy_all(&self) {
        for plugin_id in self.order.read().await.iter().rev() {
            if !matches!(
                self.phase(plugin_id).await,
                Some(LifecyclePhase::Initialized | LifecyclePhase::Failed)
            ) {
                continue;
            }
            if let Err(e) = self.destroy(plugin_id).await {
                warn!(plugin_id = %plugin_id, error = %e, "destroy failed, continuing");
            }
        }
    }

    /// Current phase, if the plugin is loaded.
    pub async fn phase(&self, plugin_id: &str) -> Option<LifecyclePhase> {
        match self.instance(plugin_id).await {
            Ok(instance) => Some(instance.lock().await.phase),
            Err(_) => None,
        }
    }

    // ── Routing ─────────────────────────────────────────────────────────

    /// Route one inbound envelope to its target plugin and produce the
    /// response envelope, correlated by id. Never panics, never crashes
    /// the host: every failure becomes an error envelope.
    pub async fn route(&self, envelope: &Envelope) -> Envelope {
        if envelope.r#type == EnvelopeType::ConfigUpdate {
            return self.route_config_update(envelope).await;
        }

        let instance = match self.instance(&envelope.plugin_id).await {
            Ok(instance) => instance,
            Err(e) => {
                warn!(plugin_id = %envelope.plugin_id, "route: unknown plugin");
                return envelope.reply_error(ErrorShape::new(e.code(), e.to_string()));
            },
        };

        let mut guard = instance.lock().await;
        if guard.phase != LifecyclePhase::Started {
            let e = Error::NotStarted {
                plugin_id: envelope.plugin_id.clone(),
                phase: guard.phase,
            };
            warn!(plugin_id = %envelope.plugin_id, phase = %guard.phase, "route: plugin not started");
            return envelope.reply_error(ErrorShape::new(e.code(), e.to_string()));
        }

        let inst = &mut *guard;
        match inst
            .plugin
            .on_message(&inst.ctx, &envelope.action, envelope.payload.clone())
            .await
        {
            Ok(value) => envelope.reply(value),
            Err(e) => {
                warn!(
                    plugin_id = %envelope.plugin_id,
                    action = %envelope.action,
                    error = %e,
                    "plugin message handler failed"
                );
                self.bus.emit(&RuntimeEvent::PluginFailed {
                    plugin_id: envelope.plugin_id.clone(),
                    action: Some(envelope.action.clone()),
                    error: e.to_string(),
                });
                let shape = match serde_json::to_value(&e) {
                    Ok(details) => ErrorShape::new(e.code(), e.to_string()).with_details(details),
                    Err(_) => ErrorShape::new(e.code(), e.to_string()),
                };
                envelope.reply_error(shape)
            },
        }
    }

    /// Persist a remote config patch and swap the instance's snapshot.
    /// The handler is not invoked; plugins read config on their next
    /// lifecycle pass or message.
    async fn route_config_update(&self, envelope: &Envelope) -> Envelope {
        let result: Result<serde_json::Value> = async {
            let instance = self.instance(&envelope.plugin_id).await?;
            let mut guard = instance.lock().await;
            let snapshot = self.config_store.apply_update(
                &envelope.plugin_id,
                &guard.ctx.manifest.default_config,
                &envelope.payload,
            )?;
            guard.ctx.config = snapshot.clone();
            Ok(snapshot)
        }
        .await;

        match result {
            Ok(snapshot) => {
                info!(plugin_id = %envelope.plugin_id, "plugin config updated");
                envelope.reply(serde_json::json!({ "applied": true, "config": snapshot }))
            },
            Err(e) => {
                warn!(plugin_id = %envelope.plugin_id, error = %e, "config update failed");
                envelope.reply_error(ErrorShape::new(e.code(), e.to_string()))
            },
        }
    }

    // ── Status ──────────────────────────────────────────────────────────

    /// Aggregate every instance's phase, declared permissions, and
    /// plugin-contributed status fields, in load order.
    pub async fn status(&self) -> Vec<PluginStatusReport> {
        let mut reports = Vec::new();
        for plugin_id in self.order.read().await.iter() {
            let Ok(instance) = self.instance(plugin_id).await else {
                continue;
            };
            let guard = instance.lock().await;
            reports.push(PluginStatusReport {
                plugin_id: guard.ctx.manifest.id.clone(),
                name: guard.ctx.manifest.name.clone(),
                version: guard.ctx.manifest.version.clone(),
                phase: guard.phase,
                permissions: guard.ctx.manifest.permissions.clone(),
                status: guard.plugin.status(),
            });
        }
        reports
    }

    /// Payload of the `registration` envelope sent on every (re)connect.
    pub async fn registration_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "plugins": self.status().await,
            "disabled": self.disabled.read().await.clone(),
        })
    }
}
