//! End-to-end lifecycle, routing, and fault-isolation behavior of the
//! plugin manager.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use {
    async_trait::async_trait,
    benchlink_common::PluginError,
    benchlink_config::PluginConfigStore,
    benchlink_events::EventBus,
    benchlink_permissions::{CapabilityBroker, GrantStore, StaticApprovalPolicy},
    benchlink_protocol::{Envelope, EnvelopeType},
    benchlink_runtime::{
        Error, FactoryRegistry, LifecyclePhase, Plugin, PluginContext, PluginManager,
        PluginManifest, bundled,
    },
    serde_json::{Value, json},
    tempfile::TempDir,
};

// ── Test plugin ─────────────────────────────────────────────────────────────

struct TestPlugin {
    fail_start: bool,
    stops: Arc<AtomicUsize>,
    messages: Arc<AtomicUsize>,
}

#[async_trait]
impl Plugin for TestPlugin {
    async fn start(&mut self, _ctx: &PluginContext) -> anyhow::Result<()> {
        if self.fail_start {
            anyhow::bail!("start exploded");
        }
        Ok(())
    }

    async fn stop(&mut self, _ctx: &PluginContext) -> anyhow::Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_message(
        &mut self,
        ctx: &PluginContext,
        action: &str,
        payload: Value,
    ) -> Result<Value, PluginError> {
        self.messages.fetch_add(1, Ordering::SeqCst);
        match action {
            "echo" => Ok(payload),
            "getConfig" => Ok(ctx.config.clone()),
            other => Err(PluginError::unknown_action(other)),
        }
    }

    fn status(&self) -> Value {
        json!({ "messages": self.messages.load(Ordering::SeqCst) })
    }
}

// ── Harness ─────────────────────────────────────────────────────────────────

struct Harness {
    manager: PluginManager,
    stops: Arc<AtomicUsize>,
    messages: Arc<AtomicUsize>,
    _tmp: TempDir,
}

fn harness(auto_grant: Vec<String>) -> Harness {
    let tmp = TempDir::new().unwrap();
    let stops = Arc::new(AtomicUsize::new(0));
    let messages = Arc::new(AtomicUsize::new(0));

    let mut registry = FactoryRegistry::new();
    bundled::register_all(&mut registry);
    {
        let stops = Arc::clone(&stops);
        let messages = Arc::clone(&messages);
        registry.register("test:ok", move || {
            Box::new(TestPlugin {
                fail_start: false,
                stops: Arc::clone(&stops),
                messages: Arc::clone(&messages),
            })
        });
    }
    {
        let stops = Arc::clone(&stops);
        let messages = Arc::clone(&messages);
        registry.register("test:failing", move || {
            Box::new(TestPlugin {
                fail_start: true,
                stops: Arc::clone(&stops),
                messages: Arc::clone(&messages),
            })
        });
    }

    let bus = Arc::new(EventBus::new());
    let store = GrantStore::load(tmp.path().join("grants.json")).unwrap();
    let broker = Arc::new(CapabilityBroker::new(
        store,
        Arc::new(StaticApprovalPolicy::new(auto_grant, Vec::new())),
        Arc::clone(&bus),
    ));
    let config_store = PluginConfigStore::new(tmp.path().join("plugin-config"));

    let manager = PluginManager::new(
        registry,
        broker,
        bus,
        config_store,
        tmp.path().join("data"),
    );

    Harness {
        manager,
        stops,
        messages,
        _tmp: tmp,
    }
}

fn test_manifest(id: &str, entry_point: &str) -> PluginManifest {
    PluginManifest {
        id: id.into(),
        name: format!("Test {id}"),
        version: "1.0.0".into(),
        description: String::new(),
        entry_point: entry_point.into(),
        permissions: vec!["file:read".into()],
        platform_paths: Default::default(),
        default_config: json!({"greeting": "hello"}),
        enabled: true,
    }
}

fn message(plugin_id: &str, action: &str, payload: Value) -> Envelope {
    Envelope::new(EnvelopeType::PluginMessage, plugin_id)
        .with_action(action)
        .with_payload(payload)
}

/// A container-tool manifest whose tool cannot exist on any machine.
fn absent_container_manifest() -> PluginManifest {
    let mut manifest = bundled::container_tool::manifest();
    manifest.platform_paths.clear();
    manifest.default_config = json!({"binary": "benchlink-missing-ctl"});
    manifest
}

// ── Lifecycle ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn valid_manifest_reaches_started() {
    let h = harness(vec!["*".into()]);
    h.manager
        .load(test_manifest("alpha", "test:ok"))
        .await
        .unwrap();

    h.manager.initialize("alpha").await.unwrap();
    h.manager.start("alpha").await.unwrap();
    assert_eq!(h.manager.phase("alpha").await, Some(LifecyclePhase::Started));
}

#[tokio::test]
async fn second_start_fails_and_leaves_state() {
    let h = harness(vec!["*".into()]);
    h.manager
        .load(test_manifest("alpha", "test:ok"))
        .await
        .unwrap();
    h.manager.initialize("alpha").await.unwrap();
    h.manager.start("alpha").await.unwrap();

    let err = h.manager.start("alpha").await.unwrap_err();
    assert!(matches!(err, Error::Lifecycle { attempted: "start", .. }));
    assert_eq!(h.manager.phase("alpha").await, Some(LifecyclePhase::Started));
}

#[tokio::test]
async fn phases_never_skip() {
    let h = harness(vec!["*".into()]);
    h.manager
        .load(test_manifest("alpha", "test:ok"))
        .await
        .unwrap();

    // start straight from UNINITIALIZED is rejected
    let err = h.manager.start("alpha").await.unwrap_err();
    assert!(matches!(err, Error::Lifecycle { .. }));
    assert_eq!(
        h.manager.phase("alpha").await,
        Some(LifecyclePhase::Uninitialized)
    );

    // destroy straight from STARTED is rejected
    h.manager.initialize("alpha").await.unwrap();
    h.manager.start("alpha").await.unwrap();
    let err = h.manager.destroy("alpha").await.unwrap_err();
    assert!(matches!(err, Error::Lifecycle { attempted: "destroy", .. }));
    assert_eq!(h.manager.phase("alpha").await, Some(LifecyclePhase::Started));
}

#[tokio::test]
async fn double_stop_releases_resources_once() {
    let h = harness(vec!["*".into()]);
    h.manager
        .load(test_manifest("alpha", "test:ok"))
        .await
        .unwrap();
    h.manager.initialize("alpha").await.unwrap();
    h.manager.start("alpha").await.unwrap();

    h.manager.stop("alpha").await.unwrap();
    let err = h.manager.stop("alpha").await.unwrap_err();
    assert!(matches!(err, Error::Lifecycle { attempted: "stop", .. }));

    assert_eq!(h.stops.load(Ordering::SeqCst), 1);
    assert_eq!(
        h.manager.phase("alpha").await,
        Some(LifecyclePhase::Initialized)
    );
}

#[tokio::test]
async fn destroy_after_stop_completes_the_lifecycle() {
    let h = harness(vec!["*".into()]);
    h.manager
        .load(test_manifest("alpha", "test:ok"))
        .await
        .unwrap();
    h.manager.initialize("alpha").await.unwrap();
    h.manager.start("alpha").await.unwrap();
    h.manager.stop("alpha").await.unwrap();
    h.manager.destroy("alpha").await.unwrap();
    assert_eq!(
        h.manager.phase("alpha").await,
        Some(LifecyclePhase::Destroyed)
    );
}

// ── Load validation ─────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_capability_is_fatal_before_start() {
    let h = harness(vec!["*".into()]);
    let mut manifest = test_manifest("alpha", "test:ok");
    manifest.permissions.push("time:travel".into());

    let err = h.manager.load(manifest).await.unwrap_err();
    assert!(matches!(err, Error::UnknownCapability { .. }));
    assert_eq!(h.manager.phase("alpha").await, None);
}

#[tokio::test]
async fn unresolved_entry_point_is_fatal() {
    let h = harness(vec!["*".into()]);
    let err = h
        .manager
        .load(test_manifest("alpha", "test:ghost"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnresolvedEntryPoint { .. }));
}

#[tokio::test]
async fn duplicate_load_is_rejected() {
    let h = harness(vec!["*".into()]);
    h.manager
        .load(test_manifest("alpha", "test:ok"))
        .await
        .unwrap();
    let err = h
        .manager
        .load(test_manifest("alpha", "test:ok"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Duplicate { .. }));
}

#[tokio::test]
async fn disabled_manifest_is_recorded_not_instantiated() {
    let h = harness(vec!["*".into()]);
    let mut manifest = test_manifest("alpha", "test:ok");
    manifest.enabled = false;
    h.manager.load(manifest).await.unwrap();

    assert_eq!(h.manager.phase("alpha").await, None);
    let registration = h.manager.registration_payload().await;
    assert_eq!(registration["disabled"][0], "alpha");
}

// ── Fault isolation ─────────────────────────────────────────────────────────

#[tokio::test]
async fn failing_start_does_not_block_sibling() {
    let h = harness(vec!["*".into()]);
    h.manager
        .load(test_manifest("broken", "test:failing"))
        .await
        .unwrap();
    h.manager
        .load(test_manifest("healthy", "test:ok"))
        .await
        .unwrap();

    h.manager.initialize_all().await;
    h.manager.start_all().await;

    assert_eq!(h.manager.phase("broken").await, Some(LifecyclePhase::Failed));
    assert_eq!(
        h.manager.phase("healthy").await,
        Some(LifecyclePhase::Started)
    );
}

#[tokio::test]
async fn failed_plugin_can_be_destroyed() {
    let h = harness(vec!["*".into()]);
    h.manager
        .load(test_manifest("broken", "test:failing"))
        .await
        .unwrap();
    h.manager.initialize("broken").await.unwrap();
    assert!(h.manager.start("broken").await.is_err());
    assert_eq!(h.manager.phase("broken").await, Some(LifecyclePhase::Failed));

    h.manager.destroy("broken").await.unwrap();
    assert_eq!(
        h.manager.phase("broken").await,
        Some(LifecyclePhase::Destroyed)
    );
}

// ── Routing ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn route_to_unstarted_never_invokes_handler() {
    let h = harness(vec!["*".into()]);
    h.manager
        .load(test_manifest("alpha", "test:ok"))
        .await
        .unwrap();

    let request = message("alpha", "echo", json!({"x": 1}));
    let response = h.manager.route(&request).await;

    assert_eq!(response.r#type, EnvelopeType::Error);
    assert_eq!(response.id, request.id);
    assert_eq!(response.payload["code"], "routing_error");
    assert_eq!(h.messages.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn route_to_unknown_plugin_is_a_routing_error() {
    let h = harness(vec!["*".into()]);
    let request = message("ghost", "echo", json!({}));
    let response = h.manager.route(&request).await;
    assert_eq!(response.payload["code"], "routing_error");
}

#[tokio::test]
async fn started_plugin_round_trips_a_message() {
    let h = harness(vec!["*".into()]);
    h.manager
        .load(test_manifest("alpha", "test:ok"))
        .await
        .unwrap();
    h.manager.initialize("alpha").await.unwrap();
    h.manager.start("alpha").await.unwrap();

    let request = message("alpha", "echo", json!({"shelf": 42}));
    let response = h.manager.route(&request).await;

    assert_eq!(response.r#type, EnvelopeType::PluginMessage);
    assert_eq!(response.id, request.id);
    assert_eq!(response.payload["shelf"], 42);
}

#[tokio::test]
async fn unknown_action_is_an_error_envelope() {
    let h = harness(vec!["*".into()]);
    h.manager
        .load(test_manifest("alpha", "test:ok"))
        .await
        .unwrap();
    h.manager.initialize("alpha").await.unwrap();
    h.manager.start("alpha").await.unwrap();

    let response = h
        .manager
        .route(&message("alpha", "selfDestruct", json!({})))
        .await;
    assert_eq!(response.r#type, EnvelopeType::Error);
    assert_eq!(response.payload["code"], "unknown_action");
    // The plugin is still routable afterwards.
    let response = h.manager.route(&message("alpha", "echo", json!(1))).await;
    assert_eq!(response.r#type, EnvelopeType::PluginMessage);
}

// ── Tool wrapper with an absent tool ────────────────────────────────────────

#[tokio::test]
async fn absent_tool_surfaces_remediation_and_stays_started() {
    let h = harness(vec!["*".into()]);
    h.manager.load(absent_container_manifest()).await.unwrap();
    h.manager.initialize("container-tool").await.unwrap();
    h.manager.start("container-tool").await.unwrap();

    let response = h
        .manager
        .route(&message("container-tool", "listContainers", json!({"all": true})))
        .await;

    assert_eq!(response.r#type, EnvelopeType::Error);
    assert_eq!(response.payload["code"], "tool_not_found");
    let remediation = response.payload["details"]["remediation"]
        .as_str()
        .unwrap();
    assert!(remediation.contains("tool_path"));

    assert_eq!(
        h.manager.phase("container-tool").await,
        Some(LifecyclePhase::Started)
    );
}

#[tokio::test]
async fn denied_capability_is_an_ordinary_result() {
    // No auto-grant patterns: the static policy denies everything.
    let h = harness(Vec::new());
    h.manager.load(absent_container_manifest()).await.unwrap();
    h.manager.initialize("container-tool").await.unwrap();
    h.manager.start("container-tool").await.unwrap();

    let response = h
        .manager
        .route(&message("container-tool", "listContainers", json!({})))
        .await;

    assert_eq!(response.payload["code"], "permission_denied");
    assert_eq!(
        h.manager.phase("container-tool").await,
        Some(LifecyclePhase::Started)
    );
}

// ── Config updates ──────────────────────────────────────────────────────────

#[tokio::test]
async fn config_update_swaps_the_snapshot() {
    let h = harness(vec!["*".into()]);
    h.manager
        .load(test_manifest("alpha", "test:ok"))
        .await
        .unwrap();
    h.manager.initialize("alpha").await.unwrap();
    h.manager.start("alpha").await.unwrap();

    let before = h
        .manager
        .route(&message("alpha", "getConfig", json!({})))
        .await;
    assert_eq!(before.payload["greeting"], "hello");

    let update = Envelope::new(EnvelopeType::ConfigUpdate, "alpha")
        .with_payload(json!({"greeting": "howdy", "extra": 7}));
    let applied = h.manager.route(&update).await;
    assert_eq!(applied.payload["applied"], true);

    let after = h
        .manager
        .route(&message("alpha", "getConfig", json!({})))
        .await;
    assert_eq!(after.payload["greeting"], "howdy");
    assert_eq!(after.payload["extra"], 7);
}

// ── Status aggregation ──────────────────────────────────────────────────────

#[tokio::test]
async fn status_aggregates_phase_permissions_and_plugin_fields() {
    let h = harness(vec!["*".into()]);
    h.manager
        .load(test_manifest("alpha", "test:ok"))
        .await
        .unwrap();
    h.manager.initialize("alpha").await.unwrap();
    h.manager.start("alpha").await.unwrap();
    h.manager
        .route(&message("alpha", "echo", json!(null)))
        .await;

    let status = h.manager.status().await;
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].plugin_id, "alpha");
    assert_eq!(status[0].phase, LifecyclePhase::Started);
    assert_eq!(status[0].permissions, vec!["file:read".to_string()]);
    assert_eq!(status[0].status["messages"], 1);
}

#[tokio::test]
async fn teardown_runs_in_reverse_and_skips_ineligible() {
    let h = harness(vec!["*".into()]);
    h.manager
        .load(test_manifest("alpha", "test:ok"))
        .await
        .unwrap();
    h.manager
        .load(test_manifest("beta", "test:failing"))
        .await
        .unwrap();

    h.manager.initialize_all().await;
    h.manager.start_all().await;
    h.manager.stop_all().await;
    h.manager.destroy_all().await;

    assert_eq!(
        h.manager.phase("alpha").await,
        Some(LifecyclePhase::Destroyed)
    );
    // beta failed to start; destroy_all still unloads it from FAILED.
    assert_eq!(
        h.manager.phase("beta").await,
        Some(LifecyclePhase::Destroyed)
    );
}
