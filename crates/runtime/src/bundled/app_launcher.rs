//! `app-launcher`: opens workshop files and applications on the local
//! machine as detached, unmanaged processes.
//!
//! Launched applications are not plugin-owned resources: `stop` clears
//! the bookkeeping list and deliberately leaves the processes running.

use std::path::Path;

use {
    async_trait::async_trait,
    benchlink_common::{Capability, PluginError},
    serde_json::{Value, json},
};

use {
    benchlink_toolkit::{LaunchedApp, launch_detached, open_detached},
    crate::{
        contract::{Plugin, PluginContext},
        manifest::PluginManifest,
    },
};

pub const ENTRY_POINT: &str = "bundled:app-launcher";

/// Manifest for the bundled launcher plugin.
#[must_use]
pub fn manifest() -> PluginManifest {
    PluginManifest {
        id: "app-launcher".into(),
        name: "App Launcher".into(),
        version: "0.3.0".into(),
        description: "Open local files and applications from the workshop UI".into(),
        entry_point: ENTRY_POINT.into(),
        permissions: vec!["app:launch".into()],
        platform_paths: std::collections::HashMap::new(),
        default_config: json!({}),
        enabled: true,
    }
}

pub struct AppLauncherPlugin {
    launched: Vec<LaunchedApp>,
}

impl AppLauncherPlugin {
    #[must_use]
    pub fn new() -> Self {
        Self {
            launched: Vec::new(),
        }
    }

    fn launch_app(&mut self, payload: &Value) -> Result<Value, PluginError> {
        let path = payload
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| PluginError::other("launchApp requires a `path`"))?;
        let args: Vec<&str> = payload
            .get("args")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let app = launch_detached(Path::new(path), &args)?;
        let reply = serde_json::to_value(&app).unwrap_or(Value::Null);
        self.launched.push(app);
        Ok(reply)
    }

    fn open_target(&mut self, payload: &Value) -> Result<Value, PluginError> {
        let target = payload
            .get("target")
            .and_then(Value::as_str)
            .ok_or_else(|| PluginError::other("openPath requires a `target`"))?;

        let app = open_detached(target)?;
        let reply = serde_json::to_value(&app).unwrap_or(Value::Null);
        self.launched.push(app);
        Ok(reply)
    }
}

impl Default for AppLauncherPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for AppLauncherPlugin {
    async fn stop(&mut self, _ctx: &PluginContext) -> anyhow::Result<()> {
        // Bookkeeping only. The launched processes are independent and
        // stay running; there is nothing to terminate here.
        self.launched.clear();
        Ok(())
    }

    async fn on_message(
        &mut self,
        ctx: &PluginContext,
        action: &str,
        payload: Value,
    ) -> Result<Value, PluginError> {
        match action {
            "launchApp" => {
                ctx.require(Capability::AppLaunch).await?;
                self.launch_app(&payload)
            },
            "openPath" => {
                ctx.require(Capability::AppLaunch).await?;
                self.open_target(&payload)
            },
            // Reading our own bookkeeping is not privileged.
            "listLaunched" => Ok(json!({ "launched": self.launched })),
            other => Err(PluginError::unknown_action(other)),
        }
    }

    fn status(&self) -> Value {
        json!({ "launched_count": self.launched.len() })
    }
}
