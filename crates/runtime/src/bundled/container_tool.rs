//! `container-tool`: wraps a docker-compatible container CLI.
//!
//! Every action shells out to the CLI and parses its structured output;
//! nothing here speaks the container engine's API directly. The binary
//! name is configurable (`binary = "podman"` works unchanged).

use std::{collections::HashMap, path::PathBuf, time::Duration};

use {
    async_trait::async_trait,
    benchlink_common::{Capability, PluginError},
    serde_json::{Value, json},
};

use {
    benchlink_toolkit::{RunOpts, ToolLocator, json_lines, run_ok},
    crate::{
        contract::{Plugin, PluginContext},
        manifest::PluginManifest,
    },
};

pub const ENTRY_POINT: &str = "bundled:container-tool";

const DEFAULT_BINARY: &str = "docker";

/// Manifest for the bundled container plugin.
#[must_use]
pub fn manifest() -> PluginManifest {
    let mut platform_paths = HashMap::new();
    platform_paths.insert(
        "linux".to_string(),
        vec![
            PathBuf::from("/usr/bin/docker"),
            PathBuf::from("/usr/local/bin/docker"),
        ],
    );
    platform_paths.insert(
        "macos".to_string(),
        vec![
            PathBuf::from("/usr/local/bin/docker"),
            PathBuf::from("/opt/homebrew/bin/docker"),
            PathBuf::from("/Applications/Docker.app/Contents/Resources/bin/docker"),
        ],
    );
    platform_paths.insert(
        "windows".to_string(),
        vec![PathBuf::from(
            "C:\\Program Files\\Docker\\Docker\\resources\\bin\\docker.exe",
        )],
    );

    PluginManifest {
        id: "container-tool".into(),
        name: "Container Tool".into(),
        version: "0.3.0".into(),
        description: "List and control containers through a docker-compatible CLI".into(),
        entry_point: ENTRY_POINT.into(),
        permissions: vec!["system:execute".into()],
        platform_paths,
        default_config: json!({ "timeout_secs": 30 }),
        enabled: true,
    }
}

pub struct ContainerToolPlugin {
    invocations: u64,
    last_invocation: Option<i64>,
}

impl ContainerToolPlugin {
    #[must_use]
    pub fn new() -> Self {
        Self {
            invocations: 0,
            last_invocation: None,
        }
    }

    fn locator(ctx: &PluginContext) -> ToolLocator {
        let binary = ctx.config_str("binary").unwrap_or(DEFAULT_BINARY);
        ToolLocator::new(binary, binary)
            .with_platform_paths(&ctx.manifest.platform_paths)
            .with_override(ctx.config_path("tool_path"))
    }

    fn run_opts(ctx: &PluginContext) -> RunOpts {
        let timeout_secs = ctx
            .config
            .get("timeout_secs")
            .and_then(Value::as_u64)
            .unwrap_or(30);
        RunOpts {
            timeout: Duration::from_secs(timeout_secs),
            ..RunOpts::default()
        }
    }

    fn note_invocation(&mut self) {
        self.invocations += 1;
        self.last_invocation = Some(chrono_now_ms());
    }

    async fn list_containers(
        &mut self,
        ctx: &PluginContext,
        payload: &Value,
    ) -> Result<Value, PluginError> {
        let bin = Self::locator(ctx).locate()?;
        let all = payload.get("all").and_then(Value::as_bool).unwrap_or(false);

        let mut args = vec!["ps", "--format", "{{json .}}"];
        if all {
            args.push("--all");
        }

        self.note_invocation();
        let output = run_ok(&bin, &args, &Self::run_opts(ctx)).await?;
        let containers = json_lines("container CLI", &output.stdout)?;
        Ok(json!({ "containers": containers }))
    }

    async fn container_action(
        &mut self,
        ctx: &PluginContext,
        verb: &str,
        payload: &Value,
    ) -> Result<Value, PluginError> {
        let id = payload
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| PluginError::other(format!("{verb} requires a container `id`")))?;

        let bin = Self::locator(ctx).locate()?;
        self.note_invocation();
        run_ok(&bin, &[verb, id], &Self::run_opts(ctx)).await?;
        Ok(json!({ "id": id, "ok": true }))
    }

    async fn version(&mut self, ctx: &PluginContext) -> Result<Value, PluginError> {
        let bin = Self::locator(ctx).locate()?;
        self.note_invocation();
        let output = run_ok(
            &bin,
            &["version", "--format", "{{json .}}"],
            &Self::run_opts(ctx),
        )
        .await?;
        let lines = json_lines("container CLI", &output.stdout)?;
        Ok(lines.into_iter().next().unwrap_or(Value::Null))
    }
}

impl Default for ContainerToolPlugin {
    fn default() -> Self {
        Self::new()
    }
}

fn chrono_now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[async_trait]
impl Plugin for ContainerToolPlugin {
    async fn on_message(
        &mut self,
        ctx: &PluginContext,
        action: &str,
        payload: Value,
    ) -> Result<Value, PluginError> {
        ctx.require(Capability::SystemExecute).await?;

        match action {
            "listContainers" => self.list_containers(ctx, &payload).await,
            "startContainer" => self.container_action(ctx, "start", &payload).await,
            "stopContainer" => self.container_action(ctx, "stop", &payload).await,
            "version" => self.version(ctx).await,
            other => Err(PluginError::unknown_action(other)),
        }
    }

    fn status(&self) -> Value {
        json!({
            "invocations": self.invocations,
            "last_invocation": self.last_invocation,
        })
    }
}
