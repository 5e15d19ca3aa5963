//! Plugin-owned sidecar processes.
//!
//! Some tools are wrapped through a long-lived local bridge process
//! rather than one-shot CLI calls. The plugin spawns the sidecar in
//! `start()`, talks to it over a localhost request/response channel, and
//! must stop it in `stop()` — unlike detached launches, a sidecar is
//! tracked, owned background work.

use std::{path::PathBuf, process::Stdio, time::Duration};

use {
    benchlink_common::PluginError,
    tokio::{
        io::{AsyncBufReadExt, BufReader},
        process::{Child, Command},
    },
    tracing::{debug, info, warn},
};

/// How to start a sidecar.
#[derive(Debug, Clone)]
pub struct SidecarSpec {
    /// Label used in logs and errors ("cad-bridge").
    pub label: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Port the sidecar's local endpoint listens on.
    pub port: u16,
}

/// Handle to a running sidecar process.
#[derive(Debug)]
pub struct SidecarProcess {
    label: String,
    child: Child,
    port: u16,
}

impl SidecarProcess {
    /// Spawn the sidecar and begin forwarding its output into `tracing`.
    ///
    /// Fails if the process exits within the first half second; a sidecar
    /// that dies immediately almost always mis-parsed its arguments.
    pub async fn spawn(spec: SidecarSpec) -> Result<Self, PluginError> {
        info!(label = %spec.label, program = %spec.program.display(), port = spec.port, "starting sidecar");

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        for (k, v) in &spec.env {
            cmd.env(k, v);
        }

        let mut child = cmd.spawn().map_err(|e| {
            PluginError::invocation(&spec.label, format!("failed to spawn sidecar: {e}"))
        })?;

        if let Some(stdout) = child.stdout.take() {
            let label = spec.label.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "sidecar", label = %label, "{line}");
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            let label = spec.label.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(target: "sidecar", label = %label, "{line}");
                }
            });
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
        match child.try_wait() {
            Ok(Some(status)) => {
                return Err(PluginError::invocation(
                    &spec.label,
                    format!("sidecar exited immediately with status {status}"),
                ));
            },
            Ok(None) => {},
            Err(e) => {
                return Err(PluginError::invocation(
                    &spec.label,
                    format!("failed to check sidecar status: {e}"),
                ));
            },
        }

        info!(label = %spec.label, port = spec.port, "sidecar started");
        Ok(Self {
            label: spec.label,
            child,
            port: spec.port,
        })
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether the process is still running.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Stop the sidecar: signal it, wait a bounded interval, then kill.
    pub async fn stop(&mut self) {
        info!(label = %self.label, "stopping sidecar");
        let _ = self.child.start_kill();
        match tokio::time::timeout(Duration::from_secs(5), self.child.wait()).await {
            Ok(Ok(status)) => {
                info!(label = %self.label, ?status, "sidecar exited");
            },
            Ok(Err(e)) => {
                warn!(label = %self.label, error = %e, "error waiting for sidecar");
            },
            Err(_) => {
                warn!(label = %self.label, "sidecar did not exit in time, killing");
                let _ = self.child.kill().await;
            },
        }
    }
}

/// Request/response client for a sidecar's localhost endpoint.
pub struct SidecarChannel {
    label: String,
    base_url: String,
    client: reqwest::Client,
}

impl SidecarChannel {
    /// Channel to `http://127.0.0.1:<port>` with a bounded per-request
    /// timeout.
    pub fn new(label: impl Into<String>, port: u16, timeout: Duration) -> Result<Self, PluginError> {
        let label = label.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PluginError::invocation(&label, format!("failed to build client: {e}")))?;
        Ok(Self {
            base_url: format!("http://127.0.0.1:{port}"),
            label,
            client,
        })
    }

    /// One request/response exchange: POST `{action, payload}` to `/rpc`,
    /// expect a JSON body back.
    pub async fn call(
        &self,
        action: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, PluginError> {
        let response = self
            .client
            .post(format!("{}/rpc", self.base_url))
            .json(&serde_json::json!({ "action": action, "payload": payload }))
            .send()
            .await
            .map_err(|e| PluginError::invocation(&self.label, format!("sidecar call failed: {e}")))?;

        if !response.status().is_success() {
            return Err(PluginError::invocation(
                &self.label,
                format!("sidecar returned {}", response.status()),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| PluginError::invocation(&self.label, format!("invalid sidecar response: {e}")))
    }
}
