//! Detached application launch.
//!
//! Launched GUI applications are independent, unmanaged processes: the
//! handle returned here is bookkeeping only. The host never assumes it
//! can inspect or terminate a launched application, and stopping the
//! plugin that launched it leaves it running.

use std::path::Path;

use {benchlink_common::PluginError, serde::Serialize, tracing::info};

/// Bookkeeping record for a launched, unobserved process.
#[derive(Debug, Clone, Serialize)]
pub struct LaunchedApp {
    pub program: String,
    /// Known only when we spawned the process ourselves.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Epoch milliseconds.
    pub launched_at: i64,
}

/// Spawn `program args...` as a detached foreground process with no
/// captured stdio. The child handle is dropped immediately; the process
/// outlives the plugin and the host.
pub fn launch_detached(program: &Path, args: &[&str]) -> Result<LaunchedApp, PluginError> {
    let child = std::process::Command::new(program)
        .args(args)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .map_err(|e| {
            PluginError::invocation(
                program.display().to_string(),
                format!("failed to launch: {e}"),
            )
        })?;

    let pid = child.id();
    info!(program = %program.display(), pid, "launched detached application");
    Ok(LaunchedApp {
        program: program.display().to_string(),
        pid: Some(pid),
        launched_at: chrono::Utc::now().timestamp_millis(),
    })
}

/// Open a file or URL with the platform's default handler, detached.
/// No pid is available; the handler decides what actually runs.
pub fn open_detached(target: &str) -> Result<LaunchedApp, PluginError> {
    open::that_detached(target)
        .map_err(|e| PluginError::invocation(target, format!("failed to open: {e}")))?;

    info!(target, "opened with platform handler");
    Ok(LaunchedApp {
        program: target.to_string(),
        pid: None,
        launched_at: chrono::Utc::now().timestamp_millis(),
    })
}
