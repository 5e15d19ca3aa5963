//! Bounded subprocess invocation for command-line tool wrappers.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use {
    benchlink_common::PluginError,
    serde::{Deserialize, Serialize},
    tokio::process::Command,
    tracing::{debug, warn},
};

/// Options controlling one invocation.
#[derive(Debug, Clone)]
pub struct RunOpts {
    pub timeout: Duration,
    pub max_output_bytes: usize,
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl Default for RunOpts {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_output_bytes: 200 * 1024, // 200KB
            working_dir: None,
            env: Vec::new(),
        }
    }
}

/// Captured result of a finished invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

fn tool_name(program: &Path) -> String {
    program
        .file_name()
        .map_or_else(|| program.display().to_string(), |n| n.to_string_lossy().into_owned())
}

/// Run `program args...` with a timeout and output caps. The child's
/// stdin is closed; output beyond the cap is truncated with a marker.
pub async fn run(program: &Path, args: &[&str], opts: &RunOpts) -> Result<RunOutput, PluginError> {
    let tool = tool_name(program);
    debug!(tool = %tool, ?args, timeout_secs = opts.timeout.as_secs(), "invoking tool");

    let mut cmd = Command::new(program);
    cmd.args(args);

    if let Some(ref dir) = opts.working_dir {
        cmd.current_dir(dir);
    }
    for (k, v) in &opts.env {
        cmd.env(k, v);
    }

    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.stdin(std::process::Stdio::null());
    cmd.kill_on_drop(true);

    let child = cmd
        .spawn()
        .map_err(|e| PluginError::invocation(&tool, format!("failed to spawn: {e}")))?;

    match tokio::time::timeout(opts.timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let mut stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            let mut stderr = String::from_utf8_lossy(&output.stderr).into_owned();

            if stdout.len() > opts.max_output_bytes {
                stdout.truncate(opts.max_output_bytes);
                stdout.push_str("\n... [output truncated]");
            }
            if stderr.len() > opts.max_output_bytes {
                stderr.truncate(opts.max_output_bytes);
                stderr.push_str("\n... [output truncated]");
            }

            let exit_code = output.status.code().unwrap_or(-1);
            debug!(tool = %tool, exit_code, stdout_len = stdout.len(), "tool finished");

            Ok(RunOutput {
                stdout,
                stderr,
                exit_code,
            })
        },
        Ok(Err(e)) => Err(PluginError::invocation(&tool, format!("failed to run: {e}"))),
        Err(_) => {
            warn!(tool = %tool, "tool invocation timed out");
            Err(PluginError::invocation(
                &tool,
                format!("timed out after {}s", opts.timeout.as_secs()),
            ))
        },
    }
}

/// Like [`run`], but a non-zero exit is an error carrying the exit code
/// and a stderr excerpt.
pub async fn run_ok(program: &Path, args: &[&str], opts: &RunOpts) -> Result<RunOutput, PluginError> {
    let output = run(program, args, opts).await?;
    if output.exit_code != 0 {
        let excerpt: String = output.stderr.chars().take(400).collect();
        return Err(PluginError::ToolInvocation {
            tool: tool_name(program),
            message: if excerpt.is_empty() {
                "exited with a failure status".into()
            } else {
                excerpt
            },
            exit_code: Some(output.exit_code),
        });
    }
    Ok(output)
}

/// Parse tool output where each non-empty line is one JSON value
/// (`docker ps --format '{{json .}}'` style). Any unparseable line fails
/// the whole invocation.
pub fn json_lines(tool: &str, stdout: &str) -> Result<Vec<serde_json::Value>, PluginError> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|line| {
            serde_json::from_str(line).map_err(|e| {
                PluginError::invocation(tool, format!("unparseable output line: {e}"))
            })
        })
        .collect()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let out = run(Path::new("sh"), &["-c", "echo workbench"], &RunOpts::default())
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "workbench");
        assert_eq!(out.exit_code, 0);
    }

    #[tokio::test]
    async fn nonzero_exit_fails_run_ok() {
        let err = run_ok(
            Path::new("sh"),
            &["-c", "echo broken >&2; exit 3"],
            &RunOpts::default(),
        )
        .await
        .unwrap_err();
        match err {
            PluginError::ToolInvocation {
                exit_code, message, ..
            } => {
                assert_eq!(exit_code, Some(3));
                assert!(message.contains("broken"));
            },
            other => panic!("expected ToolInvocation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let opts = RunOpts {
            timeout: Duration::from_millis(100),
            ..Default::default()
        };
        let err = run(Path::new("sh"), &["-c", "sleep 5"], &opts)
            .await
            .unwrap_err();
        match err {
            PluginError::ToolInvocation { message, .. } => {
                assert!(message.contains("timed out"));
            },
            other => panic!("expected ToolInvocation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let err = run(
            Path::new("/nonexistent/benchlink-test-tool"),
            &[],
            &RunOpts::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PluginError::ToolInvocation { .. }));
    }

    #[tokio::test]
    async fn long_output_is_truncated() {
        let opts = RunOpts {
            max_output_bytes: 16,
            ..Default::default()
        };
        let out = run(
            Path::new("sh"),
            &["-c", "printf 'aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa'"],
            &opts,
        )
        .await
        .unwrap();
        assert!(out.stdout.ends_with("[output truncated]"));
    }

    #[test]
    fn json_lines_parses_and_rejects() {
        let parsed = json_lines("docker", "{\"id\":\"a\"}\n\n{\"id\":\"b\"}\n").unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1]["id"], "b");

        assert!(json_lines("docker", "{\"id\":\"a\"}\nnot json\n").is_err());
    }
}
