//! External-tool discovery.
//!
//! Resolution order: persisted manual override, then the manifest's
//! platform-specific candidate list, then a PATH lookup. A configured
//! override that points nowhere is an error in its own right rather than
//! falling through; the operator asked for that path explicitly.

use std::{collections::HashMap, path::PathBuf};

use benchlink_common::PluginError;

/// Locates one external tool's executable.
#[derive(Debug, Clone)]
pub struct ToolLocator {
    /// Display name used in errors ("docker", "KiCad").
    tool: String,
    /// Executable name for the PATH lookup.
    binary: String,
    candidates: Vec<PathBuf>,
    override_path: Option<PathBuf>,
}

impl ToolLocator {
    #[must_use]
    pub fn new(tool: impl Into<String>, binary: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            binary: binary.into(),
            candidates: Vec::new(),
            override_path: None,
        }
    }

    /// Candidate install paths for the current platform, taken from the
    /// manifest's `platform_paths` table keyed by `std::env::consts::OS`.
    #[must_use]
    pub fn with_platform_paths(mut self, paths: &HashMap<String, Vec<PathBuf>>) -> Self {
        if let Some(list) = paths.get(std::env::consts::OS) {
            self.candidates = list.clone();
        }
        self
    }

    #[must_use]
    pub fn with_candidates(mut self, candidates: Vec<PathBuf>) -> Self {
        self.candidates = candidates;
        self
    }

    /// Persisted manual override (`tool_path` in the plugin's config).
    #[must_use]
    pub fn with_override(mut self, override_path: Option<PathBuf>) -> Self {
        self.override_path = override_path;
        self
    }

    /// Resolve the executable path.
    pub fn locate(&self) -> Result<PathBuf, PluginError> {
        if let Some(path) = &self.override_path {
            if path.exists() {
                return Ok(path.clone());
            }
            return Err(PluginError::tool_not_found(
                &self.tool,
                format!(
                    "configured tool_path `{}` does not exist; fix or remove the override",
                    path.display()
                ),
            ));
        }

        for candidate in &self.candidates {
            if candidate.exists() {
                return Ok(candidate.clone());
            }
        }

        if let Ok(found) = which::which(&self.binary) {
            return Ok(found);
        }

        Err(PluginError::tool_not_found(
            &self.tool,
            self.remediation(),
        ))
    }

    fn remediation(&self) -> String {
        if self.candidates.is_empty() {
            format!(
                "install {} so that `{}` is on PATH, or set tool_path in the plugin's configuration",
                self.tool, self.binary
            )
        } else {
            format!(
                "install {} (searched {} known locations and PATH), or set tool_path in the plugin's configuration",
                self.tool,
                self.candidates.len()
            )
        }
    }
}
