//! The error taxonomy plugins report through `on_message`.
//!
//! These are ordinary results, not host failures: a `PermissionDenied` or
//! `ToolNotFound` travels back to the remote caller as an error envelope
//! while the plugin stays running.

use {
    serde::{Deserialize, Serialize},
    thiserror::Error,
};

/// Failure of a single routed plugin operation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum PluginError {
    /// The operator denied (or has not granted) the required capability.
    #[error("permission denied: {capability}")]
    PermissionDenied { capability: String },

    /// The wrapped external tool is absent from every candidate location.
    /// `remediation` tells the operator how to fix it.
    #[error("{tool} not found: {remediation}")]
    ToolNotFound { tool: String, remediation: String },

    /// The tool ran but failed: non-zero exit, timeout, or output the
    /// wrapper could not parse.
    #[error("{tool} invocation failed: {message}")]
    ToolInvocation {
        tool: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
    },

    /// The action string matched no branch of the plugin's dispatcher.
    #[error("unknown action `{action}`")]
    UnknownAction { action: String },

    #[error("{message}")]
    Other { message: String },
}

impl PluginError {
    #[must_use]
    pub fn permission_denied(capability: impl std::fmt::Display) -> Self {
        Self::PermissionDenied {
            capability: capability.to_string(),
        }
    }

    #[must_use]
    pub fn tool_not_found(tool: impl Into<String>, remediation: impl Into<String>) -> Self {
        Self::ToolNotFound {
            tool: tool.into(),
            remediation: remediation.into(),
        }
    }

    #[must_use]
    pub fn invocation(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolInvocation {
            tool: tool.into(),
            message: message.into(),
            exit_code: None,
        }
    }

    #[must_use]
    pub fn unknown_action(action: impl Into<String>) -> Self {
        Self::UnknownAction {
            action: action.into(),
        }
    }

    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Stable machine-readable code, also the serde tag.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::PermissionDenied { .. } => "permission_denied",
            Self::ToolNotFound { .. } => "tool_not_found",
            Self::ToolInvocation { .. } => "tool_invocation",
            Self::UnknownAction { .. } => "unknown_action",
            Self::Other { .. } => "other",
        }
    }
}
