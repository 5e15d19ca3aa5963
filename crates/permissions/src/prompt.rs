//! The operator-approval surface.
//!
//! The broker only knows the [`ApprovalPrompt`] trait; what sits behind it
//! is a collaborator's choice. [`StaticApprovalPolicy`] answers from
//! config for headless runs. [`PendingApprovals`] parks each prompt in a
//! resolution map so an external UI can answer it asynchronously.

use std::{collections::HashMap, sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    benchlink_common::Capability,
    serde::{Deserialize, Serialize},
    tokio::sync::{RwLock, oneshot},
    tracing::{debug, warn},
};

/// Outcome of one approval prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    Approved,
    Denied,
    /// Nobody answered in time. Not persisted; the next request re-asks.
    Timeout,
}

/// Blocking prompt the broker calls when no stored decision exists.
#[async_trait]
pub trait ApprovalPrompt: Send + Sync {
    async fn decide(&self, plugin_id: &str, capability: Capability) -> ApprovalDecision;
}

// ── Static policy ───────────────────────────────────────────────────────────

/// Config-driven answers for headless runs: `auto_deny` wins over
/// `auto_grant`, anything unmatched is denied.
///
/// Patterns are `plugin:capability` with `*` accepted for the plugin id
/// (`*:file:read`), for the capability (`container-tool:*`), or alone.
pub struct StaticApprovalPolicy {
    auto_grant: Vec<String>,
    auto_deny: Vec<String>,
}

fn pattern_matches(pattern: &str, plugin_id: &str, capability: Capability) -> bool {
    if pattern == "*" {
        return true;
    }
    let full = format!("{plugin_id}:{capability}");
    if pattern == full {
        return true;
    }
    if let Some(rest) = pattern.strip_prefix("*:") {
        return rest == capability.as_str();
    }
    if let Some(prefix) = pattern.strip_suffix(":*") {
        return prefix == plugin_id;
    }
    false
}

impl StaticApprovalPolicy {
    #[must_use]
    pub fn new(auto_grant: Vec<String>, auto_deny: Vec<String>) -> Self {
        Self {
            auto_grant,
            auto_deny,
        }
    }
}

#[async_trait]
impl ApprovalPrompt for StaticApprovalPolicy {
    async fn decide(&self, plugin_id: &str, capability: Capability) -> ApprovalDecision {
        if self
            .auto_deny
            .iter()
            .any(|p| pattern_matches(p, plugin_id, capability))
        {
            return ApprovalDecision::Denied;
        }
        if self
            .auto_grant
            .iter()
            .any(|p| pattern_matches(p, plugin_id, capability))
        {
            return ApprovalDecision::Approved;
        }
        debug!(plugin_id, capability = %capability, "no policy match, denying");
        ApprovalDecision::Denied
    }
}

// ── Pending approvals ───────────────────────────────────────────────────────

/// Notifies the external UI that a prompt is waiting to be resolved.
#[async_trait]
pub trait ApprovalNotifier: Send + Sync {
    async fn notify(&self, request_id: &str, plugin_id: &str, capability: Capability);
}

struct PendingRequest {
    tx: oneshot::Sender<ApprovalDecision>,
}

/// Parks prompts in a uuid-keyed resolution map with a bounded wait.
pub struct PendingApprovals {
    timeout: Duration,
    notifier: Arc<dyn ApprovalNotifier>,
    pending: RwLock<HashMap<String, PendingRequest>>,
}

impl PendingApprovals {
    #[must_use]
    pub fn new(timeout: Duration, notifier: Arc<dyn ApprovalNotifier>) -> Self {
        Self {
            timeout,
            notifier,
            pending: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a pending prompt by id. Unknown ids are logged and ignored.
    pub async fn resolve(&self, request_id: &str, decision: ApprovalDecision) {
        if let Some(request) = self.pending.write().await.remove(request_id) {
            let _ = request.tx.send(decision);
            debug!(request_id, "approval resolved");
        } else {
            warn!(request_id, "approval resolve: no pending request");
        }
    }

    /// Ids of all prompts currently awaiting a decision.
    pub async fn pending_ids(&self) -> Vec<String> {
        self.pending.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl ApprovalPrompt for PendingApprovals {
    async fn decide(&self, plugin_id: &str, capability: Capability) -> ApprovalDecision {
        let request_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending
            .write()
            .await
            .insert(request_id.clone(), PendingRequest { tx });
        debug!(request_id, plugin_id, capability = %capability, "approval request created");

        self.notifier
            .notify(&request_id, plugin_id, capability)
            .await;

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(decision)) => decision,
            Ok(Err(_)) => {
                warn!(request_id, "approval channel closed");
                ApprovalDecision::Denied
            },
            Err(_) => {
                warn!(request_id, plugin_id, "approval timed out");
                self.pending.write().await.remove(&request_id);
                ApprovalDecision::Timeout
            },
        }
    }
}
