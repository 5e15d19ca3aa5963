//! The capability broker: every privileged local operation is gated behind
//! an explicit, persisted operator decision.

pub mod broker;
pub mod error;
pub mod prompt;
pub mod store;

pub use {
    broker::{CapabilityBroker, GrantRecord, PermissionState},
    error::{Error, Result},
    prompt::{ApprovalDecision, ApprovalNotifier, ApprovalPrompt, PendingApprovals, StaticApprovalPolicy},
    store::GrantStore,
};
