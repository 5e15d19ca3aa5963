//! The lifecycle state machine every plugin instance moves through.

use std::fmt;

use serde::Serialize;

/// Phase of one plugin instance.
///
/// Legal transitions:
///
/// ```text
/// UNINITIALIZED --initialize--> INITIALIZED --start--> STARTED
/// STARTED --stop--> INITIALIZED --destroy--> DESTROYED
/// ```
///
/// A lifecycle hook that errors parks the instance in `Failed`; only
/// `destroy` is legal from there. Everything else is rejected without
/// touching the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecyclePhase {
    Uninitialized,
    Initialized,
    Started,
    Failed,
    Destroyed,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initialized => "initialized",
            Self::Started => "started",
            Self::Failed => "failed",
            Self::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}
