//! In-process event bus.
//!
//! A single `EventBus` is constructed at startup and handed by `Arc` to
//! every component; there is no ambient global instance. Dispatch is
//! synchronous and runs subscribers in registration order. A failing
//! subscriber is logged and skipped; it never suppresses later
//! subscribers. No cross-process or durability guarantees.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use {serde::Serialize, tracing::warn};

// ── Events ──────────────────────────────────────────────────────────────────

/// Kinds subscribers can register for, one per [`RuntimeEvent`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PluginLoaded,
    PluginPhaseChanged,
    PluginFailed,
    PermissionResolved,
    PermissionRevoked,
    ConnectionStateChanged,
    OutboundDropped,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Typed payload published on the bus.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuntimeEvent {
    PluginLoaded {
        plugin_id: String,
    },
    PluginPhaseChanged {
        plugin_id: String,
        phase: String,
    },
    /// A lifecycle hook or message handler errored; the failure is isolated
    /// to that plugin.
    PluginFailed {
        plugin_id: String,
        action: Option<String>,
        error: String,
    },
    PermissionResolved {
        plugin_id: String,
        capability: String,
        granted: bool,
    },
    PermissionRevoked {
        plugin_id: String,
        capability: String,
    },
    ConnectionStateChanged {
        state: String,
    },
    /// The disconnect buffer overflowed and dropped its oldest envelope.
    OutboundDropped {
        envelope_id: String,
    },
}

impl RuntimeEvent {
    /// The [`EventKind`] that matches this payload.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::PluginLoaded { .. } => EventKind::PluginLoaded,
            Self::PluginPhaseChanged { .. } => EventKind::PluginPhaseChanged,
            Self::PluginFailed { .. } => EventKind::PluginFailed,
            Self::PermissionResolved { .. } => EventKind::PermissionResolved,
            Self::PermissionRevoked { .. } => EventKind::PermissionRevoked,
            Self::ConnectionStateChanged { .. } => EventKind::ConnectionStateChanged,
            Self::OutboundDropped { .. } => EventKind::OutboundDropped,
        }
    }
}

// ── Bus ─────────────────────────────────────────────────────────────────────

type Handler = Arc<dyn Fn(&RuntimeEvent) -> anyhow::Result<()> + Send + Sync>;

/// Identifies one subscription for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId {
    kind: EventKind,
    seq: u64,
}

struct Subscriber {
    seq: u64,
    handler: Handler,
}

/// Publish/subscribe hub decoupling producers from consumers inside the
/// process.
pub struct EventBus {
    subscribers: Mutex<HashMap<EventKind, Vec<Subscriber>>>,
    next_seq: AtomicU64,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Register `handler` for `kind`. Handlers run in registration order.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&RuntimeEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        subscribers.entry(kind).or_default().push(Subscriber {
            seq,
            handler: Arc::new(handler),
        });
        SubscriptionId { kind, seq }
    }

    /// Remove one subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        match subscribers.get_mut(&id.kind) {
            Some(list) => {
                let before = list.len();
                list.retain(|s| s.seq != id.seq);
                before != list.len()
            },
            None => false,
        }
    }

    /// Dispatch synchronously to every current subscriber of the event's
    /// kind, in registration order. Handler errors are logged and do not
    /// stop the remaining handlers.
    pub fn emit(&self, event: &RuntimeEvent) {
        // Snapshot under the lock, dispatch outside it: handlers may
        // subscribe or emit themselves.
        let snapshot: Vec<(u64, Handler)> = {
            let subscribers = self
                .subscribers
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            match subscribers.get(&event.kind()) {
                Some(list) => list
                    .iter()
                    .map(|s| (s.seq, Arc::clone(&s.handler)))
                    .collect(),
                None => return,
            }
        };

        for (seq, handler) in snapshot {
            if let Err(e) = handler(event) {
                warn!(kind = %event.kind(), subscription = seq, error = %e, "event handler failed");
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
