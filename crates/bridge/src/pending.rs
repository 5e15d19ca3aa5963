//! Correlation of responses to in-flight calls by envelope id.

use std::collections::HashMap;

use {
    benchlink_protocol::Envelope,
    tokio::sync::{Mutex, oneshot},
    tracing::debug,
};

/// Envelope-id keyed map of waiting callers.
#[derive(Default)]
pub struct PendingCalls {
    inner: Mutex<HashMap<String, oneshot::Sender<Envelope>>>,
}

impl PendingCalls {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in the response to `id`.
    pub async fn register(&self, id: String) -> oneshot::Receiver<Envelope> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().await.insert(id, tx);
        rx
    }

    /// Try to resolve a waiting caller with this inbound envelope.
    /// Hands the envelope back when nobody is waiting on its id — it is a
    /// fresh request, not a response.
    pub async fn resolve(&self, envelope: Envelope) -> Option<Envelope> {
        match self.inner.lock().await.remove(&envelope.id) {
            Some(tx) => {
                // A dropped receiver means the caller timed out; fine.
                let _ = tx.send(envelope);
                None
            },
            None => Some(envelope),
        }
    }

    /// Stop waiting for `id` (caller timeout). In-flight remote work is
    /// unaffected; a late response simply finds nobody waiting.
    pub async fn abandon(&self, id: &str) {
        if self.inner.lock().await.remove(id).is_some() {
            debug!(id, "abandoned pending call");
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}
