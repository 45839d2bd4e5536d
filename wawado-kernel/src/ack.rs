//! Delivery acknowledgments keyed by message id.
//!
//! Each sent message registers a one-shot completion; the transport fires it
//! when the matching ack arrives. The number of outstanding messages is
//! published on a watch channel so shutdown can block until it reaches zero.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tracing::debug;
use uuid::Uuid;

struct Inner {
    pending: Mutex<HashMap<Uuid, oneshot::Sender<()>>>,
    outstanding: watch::Sender<usize>,
}

#[derive(Clone)]
pub struct AckTracker {
    inner: Arc<Inner>,
}

impl Default for AckTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl AckTracker {
    pub fn new() -> Self {
        let (outstanding, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                pending: Mutex::new(HashMap::new()),
                outstanding,
            }),
        }
    }

    /// Starts tracking `id`; the receiver resolves when its ack arrives
    pub fn register(&self, id: Uuid) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.inner.pending.lock();
        pending.insert(id, tx);
        self.inner.outstanding.send_replace(pending.len());
        rx
    }

    /// Resolves `id`. Unknown or already completed ids return `false`.
    pub fn complete(&self, id: &Uuid) -> bool {
        let mut pending = self.inner.pending.lock();
        let Some(tx) = pending.remove(id) else {
            debug!("[ack] unexpected ack {}", id);
            return false;
        };
        self.inner.outstanding.send_replace(pending.len());
        // the sender may have given up already
        let _ = tx.send(());
        true
    }

    /// Stops tracking `id` without resolving it (sender timed out)
    pub fn forget(&self, id: &Uuid) {
        let mut pending = self.inner.pending.lock();
        if pending.remove(id).is_some() {
            self.inner.outstanding.send_replace(pending.len());
        }
    }

    pub fn outstanding(&self) -> usize {
        *self.inner.outstanding.borrow()
    }

    /// Blocks until no message is waiting for an ack
    pub async fn wait_drained(&self) {
        let mut rx = self.inner.outstanding.subscribe();
        // the sender lives as long as `self`, so this cannot fail
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}
