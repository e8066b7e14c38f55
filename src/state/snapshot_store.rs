use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use crate::types::Snapshot;

// ---------------------------------------------------------------------------
// SnapshotStore
// ---------------------------------------------------------------------------

/// Holds the latest snapshot asserted by the stream.
///
/// Every `replace` swaps the whole snapshot; nothing from the previous one
/// survives. Dependents hold a `watch::Receiver` and re-run the screener on
/// each change.
pub struct SnapshotStore {
    snapshot: watch::Sender<Arc<Snapshot>>,
    /// Number of snapshots applied since process start.
    replacements: AtomicU64,
}

impl SnapshotStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Unconditionally overwrite the held snapshot and notify subscribers.
    pub fn replace(&self, snapshot: Snapshot) {
        self.snapshot.send_replace(Arc::new(snapshot));
        self.replacements.fetch_add(1, Ordering::Relaxed);
    }

    /// Latest snapshot, or an empty one if nothing has arrived yet.
    pub fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshot.subscribe()
    }

    pub fn replacements(&self) -> u64 {
        self.replacements.load(Ordering::Relaxed)
    }

    pub fn record_count(&self) -> usize {
        self.snapshot.borrow().len()
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Snapshot::empty()));
        Self {
            snapshot,
            replacements: AtomicU64::new(0),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
