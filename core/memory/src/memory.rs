// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

// Standard library imports
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Third-party crates
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use probe_descriptor::{ScalarClass, Value};

use crate::snapshot::{MemorySnapshot, SNAPSHOT_VERSION};
use crate::storage::Storage;

/// Storage key holding the serialized snapshot.
pub const STORAGE_KEY: &str = "probe.value-memory";
/// Coalescing window for snapshot writes.
pub const FLUSH_DEBOUNCE: Duration = Duration::from_millis(500);

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Process-wide adaptive value memory. Captures mutate the in-memory
/// snapshot synchronously; a background task coalesces writes to the
/// storage backend behind a debounce window. Storage failures degrade to
/// memory-only operation and never reach the caller.
pub struct AdaptiveMemory {
    snapshot: Arc<RwLock<MemorySnapshot>>,
    dirty_tx: mpsc::UnboundedSender<()>,
    token: CancellationToken,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl AdaptiveMemory {
    /// Load the persisted snapshot (starting empty on a missing, corrupt
    /// or version-mismatched payload) and start the flush task.
    pub async fn load(storage: Arc<dyn Storage>) -> Self {
        let snapshot = match storage.get(STORAGE_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<MemorySnapshot>(&raw) {
                Ok(snap) if snap.version == SNAPSHOT_VERSION => snap,
                Ok(snap) => {
                    debug!(
                        found = snap.version,
                        expected = SNAPSHOT_VERSION,
                        "discarding value memory with incompatible layout version"
                    );
                    MemorySnapshot::default()
                }
                Err(e) => {
                    warn!(error = %e, "failed to parse persisted value memory, starting empty");
                    MemorySnapshot::default()
                }
            },
            Ok(None) => MemorySnapshot::default(),
            Err(e) => {
                warn!(error = %e, "value memory storage unavailable, running memory-only");
                MemorySnapshot::default()
            }
        };

        let snapshot = Arc::new(RwLock::new(snapshot));
        let (dirty_tx, dirty_rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();

        let flusher = tokio::spawn(flush_loop(
            snapshot.clone(),
            storage,
            dirty_rx,
            token.clone(),
        ));

        AdaptiveMemory {
            snapshot,
            dirty_tx,
            token,
            flusher: Mutex::new(Some(flusher)),
        }
    }

    /// Record every scalar leaf of `value` under the given message type.
    /// The in-memory snapshot is updated synchronously; persistence
    /// happens later, after the debounce window.
    pub fn capture(&self, type_name: &str, value: &Value) {
        self.snapshot.write().capture_at(type_name, value, now_millis());
        // The flusher may already be gone after close(); captures still
        // land in the session snapshot.
        let _ = self.dirty_tx.send(());
    }

    pub fn best_for_field(&self, type_name: &str, path: &str) -> Option<Value> {
        self.snapshot
            .read()
            .best_for_field_at(type_name, path, now_millis())
            .cloned()
    }

    pub fn best_for_scalar(&self, class: ScalarClass, field_name: &str) -> Option<Value> {
        self.snapshot
            .read()
            .best_for_scalar_at(class, field_name, now_millis())
            .cloned()
    }

    /// Stop the flush task, performing one final write of any pending
    /// state. Idempotent.
    pub async fn close(&self) {
        self.token.cancel();
        let handle = self.flusher.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

async fn flush_loop(
    snapshot: Arc<RwLock<MemorySnapshot>>,
    storage: Arc<dyn Storage>,
    mut dirty_rx: mpsc::UnboundedReceiver<()>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                // Final flush covers any capture since the last write.
                if dirty_rx.try_recv().is_ok() {
                    flush(&snapshot, storage.as_ref()).await;
                }
                return;
            }
            recv = dirty_rx.recv() => {
                if recv.is_none() {
                    return;
                }
                tokio::select! {
                    _ = token.cancelled() => {
                        flush(&snapshot, storage.as_ref()).await;
                        return;
                    }
                    _ = time::sleep(FLUSH_DEBOUNCE) => {}
                }
                // Absorb every capture that arrived during the window;
                // the snapshot already reflects them.
                while dirty_rx.try_recv().is_ok() {}
                flush(&snapshot, storage.as_ref()).await;
            }
        }
    }
}

async fn flush(snapshot: &RwLock<MemorySnapshot>, storage: &dyn Storage) {
    let serialized = {
        let snap = snapshot.read();
        serde_json::to_string(&*snap)
    };
    match serialized {
        Ok(raw) => {
            if let Err(e) = storage.set(STORAGE_KEY, raw).await {
                warn!(error = %e, "failed to persist value memory, keeping in-memory state");
            }
        }
        Err(e) => warn!(error = %e, "failed to serialize value memory"),
    }
}
