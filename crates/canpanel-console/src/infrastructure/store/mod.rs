//! The canonical state store.
//!
//! One owned, mutable state cell behind a publish/subscribe interface.
//! Writes are constrained to a single serialized path: only the panel sync
//! loop calls [`Store::apply`], which runs the pure reducer and publishes
//! the result. Everything else (the UI, the dispatcher's validation) only
//! ever sees immutable [`Arc<PanelState>`] snapshots, so there is no state
//! a reader can observe while a writer is still mutating it.
//!
//! Subscription uses a `tokio::sync::watch` channel: every change delivers
//! the full new snapshot, and dropping the receiver unsubscribes.

use std::sync::{Arc, Mutex};

use canpanel_core::{reduce, PanelState, StateEvent};
use tokio::sync::watch;

/// Process-wide holder of the canonical [`PanelState`].
pub struct Store {
    state: Mutex<Arc<PanelState>>,
    tx: watch::Sender<Arc<PanelState>>,
}

impl Store {
    /// Creates a store holding the given initial state.
    pub fn new(initial: PanelState) -> Self {
        let snapshot = Arc::new(initial);
        let (tx, _) = watch::channel(Arc::clone(&snapshot));
        Self {
            state: Mutex::new(snapshot),
            tx,
        }
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> Arc<PanelState> {
        Arc::clone(&self.state.lock().expect("store lock poisoned"))
    }

    /// Subscribes to state changes. The receiver yields the full snapshot
    /// on every change; drop it to unsubscribe.
    pub fn subscribe(&self) -> watch::Receiver<Arc<PanelState>> {
        self.tx.subscribe()
    }

    /// Folds one event into the state and publishes the new snapshot.
    ///
    /// This is the sole write path. It is called only from the sync loop,
    /// which serializes events in transport delivery order; the lock exists
    /// so a concurrent `snapshot()` never reads a half-written pointer, not
    /// to arbitrate between writers.
    pub fn apply(&self, event: StateEvent) -> Arc<PanelState> {
        let mut guard = self.state.lock().expect("store lock poisoned");
        let next = Arc::new(reduce((**guard).clone(), event));
        *guard = Arc::clone(&next);
        // Send fails only when no subscriber exists, which is fine.
        let _ = self.tx.send(Arc::clone(&next));
        next
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
