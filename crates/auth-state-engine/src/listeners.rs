//! In-process listener registry for state-change callbacks.

use crate::envelope::AuthState;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::debug;

/// Callback type for state change notifications. Receives the new state, or
/// `None` when the state was cleared.
pub type StateListener = Box<dyn Fn(Option<&AuthState>) + Send + Sync>;

#[derive(Default)]
struct ListenerTable {
    next_id: u64,
    listeners: BTreeMap<u64, StateListener>,
}

/// Registry of in-process state-change listeners.
///
/// Listener lifetimes drive the polling lifecycle (the manager starts polling
/// on the first insert and stops it after the last removal), so `insert` and
/// `remove` report the resulting count.
#[derive(Default)]
pub struct ListenerRegistry {
    table: Mutex<ListenerTable>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; returns its id.
    pub fn insert(&self, listener: StateListener) -> u64 {
        let mut table = self.table.lock().expect("lock poisoned");
        let id = table.next_id;
        table.next_id += 1;
        table.listeners.insert(id, listener);
        debug!(listener_id = id, count = table.listeners.len(), "Listener registered");
        id
    }

    /// Remove a listener. Returns false if it was already removed, making
    /// repeated unsubscribes harmless.
    pub fn remove(&self, id: u64) -> bool {
        let mut table = self.table.lock().expect("lock poisoned");
        let removed = table.listeners.remove(&id).is_some();
        if removed {
            debug!(listener_id = id, count = table.listeners.len(), "Listener removed");
        }
        removed
    }

    /// Invoke every registered listener with the new state.
    pub fn notify(&self, state: Option<&AuthState>) {
        let table = self.table.lock().expect("lock poisoned");
        for listener in table.listeners.values() {
            listener(state);
        }
    }

    pub fn count(&self) -> usize {
        self.table.lock().expect("lock poisoned").listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}
