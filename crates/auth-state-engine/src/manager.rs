//! The single entry point other code uses for auth state.
//!
//! `AuthStateManager` composes the persistent store, the listener registry,
//! and the polling scheduler. One instance per execution context, owned by
//! the application's composition root and passed explicitly; there is no
//! global accessor.

use crate::envelope::{AuthState, AuthStatus};
use crate::listeners::{ListenerRegistry, StateListener};
use crate::poller::{PollingConfig, PollingScheduler, PollingSnapshot, PollingStatus, SessionCheck};
use crate::store::PersistentStateStore;
use crate::SyncResult;
use futures_util::FutureExt;
use shared_state_storage::SharedStateStore;
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

/// Supplies the current route path for the polling allow-list check.
pub trait LocationProvider: Send + Sync {
    /// Current route path, e.g. `/login`.
    fn current_path(&self) -> String;
}

/// Fixed-path location provider for hosts without a router, and for tests.
pub struct StaticLocation(String);

impl StaticLocation {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }
}

impl LocationProvider for StaticLocation {
    fn current_path(&self) -> String {
        self.0.clone()
    }
}

struct ManagerShared {
    store: PersistentStateStore,
    listeners: ListenerRegistry,
    scheduler: PollingScheduler,
    location: Arc<dyn LocationProvider>,
    /// Last state observed by this context, for change detection on poll
    /// ticks. Readers re-validate against the store; this is never a source
    /// of truth.
    last_seen: Mutex<Option<AuthState>>,
    /// Optional injected backend session lookup, consulted on each tick.
    session_check: Option<SessionCheck>,
}

impl ManagerShared {
    /// One poll tick: re-read the shared store, converge listeners, then run
    /// the injected session check.
    async fn poll_tick(self: Arc<Self>) -> SyncResult<()> {
        let current = self.store.read();
        self.notify_if_changed(current);

        if let Some(check) = &self.session_check {
            (check)().await?;
        }
        Ok(())
    }

    fn notify_if_changed(&self, current: Option<AuthState>) {
        let changed = {
            let mut last = self.last_seen.lock().expect("lock poisoned");
            if *last == current {
                false
            } else {
                *last = current.clone();
                true
            }
        };
        if changed {
            debug!(
                status = ?current.as_ref().map(|s| s.status),
                "Auth state changed; notifying listeners"
            );
            self.listeners.notify(current.as_ref());
        }
    }
}

/// Composes store, listeners, and polling behind `get/set/clear/on_state_change`.
pub struct AuthStateManager {
    shared: Arc<ManagerShared>,
}

impl AuthStateManager {
    /// Create a manager over the given storage backend (`None` when the
    /// environment has no persistent store; everything degrades to no-ops).
    pub fn new(
        backend: Option<Arc<dyn SharedStateStore>>,
        config: PollingConfig,
        location: Arc<dyn LocationProvider>,
        session_check: Option<SessionCheck>,
    ) -> Self {
        let shared = Arc::new_cyclic(|weak: &Weak<ManagerShared>| {
            let tick_target = weak.clone();
            let tick: SessionCheck = Arc::new(move || {
                let target = tick_target.clone();
                async move {
                    match target.upgrade() {
                        Some(shared) => shared.poll_tick().await,
                        // Manager is gone; the loop will be stopped by Drop.
                        None => Ok(()),
                    }
                }
                .boxed()
            });

            ManagerShared {
                store: PersistentStateStore::new(backend),
                listeners: ListenerRegistry::new(),
                scheduler: PollingScheduler::new(config, tick),
                location,
                last_seen: Mutex::new(None),
                session_check,
            }
        });
        Self { shared }
    }

    /// Read the current state; absent, stale, or corrupted storage yields `None`.
    pub fn get_state(&self) -> Option<AuthState> {
        self.shared.store.read()
    }

    /// Persist a new state and notify this context's listeners immediately.
    /// Other contexts observe the change on their next poll tick.
    pub fn set_state(&self, state: AuthState) {
        self.shared.store.write(&state);
        self.shared.notify_if_changed(Some(state));
    }

    /// Remove the persisted state (logout) and notify listeners with `None`.
    pub fn clear_state(&self) {
        self.shared.store.clear();
        self.shared.notify_if_changed(None);
    }

    /// Register a state-change listener.
    ///
    /// Registering the first listener starts polling when the current route
    /// is in the allow-list and the state is not already authenticated;
    /// unregistering the last listener stops it.
    pub fn on_state_change(&self, listener: StateListener) -> StateSubscription {
        let was_empty = self.shared.listeners.is_empty();
        let id = self.shared.listeners.insert(listener);

        if was_empty {
            let status = self
                .get_state()
                .map(|s| s.status)
                .unwrap_or(AuthStatus::Unauthenticated);
            let path = self.shared.location.current_path();
            if self.shared.scheduler.should_poll(&path, status) {
                self.shared.scheduler.start();
            } else {
                debug!(path = %path, ?status, "Polling not permitted here");
            }
        }

        StateSubscription {
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub fn polling_status(&self) -> PollingStatus {
        self.shared.scheduler.status()
    }

    /// True once polling gave up waiting for external auth. This is a
    /// terminal "stop waiting" signal, not an error.
    pub fn polling_exhausted(&self) -> bool {
        self.shared.scheduler.is_exhausted()
    }

    pub fn polling_snapshot(&self) -> PollingSnapshot {
        self.shared.scheduler.snapshot()
    }

    /// Restart polling from a clean slate (e.g. after a new handoff begins).
    pub fn reset_polling(&self) {
        self.shared.scheduler.reset();
    }
}

impl Drop for AuthStateManager {
    fn drop(&mut self) {
        // No timer may outlive the context that owns it.
        self.shared.scheduler.stop();
    }
}

/// Handle returned by [`AuthStateManager::on_state_change`].
pub struct StateSubscription {
    id: u64,
    shared: Weak<ManagerShared>,
}

impl StateSubscription {
    /// Remove the listener. Idempotent; removing the last listener stops
    /// polling.
    pub fn unsubscribe(&self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        if shared.listeners.remove(self.id) && shared.listeners.is_empty() {
            shared.scheduler.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::StateSource;
    use shared_state_storage::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::sleep;

    fn manager_on(
        backend: Arc<MemoryStore>,
        path: &str,
    ) -> AuthStateManager {
        AuthStateManager::new(
            Some(backend as Arc<dyn SharedStateStore>),
            PollingConfig::default(),
            Arc::new(StaticLocation::new(path)),
            None,
        )
    }

    #[tokio::test]
    async fn test_set_get_clear_roundtrip() {
        let manager = manager_on(Arc::new(MemoryStore::new()), "/login");

        assert_eq!(manager.get_state(), None);

        let state = AuthState::authenticated(
            Some("u1".to_string()),
            Some("t1".to_string()),
            StateSource::Internal,
        );
        manager.set_state(state.clone());
        assert_eq!(manager.get_state(), Some(state));

        manager.clear_state();
        assert_eq!(manager.get_state(), None);
    }

    #[tokio::test]
    async fn test_listeners_notified_on_set_and_clear() {
        let manager = manager_on(Arc::new(MemoryStore::new()), "/settings");
        let hits = Arc::new(AtomicUsize::new(0));

        let subs: Vec<StateSubscription> = (0..2)
            .map(|_| {
                let hits = hits.clone();
                manager.on_state_change(Box::new(move |_| {
                    hits.fetch_add(1, Ordering::SeqCst);
                }))
            })
            .collect();

        manager.set_state(AuthState::pending(StateSource::Internal));
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        manager.clear_state();
        assert_eq!(hits.load(Ordering::SeqCst), 4);

        for sub in &subs {
            sub.unsubscribe();
            sub.unsubscribe(); // idempotent
        }
        manager.set_state(AuthState::pending(StateSource::Internal));
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_listener_lifecycle_drives_polling() {
        let manager = manager_on(Arc::new(MemoryStore::new()), "/login");
        assert_eq!(manager.polling_status(), PollingStatus::Idle);

        let sub = manager.on_state_change(Box::new(|_| {}));
        assert!(matches!(manager.polling_status(), PollingStatus::Active));

        sub.unsubscribe();
        sleep(Duration::from_millis(10)).await;
        assert_eq!(manager.polling_status(), PollingStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_listener_after_stop_restarts_polling() {
        let manager = manager_on(Arc::new(MemoryStore::new()), "/login");

        let sub = manager.on_state_change(Box::new(|_| {}));
        assert_eq!(manager.polling_status(), PollingStatus::Active);

        sub.unsubscribe();
        sleep(Duration::from_millis(10)).await;
        assert_eq!(manager.polling_status(), PollingStatus::Stopped);

        // Registering a first listener again must resume polling.
        let _sub = manager.on_state_change(Box::new(|_| {}));
        assert_eq!(manager.polling_status(), PollingStatus::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_polling_off_allowed_paths() {
        let manager = manager_on(Arc::new(MemoryStore::new()), "/settings");
        let _sub = manager.on_state_change(Box::new(|_| {}));
        assert_eq!(manager.polling_status(), PollingStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_polling_when_already_authenticated() {
        let backend = Arc::new(MemoryStore::new());
        let writer = manager_on(backend.clone(), "/login");
        writer.set_state(AuthState::authenticated(None, None, StateSource::Internal));

        let manager = manager_on(backend, "/login");
        let _sub = manager.on_state_change(Box::new(|_| {}));
        assert_eq!(manager.polling_status(), PollingStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_tick_converges_on_external_write() {
        let backend = Arc::new(MemoryStore::new());
        let observer = manager_on(backend.clone(), "/login");

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_listener = seen.clone();
        let _sub = observer.on_state_change(Box::new(move |state| {
            if state.is_some_and(|s| s.status.is_authenticated()) {
                seen_in_listener.fetch_add(1, Ordering::SeqCst);
            }
        }));

        // Another context writes while this one is polling.
        let other_tab = manager_on(backend, "/auth/verified");
        other_tab.set_state(AuthState::authenticated(
            Some("u1".to_string()),
            None,
            StateSource::ExternalApp,
        ));
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        // First poll tick lands after the 2s base interval.
        sleep(Duration::from_millis(2500)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_exhausted_surfaced() {
        let manager = manager_on(Arc::new(MemoryStore::new()), "/login");
        let _sub = manager.on_state_change(Box::new(|_| {}));

        assert!(!manager.polling_exhausted());
        sleep(Duration::from_secs(30)).await;
        assert!(manager.polling_exhausted());
        assert_eq!(manager.polling_snapshot().retry_count, 3);
    }
}
