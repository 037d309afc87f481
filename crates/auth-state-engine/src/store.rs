//! Envelope/staleness policy over the shared persistent store.
//!
//! The public surface (`read`/`write`/`clear`) never returns an error: every
//! failure is logged and normalized to "absence of state". The fallible
//! `try_*` layer underneath exists so the policy itself stays testable.

use crate::envelope::{
    AuthState, EnvelopeMetadata, StateEnvelope, GRACE_PERIOD_MS, SCHEMA_VERSION,
};
use crate::{SyncError, SyncResult};
use chrono::Utc;
use shared_state_storage::{SharedStateStore, StorageKeys};
use std::sync::Arc;
use tracing::{debug, warn};

/// Versioned persistence of [`AuthState`] with staleness handling.
///
/// Constructed with `None` when the host environment has no persistent store
/// at all; in that mode every read returns `None` and every write is a silent
/// no-op. The feature degrades, it never crashes callers.
pub struct PersistentStateStore {
    backend: Option<Arc<dyn SharedStateStore>>,
    grace_period_ms: i64,
}

impl PersistentStateStore {
    pub fn new(backend: Option<Arc<dyn SharedStateStore>>) -> Self {
        Self {
            backend,
            grace_period_ms: GRACE_PERIOD_MS,
        }
    }

    /// Override the grace period (tests).
    pub fn with_grace_period(backend: Option<Arc<dyn SharedStateStore>>, grace_period_ms: i64) -> Self {
        Self {
            backend,
            grace_period_ms,
        }
    }

    /// Read the current state.
    ///
    /// Absent key, parse failure, schema version mismatch, and staleness all
    /// yield `None`; never panics or propagates an error.
    pub fn read(&self) -> Option<AuthState> {
        match self.try_read() {
            Ok(state) => state,
            Err(SyncError::StorageUnavailable) => None,
            Err(SyncError::StaleData) => {
                debug!("Stored auth state is beyond the grace period; treating as absent");
                None
            }
            Err(e) => {
                warn!(error = %e, "Failed to read auth state; treating as absent");
                None
            }
        }
    }

    /// Persist a state, fully replacing any previous envelope.
    ///
    /// Write failures (quota exceeded, storage disabled) are logged and
    /// swallowed; the call never panics or propagates an error.
    pub fn write(&self, state: &AuthState) {
        match self.try_write(state) {
            Ok(()) => {}
            Err(SyncError::StorageUnavailable) => {}
            Err(e) => warn!(error = %e, "Failed to persist auth state"),
        }
    }

    /// Remove the persisted state. Failures are logged and swallowed.
    pub fn clear(&self) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        if let Err(e) = backend.delete(StorageKeys::AUTH_STATE) {
            warn!(error = %e, "Failed to clear auth state");
        }
    }

    fn try_read(&self) -> SyncResult<Option<AuthState>> {
        let backend = self.backend.as_ref().ok_or(SyncError::StorageUnavailable)?;
        let raw = match backend.get(StorageKeys::AUTH_STATE)? {
            Some(raw) => raw,
            None => return Ok(None),
        };

        let envelope: StateEnvelope =
            serde_json::from_str(&raw).map_err(|e| SyncError::CorruptedData(e.to_string()))?;
        if envelope.version != SCHEMA_VERSION {
            return Err(SyncError::CorruptedData(format!(
                "schema version {} (current {})",
                envelope.version, SCHEMA_VERSION
            )));
        }

        let age = Utc::now().timestamp_millis() - envelope.state.timestamp;
        if age > self.grace_period_ms {
            return Err(SyncError::StaleData);
        }

        Ok(Some(envelope.state))
    }

    fn try_write(&self, state: &AuthState) -> SyncResult<()> {
        let backend = self.backend.as_ref().ok_or(SyncError::StorageUnavailable)?;
        let now = Utc::now().timestamp_millis();

        // created_at survives rewrites of a valid envelope; updated_at tracks
        // this write.
        let created_at = backend
            .get(StorageKeys::AUTH_STATE)
            .ok()
            .flatten()
            .and_then(|raw| serde_json::from_str::<StateEnvelope>(&raw).ok())
            .filter(|envelope| envelope.version == SCHEMA_VERSION)
            .map(|envelope| envelope.metadata.created_at)
            .unwrap_or(now);

        let envelope = StateEnvelope {
            version: SCHEMA_VERSION.to_string(),
            state: state.clone(),
            metadata: EnvelopeMetadata {
                created_at,
                updated_at: now,
                source: state.source,
            },
        };

        let raw = serde_json::to_string(&envelope)?;
        backend
            .set(StorageKeys::AUTH_STATE, &raw)
            .map_err(|e| SyncError::StorageWriteFailure(e.to_string()))?;
        debug!(status = ?state.status, source = ?state.source, "Persisted auth state");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::StateSource;
    use shared_state_storage::MemoryStore;

    fn memory_store() -> (Arc<MemoryStore>, PersistentStateStore) {
        let backend = Arc::new(MemoryStore::new());
        let store = PersistentStateStore::new(Some(backend.clone() as Arc<dyn SharedStateStore>));
        (backend, store)
    }

    #[test]
    fn test_roundtrip_within_grace_period() {
        let (_backend, store) = memory_store();
        let state = AuthState::authenticated(
            Some("u1".to_string()),
            Some("t1".to_string()),
            StateSource::Internal,
        );

        store.write(&state);
        assert_eq!(store.read(), Some(state));
    }

    #[test]
    fn test_stale_state_treated_as_absent() {
        let (_backend, store) = memory_store();
        let mut state = AuthState::authenticated(None, None, StateSource::Internal);
        state.timestamp = Utc::now().timestamp_millis() - 6 * 60 * 1000;

        store.write(&state);
        assert_eq!(store.read(), None);
    }

    #[test]
    fn test_corrupted_value_treated_as_absent() {
        let (backend, store) = memory_store();
        backend.set(StorageKeys::AUTH_STATE, "not json").unwrap();
        assert_eq!(store.read(), None);
    }

    #[test]
    fn test_version_mismatch_treated_as_absent() {
        let (backend, store) = memory_store();
        let state = AuthState::unauthenticated(StateSource::Internal);
        let envelope = StateEnvelope {
            version: "1.0".to_string(),
            state: state.clone(),
            metadata: EnvelopeMetadata {
                created_at: state.timestamp,
                updated_at: state.timestamp,
                source: state.source,
            },
        };
        backend
            .set(
                StorageKeys::AUTH_STATE,
                &serde_json::to_string(&envelope).unwrap(),
            )
            .unwrap();

        assert_eq!(store.read(), None);
    }

    #[test]
    fn test_no_storage_degrades_silently() {
        let store = PersistentStateStore::new(None);
        assert_eq!(store.read(), None);

        // Must not panic.
        store.write(&AuthState::unauthenticated(StateSource::Internal));
        store.clear();
        assert_eq!(store.read(), None);
    }

    #[test]
    fn test_clear_removes_state() {
        let (_backend, store) = memory_store();
        store.write(&AuthState::authenticated(None, None, StateSource::Internal));
        assert!(store.read().is_some());

        store.clear();
        assert_eq!(store.read(), None);
    }

    #[test]
    fn test_created_at_preserved_across_rewrites() {
        let (backend, store) = memory_store();
        store.write(&AuthState::pending(StateSource::Internal));

        let first: StateEnvelope = serde_json::from_str(
            &backend.get(StorageKeys::AUTH_STATE).unwrap().unwrap(),
        )
        .unwrap();

        store.write(&AuthState::authenticated(
            Some("u1".to_string()),
            None,
            StateSource::ExternalApp,
        ));
        let second: StateEnvelope = serde_json::from_str(
            &backend.get(StorageKeys::AUTH_STATE).unwrap().unwrap(),
        )
        .unwrap();

        assert_eq!(second.metadata.created_at, first.metadata.created_at);
        assert!(second.metadata.updated_at >= first.metadata.updated_at);
        assert_eq!(second.metadata.source, StateSource::ExternalApp);
    }

    #[test]
    fn test_grace_period_override() {
        let backend = Arc::new(MemoryStore::new());
        let store = PersistentStateStore::with_grace_period(
            Some(backend as Arc<dyn SharedStateStore>),
            50,
        );
        let mut state = AuthState::authenticated(None, None, StateSource::Internal);
        state.timestamp = Utc::now().timestamp_millis() - 1000;

        store.write(&state);
        assert_eq!(store.read(), None);
    }
}
