//! Legacy storage migration shim.

use auth_state_engine::{AuthState, AuthStateManager, AuthStatus, StateSource, SCHEMA_VERSION};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_state_storage::{SharedStateStore, StorageKeys};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Persisted marker recording that migration ran for a schema version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationLog {
    pub version: String,
    pub timestamp: i64,
    pub success: bool,
    pub message: String,
}

/// Outcome of a migration attempt, returned to the caller for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Whether a migration pass actually ran (false when already stamped)
    pub migration_performed: bool,
    /// Whether the pass completed without error
    pub success: bool,
    /// Whether any legacy key held usable state
    pub legacy_data_found: bool,
    /// Human-readable summary
    pub message: String,
}

impl MigrationReport {
    fn skipped(message: impl Into<String>) -> Self {
        Self {
            migration_performed: false,
            success: true,
            legacy_data_found: false,
            message: message.into(),
        }
    }
}

/// One-shot bridge from the legacy flat storage keys to the current
/// versioned envelope.
///
/// Never fails the caller: every error path is logged, stamped into the
/// migration log, and folded into the returned [`MigrationReport`].
pub struct MigrationShim {
    backend: Option<Arc<dyn SharedStateStore>>,
    manager: Arc<AuthStateManager>,
}

impl MigrationShim {
    pub fn new(backend: Option<Arc<dyn SharedStateStore>>, manager: Arc<AuthStateManager>) -> Self {
        Self { backend, manager }
    }

    /// True when no migration log exists for the current schema version.
    pub fn is_migration_needed(&self) -> bool {
        let Some(backend) = &self.backend else {
            return false;
        };
        match backend.get(StorageKeys::MIGRATION_LOG) {
            Ok(Some(raw)) => match serde_json::from_str::<MigrationLog>(&raw) {
                Ok(log) => log.version != SCHEMA_VERSION,
                Err(e) => {
                    warn!(error = %e, "Unreadable migration log, re-running migration");
                    true
                }
            },
            Ok(None) => true,
            Err(e) => {
                warn!(error = %e, "Could not read migration log, re-running migration");
                true
            }
        }
    }

    /// Runs the migration if it has not run for this schema version yet.
    ///
    /// Idempotent: a successful (or failed) pass stamps the log and every
    /// later call short-circuits. Legacy keys are deleted best-effort once
    /// the scan has happened, whether or not any of them held usable data.
    pub fn perform_migration(&self) -> MigrationReport {
        if self.backend.is_none() {
            debug!("No persistent storage, skipping migration");
            return MigrationReport::skipped("no persistent storage available");
        }
        if !self.is_migration_needed() {
            debug!("Migration already at current version");
            return MigrationReport::skipped("migration already completed");
        }

        let report = self.run_migration();
        self.write_log(report.success, &report.message);
        if report.success {
            info!(
                legacy_data_found = report.legacy_data_found,
                message = %report.message,
                "Migration completed"
            );
        } else {
            warn!(message = %report.message, "Migration failed");
        }
        report
    }

    fn run_migration(&self) -> MigrationReport {
        // Current-format state already present means a newer context won the
        // race. Stamp the log and leave everything, legacy keys included,
        // untouched.
        if self.manager.get_state().is_some() {
            return MigrationReport {
                migration_performed: true,
                success: true,
                legacy_data_found: false,
                message: "current-format state already present".into(),
            };
        }

        let found = self.scan_legacy_keys();
        self.delete_legacy_keys();

        match found {
            Some((key, candidate)) => {
                let state = derive_state(&candidate);
                debug!(key = %key, status = ?state.status, "Migrating legacy auth state");
                self.manager.set_state(state);
                MigrationReport {
                    migration_performed: true,
                    success: true,
                    legacy_data_found: true,
                    message: format!("migrated legacy state from {key}"),
                }
            }
            None => MigrationReport {
                migration_performed: true,
                success: true,
                legacy_data_found: false,
                message: "no legacy data found".into(),
            },
        }
    }

    /// First legacy key, in declaration order, whose value looks like auth
    /// state wins.
    fn scan_legacy_keys(&self) -> Option<(&'static str, Value)> {
        let backend = self.backend.as_ref()?;
        for key in StorageKeys::LEGACY_KEYS {
            let raw = match backend.get(key) {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    warn!(key = %key, error = %e, "Could not read legacy key");
                    continue;
                }
            };
            let candidate = match serde_json::from_str::<Value>(&raw) {
                Ok(value) => value,
                // Token keys historically stored the raw token string.
                Err(_) if key.contains("token") => {
                    serde_json::json!({ "token": raw })
                }
                Err(e) => {
                    debug!(key = %key, error = %e, "Legacy value is not JSON, skipping");
                    continue;
                }
            };
            if is_plausible_legacy_state(&candidate) {
                return Some((key, candidate));
            }
            debug!(key = %key, "Legacy value does not look like auth state, skipping");
        }
        None
    }

    fn delete_legacy_keys(&self) {
        let Some(backend) = &self.backend else {
            return;
        };
        for key in StorageKeys::LEGACY_KEYS {
            if let Err(e) = backend.delete(key) {
                warn!(key = %key, error = %e, "Could not delete legacy key");
            }
        }
    }

    fn write_log(&self, success: bool, message: &str) {
        let Some(backend) = &self.backend else {
            return;
        };
        let log = MigrationLog {
            version: SCHEMA_VERSION.to_string(),
            timestamp: Utc::now().timestamp_millis(),
            success,
            message: message.to_string(),
        };
        let raw = match serde_json::to_string(&log) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Could not serialize migration log");
                return;
            }
        };
        if let Err(e) = backend.set(StorageKeys::MIGRATION_LOG, &raw) {
            warn!(error = %e, "Could not persist migration log");
        }
    }
}

/// A legacy value qualifies when it carries at least one recognizable auth
/// field. Deliberately permissive: a lone numeric `timestamp` qualifies, so
/// unrelated blobs under a legacy key name can be picked up.
fn is_plausible_legacy_state(value: &Value) -> bool {
    value.get("isAuthenticated").is_some_and(Value::is_boolean)
        || value.get("user").is_some_and(Value::is_object)
        || value.get("token").is_some_and(Value::is_string)
        || value.get("timestamp").is_some_and(Value::is_number)
}

fn derive_state(value: &Value) -> AuthState {
    let is_authenticated = value.get("isAuthenticated").and_then(Value::as_bool) == Some(true);
    let user = value.get("user").filter(|v| v.is_object());
    let token = value.get("token").and_then(Value::as_str);

    let status = if is_authenticated || user.is_some() || token.is_some() {
        AuthStatus::Authenticated
    } else {
        AuthStatus::Unauthenticated
    };
    let user_id = user
        .and_then(|u| u.get("id"))
        .and_then(Value::as_str)
        .or_else(|| value.get("userId").and_then(Value::as_str))
        .map(str::to_string);
    let timestamp = value
        .get("timestamp")
        .and_then(Value::as_i64)
        .unwrap_or_else(|| Utc::now().timestamp_millis());

    AuthState {
        status,
        timestamp,
        user_id,
        session_token: token.map(str::to_string),
        source: StateSource::Migration,
    }
}
