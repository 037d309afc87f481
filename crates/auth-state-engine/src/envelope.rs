//! Auth state data model and the versioned envelope it is persisted in.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Schema version of the persisted envelope. An envelope carrying any other
/// version is treated as absent.
pub const SCHEMA_VERSION: &str = "2.0";

/// Maximum age (epoch-ms delta) after which a persisted state is treated as
/// absent even if structurally valid.
pub const GRACE_PERIOD_MS: i64 = 5 * 60 * 1000;

/// Authentication status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    /// No session.
    Unauthenticated,
    /// Waiting on the external auth surface.
    Pending,
    /// Logged in.
    Authenticated,
}

impl AuthStatus {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthStatus::Authenticated)
    }
}

/// Where a state value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateSource {
    /// Produced by this application (login form, logout).
    Internal,
    /// Produced by the external auth window/app via the handoff.
    ExternalApp,
    /// Produced by the legacy-format migration.
    Migration,
}

/// Immutable auth state value. A new state always fully replaces the old one;
/// there is no partial merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthState {
    pub status: AuthStatus,
    /// Epoch milliseconds at which this state was produced.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    pub source: StateSource,
}

impl AuthState {
    /// Create an authenticated state stamped with the current time.
    pub fn authenticated(
        user_id: Option<String>,
        session_token: Option<String>,
        source: StateSource,
    ) -> Self {
        Self {
            status: AuthStatus::Authenticated,
            timestamp: Utc::now().timestamp_millis(),
            user_id,
            session_token,
            source,
        }
    }

    /// Create an unauthenticated state stamped with the current time.
    pub fn unauthenticated(source: StateSource) -> Self {
        Self {
            status: AuthStatus::Unauthenticated,
            timestamp: Utc::now().timestamp_millis(),
            user_id: None,
            session_token: None,
            source,
        }
    }

    /// Create a pending state stamped with the current time.
    pub fn pending(source: StateSource) -> Self {
        Self {
            status: AuthStatus::Pending,
            timestamp: Utc::now().timestamp_millis(),
            user_id: None,
            session_token: None,
            source,
        }
    }
}

/// Metadata persisted alongside the state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeMetadata {
    /// Epoch ms of the first write of this envelope key.
    pub created_at: i64,
    /// Epoch ms of the most recent write.
    pub updated_at: i64,
    pub source: StateSource,
}

/// Versioned wrapper persisted as a single serialized blob under one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEnvelope {
    pub version: String,
    pub state: AuthState,
    pub metadata: EnvelopeMetadata,
}
