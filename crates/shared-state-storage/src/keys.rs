//! Storage key constants.
//!
//! All contexts share one flat namespace; these are the only keys the auth
//! sync engine touches.

/// Storage keys used by the auth sync engine
pub struct StorageKeys;

impl StorageKeys {
    /// Current auth state envelope (versioned JSON)
    pub const AUTH_STATE: &'static str = "easyroom_auth_state";

    /// Migration log (idempotency gate for the legacy-format migration)
    pub const MIGRATION_LOG: &'static str = "easyroom_migration_log";

    /// Pending handoff return target (plain URL string)
    pub const AUTH_RETURN_URL: &'static str = "easyroom_auth_return_url";

    /// Last handoff outcome (JSON)
    pub const AUTH_RESULT: &'static str = "easyroom_auth_result";

    /// Legacy keys consumed (and deleted) by the migration shim only.
    pub const LEGACY_KEYS: [&'static str; 5] = [
        "easyroom_auth",
        "easyroom_user",
        "easyroom_token",
        "auth_state",
        "user_session",
    ];
}
