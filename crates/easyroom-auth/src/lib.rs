//! Facade over the EasyRoom auth state sync engine.
//!
//! Composes the persistent store, the state manager, the handoff
//! redirection handler, and the one-time legacy migration behind one
//! type. An application constructs one [`AuthSystem`] per execution
//! context at its composition root and passes it down explicitly.
//!
//! Typical lifecycle:
//! 1. [`AuthSystem::open`] (or [`AuthSystem::new`] with explicit options)
//! 2. [`AuthSystem::initialize`] once, to run the legacy migration
//! 3. [`AuthSystem::on_state_change`] from UI code, which also drives
//!    background polling on the allow-listed routes
//! 4. [`AuthSystem::login`] / [`AuthSystem::complete_login`] around the
//!    external auth handoff

pub use auth_handoff::{
    AuthProvider, AuthResultRecord, AuthReturnData, HandoffConfig, HandoffError, HandoffResult,
    Navigator, NoopNavigator, RedirectionHandler, VERIFIED_PAGE_PATH,
};
pub use auth_migration::{MigrationLog, MigrationReport, MigrationShim};
pub use auth_state_engine::{
    AuthState, AuthStateManager, AuthStatus, LocationProvider, PollingConfig, PollingSnapshot,
    PollingStatus, SessionCheck, StateListener, StateSource, StateSubscription, StaticLocation,
    GRACE_PERIOD_MS, SCHEMA_VERSION,
};
pub use easyroom_config_and_utils::{init_logging, Config, Paths};
pub use shared_state_storage::{
    create_store, FileStore, MemoryStore, SharedStateStore, StorageKeys,
};

use std::sync::Arc;
use tracing::{info, warn};

/// Wiring for an [`AuthSystem`].
///
/// Every seam the engine has (storage backend, route lookup, navigation,
/// backend session check) is injected here; the defaults give a headless,
/// storage-less system that degrades every operation to a no-op.
pub struct AuthSystemOptions {
    pub backend: Option<Arc<dyn SharedStateStore>>,
    pub handoff: HandoffConfig,
    pub polling: PollingConfig,
    pub location: Arc<dyn LocationProvider>,
    pub navigator: Arc<dyn Navigator>,
    pub session_check: Option<SessionCheck>,
}

impl Default for AuthSystemOptions {
    fn default() -> Self {
        Self {
            backend: None,
            handoff: HandoffConfig::default(),
            polling: PollingConfig::default(),
            location: Arc::new(StaticLocation::new("/")),
            navigator: Arc::new(NoopNavigator),
            session_check: None,
        }
    }
}

/// One execution context's view of the shared auth state.
pub struct AuthSystem {
    manager: Arc<AuthStateManager>,
    handoff: RedirectionHandler,
    migration: MigrationShim,
}

impl AuthSystem {
    pub fn new(options: AuthSystemOptions) -> Self {
        let manager = Arc::new(AuthStateManager::new(
            options.backend.clone(),
            options.polling,
            options.location,
            options.session_check,
        ));
        let handoff = RedirectionHandler::new(
            options.handoff,
            manager.clone(),
            options.backend.clone(),
            options.navigator,
        );
        let migration = MigrationShim::new(options.backend, manager.clone());
        Self {
            manager,
            handoff,
            migration,
        }
    }

    /// Open a system over the default file-backed store under the standard
    /// directories.
    ///
    /// A missing or unwritable state directory is not fatal: the system
    /// comes up without persistence and every storage-touching operation
    /// degrades to a no-op.
    pub fn open(
        config: &Config,
        paths: &Paths,
        location: Arc<dyn LocationProvider>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let backend: Option<Arc<dyn SharedStateStore>> = match paths.ensure_dirs() {
            Ok(()) => match create_store(&paths.state_dir()) {
                Ok(store) => Some(Arc::from(store)),
                Err(e) => {
                    warn!(error = %e, "Shared state store unavailable, running without persistence");
                    None
                }
            },
            Err(e) => {
                warn!(error = %e, "Could not create state directories, running without persistence");
                None
            }
        };

        Self::new(AuthSystemOptions {
            backend,
            handoff: HandoffConfig::from_config(config),
            location,
            navigator,
            ..AuthSystemOptions::default()
        })
    }

    /// Run the one-time legacy storage migration. Safe to call on every
    /// startup; all but the first call per schema version are no-ops.
    pub fn initialize(&self) -> MigrationReport {
        let report = self.migration.perform_migration();
        if report.migration_performed {
            info!(
                success = report.success,
                legacy_data_found = report.legacy_data_found,
                "Auth system initialized"
            );
        }
        report
    }

    /// Current auth state; absent, stale, or corrupted storage yields `None`.
    pub fn auth_state(&self) -> Option<AuthState> {
        self.manager.get_state()
    }

    pub fn set_auth_state(&self, state: AuthState) {
        self.manager.set_state(state);
    }

    /// Log out: remove the persisted state and notify listeners.
    pub fn clear_auth_state(&self) {
        self.manager.clear_state();
    }

    /// Register a state-change listener. The first listener starts background
    /// polling on allow-listed routes; the last to unsubscribe stops it.
    pub fn on_state_change(&self, listener: StateListener) -> StateSubscription {
        self.manager.on_state_change(listener)
    }

    /// Begin a login handoff: clear a spent poll budget so the new flow can
    /// be observed, then hand control to the external auth surface.
    ///
    /// The only fallible operation on the facade; it runs inside a
    /// user-initiated action whose caller can surface the failure.
    pub fn login(&self, provider: AuthProvider, return_url: Option<&str>) -> HandoffResult<()> {
        if self.manager.polling_exhausted() {
            self.manager.reset_polling();
        }
        self.handoff.redirect_to_auth(provider, return_url)
    }

    /// Complete a login handoff from the return URL the external surface
    /// navigated to. Returns the parsed outcome; state persistence and the
    /// landing navigation happen as side effects and never fail the caller.
    pub fn complete_login(&self, return_url: &str) -> AuthReturnData {
        let result = RedirectionHandler::parse_return_url(return_url);
        self.handoff.handle_auth_return(&result);
        result
    }

    /// Outcome of the last completed handoff, for pages that load after the
    /// return navigation already happened.
    pub fn last_auth_result(&self) -> Option<AuthResultRecord> {
        self.handoff.stored_auth_result()
    }

    pub fn clear_last_auth_result(&self) {
        self.handoff.clear_stored_auth_result();
    }

    /// Return URL of an in-flight handoff, if one was started from this
    /// storage origin.
    pub fn pending_return_url(&self) -> Option<String> {
        self.handoff.stored_return_url()
    }

    pub fn polling_status(&self) -> PollingStatus {
        self.manager.polling_status()
    }

    /// True once polling gave up waiting for external auth.
    pub fn polling_exhausted(&self) -> bool {
        self.manager.polling_exhausted()
    }

    pub fn manager(&self) -> &Arc<AuthStateManager> {
        &self.manager
    }
}
