//! End-to-end flows over a real file-backed store shared by several
//! `AuthSystem` instances, the way separate tabs or windows share one
//! storage origin.

use easyroom_auth::{
    AuthProvider, AuthState, AuthStateManager, AuthStatus, AuthSystem, AuthSystemOptions,
    FileStore, HandoffResult, Navigator, PollingStatus, SharedStateStore, StateSource,
    StaticLocation,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use url::Url;

struct RecordingNavigator {
    urls: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            urls: Mutex::new(Vec::new()),
        })
    }

    fn last(&self) -> Option<String> {
        self.urls.lock().unwrap().last().cloned()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, url: &str) -> HandoffResult<()> {
        self.urls.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

fn file_backend(dir: &Path) -> Arc<dyn SharedStateStore> {
    Arc::new(FileStore::new(dir).unwrap())
}

fn system_on(dir: &Path, path: &str, navigator: Arc<dyn Navigator>) -> AuthSystem {
    AuthSystem::new(AuthSystemOptions {
        backend: Some(file_backend(dir)),
        location: Arc::new(StaticLocation::new(path)),
        navigator,
        ..AuthSystemOptions::default()
    })
}

/// Pull the `return_url` parameter back out of the URL the navigator was
/// sent to, as the external auth surface would.
fn embedded_return_url(auth_url: &str) -> String {
    let url = Url::parse(auth_url).unwrap();
    url.query_pairs()
        .find(|(k, _)| k == "return_url")
        .map(|(_, v)| v.into_owned())
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn handoff_round_trip_across_contexts() {
    let dir = tempfile::tempdir().unwrap();
    let navigator = RecordingNavigator::new();
    let app = system_on(dir.path(), "/login", navigator.clone());

    let authenticated_seen = Arc::new(AtomicUsize::new(0));
    let seen = authenticated_seen.clone();
    let _sub = app.on_state_change(Box::new(move |state| {
        if state.is_some_and(|s| s.status.is_authenticated()) {
            seen.fetch_add(1, Ordering::SeqCst);
        }
    }));
    assert_eq!(app.polling_status(), PollingStatus::Active);

    app.login(AuthProvider::ExternalApp, None).unwrap();
    let return_url = embedded_return_url(&navigator.last().unwrap());
    assert_eq!(app.pending_return_url().as_deref(), Some(return_url.as_str()));

    // The external auth window lives in its own context over the same
    // storage origin and completes the flow there.
    let auth_window = system_on(dir.path(), "/auth/verified", RecordingNavigator::new());
    let outcome = format!("{return_url}&success=true&user_id=u9&session_token=tok-9");
    let result = auth_window.complete_login(&outcome);
    assert!(result.success);

    // The app context has not observed anything yet; its next poll tick
    // converges it.
    assert_eq!(authenticated_seen.load(Ordering::SeqCst), 0);
    sleep(Duration::from_millis(2500)).await;
    assert_eq!(authenticated_seen.load(Ordering::SeqCst), 1);

    let state = app.auth_state().unwrap();
    assert_eq!(state.status, AuthStatus::Authenticated);
    assert_eq!(state.user_id.as_deref(), Some("u9"));
    assert_eq!(state.session_token.as_deref(), Some("tok-9"));
    assert_eq!(state.source, StateSource::ExternalApp);

    // The persisted outcome is visible from either context.
    let record = app.last_auth_result().unwrap();
    assert!(record.success);
    assert_eq!(record.user_id.as_deref(), Some("u9"));
}

#[tokio::test]
async fn failed_handoff_leaves_both_contexts_unauthenticated() {
    let dir = tempfile::tempdir().unwrap();
    let app = system_on(dir.path(), "/booking", RecordingNavigator::new());
    let auth_window = system_on(dir.path(), "/auth/verified", RecordingNavigator::new());

    let result = auth_window.complete_login(
        "https://app.easyroom.app/auth/verified?success=false&error=access_denied",
    );
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("access_denied"));

    let state = app.auth_state().unwrap();
    assert_eq!(state.status, AuthStatus::Unauthenticated);

    let record = app.last_auth_result().unwrap();
    assert!(!record.success);
    assert_eq!(record.error.as_deref(), Some("access_denied"));
}

#[tokio::test]
async fn migration_result_is_visible_to_other_contexts() {
    let dir = tempfile::tempdir().unwrap();
    let backend = file_backend(dir.path());
    backend
        .set(
            "easyroom_auth",
            &format!(
                r#"{{"isAuthenticated":true,"userId":"legacy-user","timestamp":{}}}"#,
                chrono_now_ms()
            ),
        )
        .unwrap();

    let first = system_on(dir.path(), "/", RecordingNavigator::new());
    let report = first.initialize();
    assert!(report.migration_performed);
    assert!(report.legacy_data_found);

    let second = system_on(dir.path(), "/", RecordingNavigator::new());
    let state = second.auth_state().unwrap();
    assert_eq!(state.status, AuthStatus::Authenticated);
    assert_eq!(state.user_id.as_deref(), Some("legacy-user"));
    assert_eq!(state.source, StateSource::Migration);

    // Any context re-running initialize sees the stamp and does nothing.
    assert!(!second.initialize().migration_performed);
    assert!(!backend.has("easyroom_auth").unwrap());
}

#[tokio::test(start_paused = true)]
async fn login_resets_an_exhausted_poll_budget() {
    let dir = tempfile::tempdir().unwrap();
    let app = system_on(dir.path(), "/login", RecordingNavigator::new());
    let _sub = app.on_state_change(Box::new(|_| {}));

    sleep(Duration::from_secs(30)).await;
    assert!(app.polling_exhausted());

    app.login(AuthProvider::ExternalApp, None).unwrap();
    assert!(!app.polling_exhausted());
    assert_eq!(app.polling_status(), PollingStatus::Idle);
}

#[tokio::test]
async fn logout_in_one_context_reads_through_in_another() {
    let dir = tempfile::tempdir().unwrap();
    let a = system_on(dir.path(), "/", RecordingNavigator::new());
    let b = system_on(dir.path(), "/", RecordingNavigator::new());

    a.set_auth_state(AuthState::authenticated(
        Some("u1".to_string()),
        None,
        StateSource::Internal,
    ));
    assert!(b.auth_state().is_some());

    a.clear_auth_state();
    assert_eq!(b.auth_state(), None);
}

#[tokio::test]
async fn manager_accessor_exposes_the_shared_instance() {
    let dir = tempfile::tempdir().unwrap();
    let system = system_on(dir.path(), "/", RecordingNavigator::new());

    let manager: &Arc<AuthStateManager> = system.manager();
    manager.set_state(AuthState::pending(StateSource::Internal));
    assert_eq!(system.auth_state().map(|s| s.status), Some(AuthStatus::Pending));
}

fn chrono_now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}
