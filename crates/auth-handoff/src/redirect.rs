//! Redirection handler: builds and parses the handoff URLs and persists the
//! in-flight intent and result.

use crate::{HandoffError, HandoffResult, Navigator};
use auth_state_engine::{AuthState, AuthStateManager, StateSource};
use chrono::Utc;
use easyroom_config_and_utils::{Config, DEFAULT_APP_BASE_URL, DEFAULT_EXTERNAL_AUTH_URL};
use serde::{Deserialize, Serialize};
use shared_state_storage::{SharedStateStore, StorageKeys};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

/// Landing page the external surface sends the user back to.
pub const VERIFIED_PAGE_PATH: &str = "/auth/verified";

/// External auth surfaces a redirect can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthProvider {
    /// The companion auth window/app.
    ExternalApp,
}

impl AuthProvider {
    pub fn name(&self) -> &'static str {
        match self {
            AuthProvider::ExternalApp => "external_app",
        }
    }
}

/// Handoff URL configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffConfig {
    /// Base URL this application is served from.
    pub app_base_url: String,
    /// Entry point of the external auth surface.
    pub external_auth_url: String,
    /// Path of the verified landing page, on `app_base_url`.
    pub verified_page_path: String,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            app_base_url: DEFAULT_APP_BASE_URL.to_string(),
            external_auth_url: DEFAULT_EXTERNAL_AUTH_URL.to_string(),
            verified_page_path: VERIFIED_PAGE_PATH.to_string(),
        }
    }
}

impl HandoffConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            app_base_url: config.app_base_url.clone(),
            external_auth_url: config.external_auth_url.clone(),
            verified_page_path: VERIFIED_PAGE_PATH.to_string(),
        }
    }
}

/// Best-effort view of the query parameters on a return URL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthReturnData {
    pub success: bool,
    pub user_id: Option<String>,
    pub session_token: Option<String>,
    pub error: Option<String>,
}

/// Handoff outcome persisted for late readers (e.g. a page that reloads
/// after the return navigation already happened).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResultRecord {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Epoch ms at which the outcome was recorded.
    pub timestamp: i64,
}

impl AuthResultRecord {
    pub fn from_return(data: &AuthReturnData) -> Self {
        Self {
            success: data.success,
            user_id: data.user_id.clone(),
            session_token: data.session_token.clone(),
            error: data.error.clone(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// Builds and parses handoff URLs and persists the in-flight intent/result.
///
/// Everything here except [`redirect_to_auth`](Self::redirect_to_auth)
/// swallows failures; the handoff degrades but never crashes the page.
pub struct RedirectionHandler {
    config: HandoffConfig,
    manager: Arc<AuthStateManager>,
    backend: Option<Arc<dyn SharedStateStore>>,
    navigator: Arc<dyn Navigator>,
}

impl RedirectionHandler {
    pub fn new(
        config: HandoffConfig,
        manager: Arc<AuthStateManager>,
        backend: Option<Arc<dyn SharedStateStore>>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            config,
            manager,
            backend,
            navigator,
        }
    }

    /// Hand control to the external auth surface.
    ///
    /// Persists the return URL for the flow, builds the provider URL with the
    /// return URL embedded, and navigates. Construction or navigation
    /// failures are returned with a provider-qualified message; this runs at
    /// a user-initiated action and the caller is expected to handle it.
    pub fn redirect_to_auth(
        &self,
        provider: AuthProvider,
        return_url: Option<&str>,
    ) -> HandoffResult<()> {
        let return_url = match return_url {
            Some(url) => url.to_string(),
            None => self.build_return_url(&self.config.app_base_url),
        };
        self.store_return_url(&return_url);

        let mut url = Url::parse(&self.config.external_auth_url).map_err(|e| {
            HandoffError::Redirect {
                provider: provider.name(),
                message: format!("invalid auth URL: {e}"),
            }
        })?;
        url.query_pairs_mut().append_pair("return_url", &return_url);

        info!(provider = provider.name(), "Redirecting to external auth");
        self.navigator
            .navigate(url.as_str())
            .map_err(|e| HandoffError::Redirect {
                provider: provider.name(),
                message: e.to_string(),
            })
    }

    /// Build the URL the external surface sends the user back to. The `t`
    /// parameter defeats intermediate caching.
    pub fn build_return_url(&self, base_url: &str) -> String {
        format!(
            "{}{}?t={}&source=external_app",
            base_url.trim_end_matches('/'),
            self.config.verified_page_path,
            Utc::now().timestamp_millis()
        )
    }

    /// Extract the handoff outcome from a return URL.
    ///
    /// Pure and total: malformed input yields `{success: false}` with the
    /// parse problem in `error`, never a panic or an Err.
    pub fn parse_return_url(url: &str) -> AuthReturnData {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(e) => {
                return AuthReturnData {
                    success: false,
                    error: Some(format!("malformed return URL: {e}")),
                    ..AuthReturnData::default()
                }
            }
        };

        let mut data = AuthReturnData::default();
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "success" => data.success = value == "true",
                "user_id" => data.user_id = Some(value.into_owned()),
                "session_token" => data.session_token = Some(value.into_owned()),
                "error" => data.error = Some(value.into_owned()),
                _ => {}
            }
        }
        data
    }

    /// Apply a handoff outcome: persist the resulting auth state, store the
    /// raw outcome for late readers, and navigate to the verified landing
    /// page with the outcome encoded as query parameters.
    ///
    /// The success and failure branches are symmetric; only the persisted
    /// status and the query parameters differ.
    pub fn handle_auth_return(&self, result: &AuthReturnData) {
        let state = if result.success {
            AuthState::authenticated(
                result.user_id.clone(),
                result.session_token.clone(),
                StateSource::ExternalApp,
            )
        } else {
            AuthState::unauthenticated(StateSource::ExternalApp)
        };
        self.manager.set_state(state);
        self.store_auth_result(&AuthResultRecord::from_return(result));

        match self.verified_landing_url(result) {
            Ok(url) => {
                if let Err(e) = self.navigator.navigate(url.as_str()) {
                    warn!(error = %e, "Failed to navigate to verified page");
                }
            }
            Err(e) => warn!(error = %e, "Failed to build verified page URL"),
        }
    }

    fn verified_landing_url(&self, result: &AuthReturnData) -> HandoffResult<Url> {
        let mut url = Url::parse(&self.config.app_base_url)?;
        url.set_path(&self.config.verified_page_path);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("success", if result.success { "true" } else { "false" });
            if let Some(user_id) = &result.user_id {
                query.append_pair("user_id", user_id);
            }
            if let Some(token) = &result.session_token {
                query.append_pair("session_token", token);
            }
            if let Some(error) = &result.error {
                query.append_pair("error", error);
            }
        }
        Ok(url)
    }

    /// Last persisted handoff outcome, if any.
    pub fn stored_auth_result(&self) -> Option<AuthResultRecord> {
        let raw = self.read_key(StorageKeys::AUTH_RESULT)?;
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "Stored auth result is corrupted; ignoring");
                None
            }
        }
    }

    pub fn clear_stored_auth_result(&self) {
        self.delete_key(StorageKeys::AUTH_RESULT);
    }

    /// Pending return URL of an in-flight handoff, if any.
    pub fn stored_return_url(&self) -> Option<String> {
        self.read_key(StorageKeys::AUTH_RETURN_URL)
    }

    pub fn clear_stored_return_url(&self) {
        self.delete_key(StorageKeys::AUTH_RETURN_URL);
    }

    fn store_return_url(&self, url: &str) {
        self.write_key(StorageKeys::AUTH_RETURN_URL, url);
    }

    fn store_auth_result(&self, record: &AuthResultRecord) {
        match serde_json::to_string(record) {
            Ok(raw) => self.write_key(StorageKeys::AUTH_RESULT, &raw),
            Err(e) => warn!(error = %e, "Failed to serialize auth result"),
        }
    }

    fn read_key(&self, key: &str) -> Option<String> {
        let backend = self.backend.as_ref()?;
        match backend.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, key = %key, "Storage read failed");
                None
            }
        }
    }

    fn write_key(&self, key: &str, value: &str) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        if let Err(e) = backend.set(key, value) {
            warn!(error = %e, key = %key, "Storage write failed");
        }
    }

    fn delete_key(&self, key: &str) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        if let Err(e) = backend.delete(key) {
            warn!(error = %e, key = %key, "Storage delete failed");
        }
    }
}
