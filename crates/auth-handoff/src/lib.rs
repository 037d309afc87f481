//! Cross-window auth handoff.
//!
//! Control is handed to an external authentication surface by full
//! navigation and comes back the same way, with the outcome encoded in URL
//! query parameters. The in-flight intent (return URL) and the outcome are
//! persisted so a page that reloads mid-flow can recover both.
//!
//! Protocol:
//! - outgoing URL carries `return_url` (URL-encoded)
//! - the return URL carries `t` (cache-bust) and `source=external_app`
//! - the final verified landing URL carries `success`, `user_id`,
//!   `session_token`, `error`

mod navigator;
mod redirect;

pub use navigator::{Navigator, NoopNavigator};
pub use redirect::{
    AuthProvider, AuthResultRecord, AuthReturnData, HandoffConfig, RedirectionHandler,
    VERIFIED_PAGE_PATH,
};

use thiserror::Error;

/// Error type for handoff operations.
///
/// `redirect_to_auth` is the one operation in the sync engine allowed to
/// fail loudly: it runs inside a user-initiated action with an immediate
/// caller able to handle it.
#[derive(Error, Debug)]
pub enum HandoffError {
    /// Redirect construction or navigation failed
    #[error("Auth redirect failed for provider {provider}: {message}")]
    Redirect {
        provider: &'static str,
        message: String,
    },

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Navigation failed
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] shared_state_storage::StorageError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using HandoffError.
pub type HandoffResult<T> = Result<T, HandoffError>;
