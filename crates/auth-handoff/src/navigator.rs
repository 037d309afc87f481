//! Full-page navigation seam.

use crate::HandoffResult;
use tracing::debug;

/// Performs a full navigation of the current context.
///
/// The production implementation belongs to the host shell (browser window,
/// webview); the core only ever asks for a navigation and never assumes one
/// succeeded.
pub trait Navigator: Send + Sync {
    fn navigate(&self, url: &str) -> HandoffResult<()>;
}

/// Navigator that logs and does nothing, for headless hosts and tests.
#[derive(Default)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn navigate(&self, url: &str) -> HandoffResult<()> {
        debug!(url = %url, "Navigation requested (noop)");
        Ok(())
    }
}
