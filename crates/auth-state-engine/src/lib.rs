//! Auth state synchronization engine.
//!
//! Multiple execution contexts (tabs, an external auth window, a reloading
//! page) converge on one authentication state through a shared persistent
//! key/value store and time-based polling; there is no live channel between
//! contexts.
//!
//! ```text
//! ┌──────────────┐  set_state   ┌─────────────────────┐   poll tick   ┌──────────────┐
//! │ any context  │─────────────▶│ PersistentStateStore│◀──────────────│ other tabs'  │
//! │ (tab/handoff)│              │ (versioned envelope)│               │  managers    │
//! └──────────────┘              └─────────────────────┘               └──────┬───────┘
//!                                                                           │ on change
//!                                                                    ┌──────▼───────┐
//!                                                                    │  listeners   │
//!                                                                    └──────────────┘
//! ```
//!
//! Storage failures, partial writes, stale or corrupted envelopes are all
//! normalized to "no state" here; no error from the store ever reaches UI
//! code.

mod envelope;
mod error;
mod listeners;
mod manager;
mod poller;
mod store;

pub use envelope::{
    AuthState, AuthStatus, EnvelopeMetadata, StateEnvelope, StateSource, GRACE_PERIOD_MS,
    SCHEMA_VERSION,
};
pub use error::{SyncError, SyncResult};
pub use listeners::{ListenerRegistry, StateListener};
pub use manager::{AuthStateManager, LocationProvider, StaticLocation, StateSubscription};
pub use poller::{
    PollingConfig, PollingScheduler, PollingSnapshot, PollingStatus, SessionCheck,
};
