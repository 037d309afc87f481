//! One-time migration of legacy auth storage keys into the current envelope
//! format.
//!
//! Runs at most once per schema version per storage origin, gated by a
//! persisted [`MigrationLog`]. Every failure path still stamps the log so a
//! broken migration does not retry on every startup.

mod shim;

pub use shim::{MigrationLog, MigrationReport, MigrationShim};
