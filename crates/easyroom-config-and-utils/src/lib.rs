//! Core types, configuration, and utilities for the EasyRoom auth sync engine.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{Config, DEFAULT_APP_BASE_URL, DEFAULT_EXTERNAL_AUTH_URL, DEFAULT_LOG_LEVEL};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
