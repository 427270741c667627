//! Configuration utilities.

/// Environment-based configuration.
pub mod config;

pub use config::Config;
