//! printlink Settings Crate
//!
//! Loads and saves the connection and streaming configuration.

pub mod config;
pub mod error;

pub use config::{default_config_path, Config, ConnectionSettings, StreamingSettings};
pub use error::{ConfigError, SettingsError};
