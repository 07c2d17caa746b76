//! Configuration management for printlink
//!
//! Provides configuration file handling and validation. Supports JSON and
//! TOML file formats; the default location is platform specific.
//!
//! Configuration is organized into two sections:
//! - Connection settings (port, baud rate, serial framing, timeouts)
//! - Streaming settings (poll intervals, join and banner bounds)

use crate::error::{ConfigError, Result, SettingsError};
use printlink_communication::SerialParity;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Serial connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Serial port (e.g., "/dev/ttyACM0", "COM3")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Line read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Write timeout in milliseconds, unbounded if absent
    pub write_timeout_ms: Option<u64>,
    /// Data bits (5-8)
    pub data_bits: u8,
    /// Stop bits (1-2)
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
    /// Hardware flow control
    pub flow_control: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: 250_000,
            read_timeout_ms: 3000,
            write_timeout_ms: None,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            flow_control: false,
        }
    }
}

/// Streaming behaviour settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingSettings {
    /// How often a sender waiting for an ack checks for a stop request
    pub ack_poll_interval_ms: u64,
    /// Sleep between buffer polls when idle
    pub idle_poll_interval_ms: u64,
    /// Join bound for workers whose transport has no timeout
    pub default_join_timeout_ms: u64,
    /// Bound on the boot banner wait after opening the port
    pub banner_timeout_ms: Option<u64>,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            ack_poll_interval_ms: 1000,
            idle_poll_interval_ms: 10,
            default_join_timeout_ms: 10_000,
            banner_timeout_ms: None,
        }
    }
}

/// Complete printlink configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Connection settings
    pub connection: ConnectionSettings,
    /// Streaming settings
    pub streaming: StreamingSettings,
}

enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> Result<Format> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        _ => Err(ConfigError::UnsupportedFormat(path.display().to_string()).into()),
    }
}

fn out_of_range(key: &str, value: impl ToString) -> SettingsError {
    ConfigError::ValueOutOfRange {
        key: key.to_string(),
        value: value.to_string(),
    }
    .into()
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load config from file (JSON or TOML, by extension)
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path).map_err(|e| {
            SettingsError::LoadError(format!("{}: {}", path.display(), e))
        })?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Save config to file (JSON or TOML, by extension)
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        self.validate()?;

        let content = match format_of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content).map_err(|e| {
            SettingsError::SaveError(format!("{}: {}", path.display(), e))
        })?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let connection = &self.connection;
        if connection.port.trim().is_empty() {
            return Err(ConfigError::MissingKey("connection.port".to_string()).into());
        }
        if connection.baud_rate == 0 {
            return Err(out_of_range("connection.baud_rate", connection.baud_rate));
        }
        if connection.read_timeout_ms == 0 {
            return Err(out_of_range(
                "connection.read_timeout_ms",
                connection.read_timeout_ms,
            ));
        }
        if connection.write_timeout_ms == Some(0) {
            return Err(out_of_range("connection.write_timeout_ms", 0));
        }
        if !(5..=8).contains(&connection.data_bits) {
            return Err(out_of_range("connection.data_bits", connection.data_bits));
        }
        if !(1..=2).contains(&connection.stop_bits) {
            return Err(out_of_range("connection.stop_bits", connection.stop_bits));
        }

        let streaming = &self.streaming;
        if streaming.ack_poll_interval_ms == 0 {
            return Err(out_of_range("streaming.ack_poll_interval_ms", 0));
        }
        if streaming.idle_poll_interval_ms == 0 {
            return Err(out_of_range("streaming.idle_poll_interval_ms", 0));
        }
        if streaming.default_join_timeout_ms == 0 {
            return Err(out_of_range("streaming.default_join_timeout_ms", 0));
        }

        Ok(())
    }
}

/// `<config dir>/printlink/config.toml`
pub fn default_config_path() -> Result<PathBuf> {
    let dir = dirs::config_dir().ok_or_else(|| {
        SettingsError::ConfigDirectory("no configuration directory on this platform".to_string())
    })?;
    Ok(dir.join("printlink").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.connection.baud_rate, 250_000);
        assert_eq!(config.connection.read_timeout_ms, 3000);
        assert_eq!(config.streaming.ack_poll_interval_ms, 1000);
        assert_eq!(config.streaming.banner_timeout_ms, None);
    }

    #[test]
    fn test_validate_rejects_zero_baud() {
        let mut config = Config::new();
        config.connection.baud_rate = 0;
        assert!(matches!(
            config.validate(),
            Err(SettingsError::Config(ConfigError::ValueOutOfRange { ref key, .. }))
                if key == "connection.baud_rate"
        ));
    }

    #[test]
    fn test_validate_rejects_bad_framing() {
        let mut config = Config::new();
        config.connection.data_bits = 9;
        assert!(config.validate().is_err());

        let mut config = Config::new();
        config.connection.stop_bits = 0;
        assert!(config.validate().is_err());

        let mut config = Config::new();
        config.streaming.idle_poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [connection]
            port = "COM4"
            parity = "even"
            "#,
        )
        .unwrap();
        assert_eq!(config.connection.port, "COM4");
        assert_eq!(config.connection.parity, SerialParity::Even);
        assert_eq!(config.connection.baud_rate, 250_000);
        assert_eq!(config.streaming, StreamingSettings::default());
    }

    #[test]
    fn test_default_config_path() {
        if let Ok(path) = default_config_path() {
            assert!(path.ends_with("printlink/config.toml"));
        }
    }
}
