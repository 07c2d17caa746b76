//! # printlink
//!
//! Streams G-code to Marlin-style 3D printers over a serial link with
//! line numbers, checksums and one-frame-in-flight flow control.
//!
//! ## Architecture
//!
//! printlink is organized as a workspace with multiple crates:
//!
//! 1. **printlink-core** - Error types and shared thread-safe aliases
//! 2. **printlink-communication** - Transport, framing, sender/receiver
//!    workers and the blocking request API
//! 3. **printlink-settings** - Configuration files
//! 4. **printlink** - This crate: re-exports, logging setup and the CLI

pub use printlink_communication::{
    checksum, list_ports, marlin, prepare_line, ConnectionParams, Frame, LineKind, Printer,
    PrinterOptions, SerialParity, SerialPortInfo, SerialTransport, SessionState,
    TemperatureReading, Transport, TransportOpener,
};
pub use printlink_core::{
    ConnectionError, Error, LinkFault, ProtocolError, Result, SessionError,
};
pub use printlink_settings::{
    default_config_path, Config, ConfigError, ConnectionSettings, SettingsError,
    StreamingSettings,
};

use std::time::Duration;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable, multi-line
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// Initialize logging.
///
/// Honours `RUST_LOG`, defaulting to INFO. Logs go to stderr so command
/// output on stdout stays clean.
pub fn init_logging(format: LogFormat) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_names(true)
        .with_line_number(true);

    match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer.pretty())
            .try_init()?,
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer.json().with_current_span(true))
            .try_init()?,
    }

    Ok(())
}

/// Serial parameters from the `[connection]` section
pub fn connection_params(config: &Config) -> ConnectionParams {
    let connection = &config.connection;
    ConnectionParams {
        port: connection.port.clone(),
        baud_rate: connection.baud_rate,
        read_timeout: Duration::from_millis(connection.read_timeout_ms),
        write_timeout: connection.write_timeout_ms.map(Duration::from_millis),
        data_bits: connection.data_bits,
        stop_bits: connection.stop_bits,
        parity: connection.parity,
        flow_control: connection.flow_control,
    }
}

/// Printer timing from the `[streaming]` section
pub fn printer_options(config: &Config) -> PrinterOptions {
    let streaming = &config.streaming;
    PrinterOptions {
        ack_poll_interval: Duration::from_millis(streaming.ack_poll_interval_ms),
        idle_poll_interval: Duration::from_millis(streaming.idle_poll_interval_ms),
        default_join_timeout: Duration::from_millis(streaming.default_join_timeout_ms),
        banner_timeout: streaming.banner_timeout_ms.map(Duration::from_millis),
    }
}
