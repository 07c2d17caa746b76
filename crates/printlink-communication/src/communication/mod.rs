//! Communication layer
//!
//! The byte stream to the printer ([`Transport`]), its serial
//! implementation, and the session machinery that paces commands
//! against printer acknowledgments.

pub mod activity;
pub mod frame;
pub mod link;
pub mod pacer;
pub mod printer;
pub mod receiver;
pub mod response_log;
pub mod send_buffer;
pub mod serial;
pub mod session;

use serde::{Deserialize, Serialize};
use std::io;
use std::time::Duration;

/// Serial parity setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialParity {
    /// No parity bit
    #[default]
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Parameters used to open a transport when `connect` is not handed one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Port name (e.g., "/dev/ttyACM0", "COM3")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// How long a single line read may block
    pub read_timeout: Duration,
    /// How long a write may block, if bounded
    pub write_timeout: Option<Duration>,
    /// Data bits (5-8)
    pub data_bits: u8,
    /// Stop bits (1-2)
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
    /// Hardware flow control
    pub flow_control: bool,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: 250_000,
            read_timeout: Duration::from_secs(3),
            write_timeout: None,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            flow_control: false,
        }
    }
}

impl ConnectionParams {
    /// Create parameters for the given port and baud rate
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            ..Self::default()
        }
    }
}

/// Bidirectional line-oriented byte stream to a printer.
///
/// The sender thread writes while the receiver thread reads, so both
/// operations take `&self` and must not block each other.
pub trait Transport: Send + Sync {
    /// Write the whole buffer.
    fn write_all(&self, data: &[u8]) -> io::Result<()>;

    /// Read up to and including the next `\n`.
    ///
    /// Returns an empty string when the read timeout elapses before any
    /// byte arrives, and the partial text (without `\n`) when it elapses
    /// in the middle of a line.
    fn read_line(&self) -> io::Result<String>;

    /// Read timeout, if reads are bounded
    fn read_timeout(&self) -> Option<Duration>;

    /// Write timeout, if writes are bounded
    fn write_timeout(&self) -> Option<Duration>;

    /// Human readable name for logs
    fn name(&self) -> String;

    /// Release the underlying device
    fn close(&self) -> io::Result<()> {
        Ok(())
    }
}
