//! Error handling for printlink
//!
//! Errors are split by the layer that raises them:
//! - Connection errors (opening, reading and writing the transport)
//! - Protocol errors (framing, truncated lines, response desync)
//! - Session errors (caller misuse of the printer lifecycle)
//!
//! All error types use `thiserror`. The per-layer enums are `Clone` so a
//! single receiver fault can be handed to every blocked waiter.

use thiserror::Error;

/// Connection error type
///
/// Represents failures of the byte stream between host and printer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// No transport is attached
    #[error("Printer not connected")]
    NotConnected,

    /// Connection lost while reading or writing
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// Invalid connection parameters
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },

    /// Serial port error
    #[error("Serial port error: {reason}")]
    SerialError {
        /// The reason for the serial port error.
        reason: String,
    },
}

/// Protocol error type
///
/// Represents violations of the line-numbered, acknowledged wire protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Checksum requested for an empty string
    #[error("Cannot compute checksum of an empty string")]
    EmptyChecksumInput,

    /// A command stripped down to nothing
    #[error("Refusing to frame an empty command")]
    EmptyFrame,

    /// More responses arrived than frames were written
    #[error("Protocol out of sync: response {responses} received but only {frames_written} frames written")]
    OutOfSync {
        /// Number of responses including the offending one.
        responses: usize,
        /// Number of frames written to the transport so far.
        frames_written: usize,
    },

    /// The transport timed out in the middle of a line
    #[error("Read timed out mid-line (last sent: {last_sent:?}, partial response: {partial:?})")]
    TruncatedLine {
        /// The last command written before the failure, if any.
        last_sent: Option<String>,
        /// The response text accumulated so far.
        partial: String,
    },

    /// A response could not be interpreted
    #[error("Malformed response: {reason}")]
    MalformedResponse {
        /// What was wrong with the response.
        reason: String,
    },
}

/// Session error type
///
/// Represents calls made against a session that cannot honour them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// A line was appended after disconnect was requested
    #[error("Attempted to send line after a disconnect was requested: {line}")]
    DisconnectPending {
        /// The rejected line.
        line: String,
    },

    /// The receiver is not running, so no response can ever arrive
    #[error("Can't get response from serial since the receiver isn't running")]
    ReceiverNotRunning,

    /// The receiver stopped before the awaited response arrived
    #[error("Receiver stopped before the response arrived")]
    ReceiverStopped,

    /// `connect` was called on a live session
    #[error("Printer already connected")]
    AlreadyConnected,
}

/// A fault that ends the receiver.
///
/// Cloned into every pending response waiter when a worker faults.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkFault {
    /// Wire protocol violation
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Transport failure
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Main error type for printlink
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Session error
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LinkFault> for Error {
    fn from(fault: LinkFault) -> Self {
        match fault {
            LinkFault::Protocol(e) => Error::Protocol(e),
            LinkFault::Connection(e) => Error::Connection(e),
        }
    }
}

impl Error {
    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is a protocol error
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }

    /// Check if this is a session error
    pub fn is_session_error(&self) -> bool {
        matches!(self, Error::Session(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SessionError::DisconnectPending {
            line: "G1 X10".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Attempted to send line after a disconnect was requested: G1 X10"
        );

        let err = ProtocolError::OutOfSync {
            responses: 3,
            frames_written: 2,
        };
        assert_eq!(
            err.to_string(),
            "Protocol out of sync: response 3 received but only 2 frames written"
        );

        let err = ConnectionError::FailedToOpen {
            port: "/dev/ttyACM0".to_string(),
            reason: "busy".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to open port /dev/ttyACM0: busy");
    }

    #[test]
    fn test_link_fault_conversion() {
        let fault: LinkFault = ProtocolError::EmptyFrame.into();
        let err: Error = fault.into();
        assert!(err.is_protocol_error());

        let fault: LinkFault = ConnectionError::ConnectionLost {
            reason: "unplugged".to_string(),
        }
        .into();
        let err: Error = fault.clone().into();
        assert!(err.is_connection_error());
        assert_eq!(err.to_string(), fault.to_string());
    }

    #[test]
    fn test_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_session_error());
    }
}
