//! Marlin firmware protocol
//!
//! Tokens and parsers for the responses a Marlin-compatible printer sends
//! back over its serial console.

pub mod response_parser;

pub use response_parser::{
    classify_line, contains_ack, is_line_number_reset, parse_position, parse_resend, LineKind,
};

/// Acknowledgment token; its presence completes a response
pub const ACK_TOKEN: &str = "ok";

/// Prefix of a retransmission request, e.g. `Resend: 143`
pub const RESEND_PREFIX: &str = "Resend:";

/// Prefix of an unsolicited temperature report
pub const TEMPERATURE_PREFIX: &str = "T:";

/// Command that sets the printer's expected line number
pub const LINE_NUMBER_RESET: &str = "M110";

/// Full line-number reset command appended by `reset_line_number`
pub const RESET_LINE_NUMBER_COMMAND: &str = "M110 N0";

/// Current position query
pub const POSITION_QUERY: &str = "M114";

/// Marker separating logical from stepper positions in an M114 reply
pub const POSITION_COUNT_MARKER: &str = " Count";
