//! Marlin response parser
//!
//! Classifies raw response lines and parses the few payloads the host
//! interprets itself.

use super::{
    ACK_TOKEN, LINE_NUMBER_RESET, POSITION_COUNT_MARKER, RESEND_PREFIX, TEMPERATURE_PREFIX,
};
use printlink_core::ProtocolError;
use std::collections::HashMap;

/// What a single response line means to the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Retransmit starting at this printer line number
    Resend(usize),
    /// Temperature report, logged on the side
    Temperature,
    /// Part of a command response
    Response,
}

/// Classify one response line.
///
/// Resend requests are recognised before anything else.
pub fn classify_line(line: &str) -> LineKind {
    if let Some(line_number) = parse_resend(line) {
        return LineKind::Resend(line_number);
    }
    if line.starts_with(TEMPERATURE_PREFIX) {
        return LineKind::Temperature;
    }
    LineKind::Response
}

/// Parse `Resend: <n>`
pub fn parse_resend(line: &str) -> Option<usize> {
    line.strip_prefix(RESEND_PREFIX)?
        .split_whitespace()
        .next()?
        .parse()
        .ok()
}

/// Whether `text` carries the acknowledgment token
pub fn contains_ack(text: &str) -> bool {
    text.contains(ACK_TOKEN)
}

/// Whether `command` resets the printer's line numbering
pub fn is_line_number_reset(command: &str) -> bool {
    command.trim_start().starts_with(LINE_NUMBER_RESET)
}

/// Parse an M114 reply into axis positions.
///
/// `X:0.00 Y:0.00 Z:0.00 E:0.00 Count X: 0.00 Y:0.00 Z:0.00` yields the
/// four logical positions; stepper counts and the trailing `ok` are
/// ignored.
pub fn parse_position(response: &str) -> Result<HashMap<String, f64>, ProtocolError> {
    let logical = response
        .split(POSITION_COUNT_MARKER)
        .next()
        .unwrap_or_default()
        .trim();

    let mut position = HashMap::new();
    for token in logical.split_whitespace() {
        if token == ACK_TOKEN {
            continue;
        }
        let (axis, value) = token
            .split_once(':')
            .ok_or_else(|| ProtocolError::MalformedResponse {
                reason: format!("expected AXIS:VALUE, got {:?}", token),
            })?;
        let value = value
            .parse::<f64>()
            .map_err(|e| ProtocolError::MalformedResponse {
                reason: format!("bad value for axis {}: {}", axis, e),
            })?;
        position.insert(axis.to_string(), value);
    }

    if position.is_empty() {
        return Err(ProtocolError::MalformedResponse {
            reason: format!("no axis values in {:?}", response),
        });
    }
    Ok(position)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_resend() {
        assert_eq!(classify_line("Resend: 143\n"), LineKind::Resend(143));
        assert_eq!(classify_line("Resend:3"), LineKind::Resend(3));
        assert_eq!(classify_line("Resend: soon\n"), LineKind::Response);
    }

    #[test]
    fn test_classify_temperature() {
        assert_eq!(
            classify_line("T:210.1 /210.0 B:60.0 /60.0 @:64 B@:0\n"),
            LineKind::Temperature
        );
        assert_eq!(classify_line("ok T:20.0 /0.0\n"), LineKind::Response);
    }

    #[test]
    fn test_contains_ack() {
        assert!(contains_ack("ok\n"));
        assert!(contains_ack("X:0.00 Y:0.00\nok\n"));
        assert!(!contains_ack("echo:busy: processing\n"));
    }

    #[test]
    fn test_is_line_number_reset() {
        assert!(is_line_number_reset("M110 N0"));
        assert!(is_line_number_reset("M110"));
        assert!(!is_line_number_reset("G1 X110"));
    }

    #[test]
    fn test_parse_position() {
        let position =
            parse_position("X:10.00 Y:5.50 Z:0.20 E:1.00 Count X: 800 Y:440 Z:80\nok\n").unwrap();
        assert_eq!(position.len(), 4);
        assert_eq!(position["X"], 10.0);
        assert_eq!(position["Y"], 5.5);
        assert_eq!(position["Z"], 0.2);
        assert_eq!(position["E"], 1.0);
    }

    #[test]
    fn test_parse_position_without_count() {
        let position = parse_position("X:1.00 Y:2.00 Z:3.00 E:0.00\nok\n").unwrap();
        assert_eq!(position["Z"], 3.0);
    }

    #[test]
    fn test_parse_position_rejects_garbage() {
        assert!(matches!(
            parse_position("echo:Unknown command: \"M114\"\nok\n"),
            Err(ProtocolError::MalformedResponse { .. })
        ));
        assert!(parse_position("").is_err());
        assert!(parse_position("X:abc").is_err());
    }
}
