//! Frame codec
//!
//! Turns a command into the exact line written to the printer:
//!
//! ```text
//! N<line> <command>*<checksum>\n
//! ```
//!
//! The checksum is the XOR of every byte of `N<line> <command>`.

use crate::firmware::marlin;
use printlink_core::ProtocolError;
use std::fmt;

/// Everything after this character is a comment
pub const COMMENT_DELIMITER: char = ';';

/// Strip whitespace and comments from a raw line.
///
/// Returns `None` when nothing is left to send.
pub fn prepare_line(raw: &str) -> Option<String> {
    let line = raw.trim();
    let line = match line.find(COMMENT_DELIMITER) {
        Some(pos) => line[..pos].trim_end(),
        None => line,
    };

    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

/// XOR of the byte values of every character in `line`.
pub fn checksum(line: &str) -> Result<u8, ProtocolError> {
    if line.is_empty() {
        return Err(ProtocolError::EmptyChecksumInput);
    }
    Ok(line.bytes().fold(0u8, |acc, b| acc ^ b))
}

/// A command framed for transmission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    line_number: usize,
    command: String,
    checksum: u8,
}

impl Frame {
    /// Frame an already prepared command under the given line number
    pub fn new(command: &str, line_number: usize) -> Result<Self, ProtocolError> {
        let command = command.trim();
        if command.is_empty() {
            return Err(ProtocolError::EmptyFrame);
        }
        let checksum = checksum(&format!("N{} {}", line_number, command))?;

        Ok(Self {
            line_number,
            command: command.to_string(),
            checksum,
        })
    }

    /// Line number embedded in the frame
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// The unframed command text
    pub fn command(&self) -> &str {
        &self.command
    }

    /// The frame checksum
    pub fn checksum(&self) -> u8 {
        self.checksum
    }

    /// The bytes to write to the transport
    pub fn encode(&self) -> String {
        format!("{}\n", self)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{} {}*{}", self.line_number, self.command, self.checksum)
    }
}

/// Maps send buffer positions to printer line numbers.
///
/// Line numbers normally follow the buffer (`index + 1`). A line-number
/// reset command is framed as line 0 and moves the baseline, so the
/// command after it is line 1 again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineNumbering {
    baseline: usize,
}

impl LineNumbering {
    /// Numbering starting at buffer index 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Line number for the command stored at `index`
    pub fn line_number(&self, index: usize, command: &str) -> usize {
        if marlin::is_line_number_reset(command) {
            0
        } else {
            (index + 1).saturating_sub(self.baseline)
        }
    }

    /// Record that the command at `index` was transmitted
    pub fn observe(&mut self, index: usize, command: &str) {
        if marlin::is_line_number_reset(command) {
            self.baseline = index + 1;
        }
    }

    /// Buffer index holding printer line `line_number`
    pub fn index_for(&self, line_number: usize) -> usize {
        self.baseline + line_number.saturating_sub(1)
    }

    /// Frame the command stored at `index`
    pub fn frame(&self, index: usize, command: &str) -> Result<Frame, ProtocolError> {
        Frame::new(command, self.line_number(index, command))
    }
}
