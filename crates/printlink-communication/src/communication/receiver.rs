//! Receiver loop
//!
//! Reads the printer's output line by line, folds multi-line output into
//! one logical response per acknowledgment, and handles resend requests
//! and temperature reports on the side.

use crate::communication::session::{Session, TemperatureReading};
use crate::communication::Transport;
use crate::firmware::marlin::{self, LineKind};
use printlink_core::{ConnectionError, LinkFault, ProtocolError};
use std::sync::atomic::Ordering;
use tracing::{debug, trace};

/// Run the receiver until asked to stop or the link faults.
///
/// On a fault both workers are halted before the fault is returned.
pub fn run_receiver(session: &Session, transport: &dyn Transport) -> Result<(), LinkFault> {
    let mut full_response = String::new();

    while !session.flags.stop_receiving.load(Ordering::SeqCst) {
        let line = match transport.read_line() {
            Ok(line) => line,
            Err(e) => {
                session.halt();
                return Err(ConnectionError::ConnectionLost {
                    reason: format!("read failed: {}", e),
                }
                .into());
            }
        };

        if line.is_empty() {
            continue;
        }

        // No terminator means the read timed out mid-line.
        if !line.ends_with('\n') {
            session.halt();
            full_response.push_str(&line);
            return Err(ProtocolError::TruncatedLine {
                last_sent: session.last_sent(),
                partial: full_response,
            }
            .into());
        }

        if session.banner.offer(&line) {
            debug!(line = line.trim_end(), "Banner");
            continue;
        }

        match marlin::classify_line(&line) {
            LineKind::Resend(line_number) => {
                let cursor = session.link.rollback(line_number);
                debug!(line_number, cursor, "Resend requested");
                continue;
            }
            LineKind::Temperature => {
                trace!(line = line.trim_end(), "Temperature report");
                session.temperatures.lock().push(TemperatureReading::new(line));
                continue;
            }
            LineKind::Response => {}
        }

        full_response.push_str(&line);
        if marlin::contains_ack(&full_response) {
            complete_response(session, std::mem::take(&mut full_response))?;
        }
    }

    Ok(())
}

fn complete_response(session: &Session, response: String) -> Result<(), LinkFault> {
    let frames_written = session.link.frames_written();
    let responses = session.responses.len() + 1;
    if responses > frames_written {
        session.halt();
        return Err(ProtocolError::OutOfSync {
            responses,
            frames_written,
        }
        .into());
    }

    let index = session.responses.complete(response);
    trace!(index, "Response complete");
    session.link.acknowledge();
    Ok(())
}
