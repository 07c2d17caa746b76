//! Sender loop
//!
//! Drains the send buffer in order with at most one frame in flight:
//! wait for the previous ack, frame the command at the cursor, write it,
//! clear the ack and advance the cursor, all under the link lock.

use crate::communication::printer::PrinterOptions;
use crate::communication::session::Session;
use crate::communication::Transport;
use printlink_core::{ConnectionError, LinkFault};
use std::sync::atomic::Ordering;
use std::thread;
use tracing::{debug, trace};

/// Run the sender until asked to stop or the transport fails
pub fn run_sender(
    session: &Session,
    transport: &dyn Transport,
    options: &PrinterOptions,
) -> Result<(), LinkFault> {
    let stop = &session.flags.stop_sending;

    while !stop.load(Ordering::SeqCst) {
        if session.pause.is_paused() {
            debug!("Printer paused, waiting...");
            session
                .pause
                .wait_while_paused(stop, options.ack_poll_interval);
            debug!("Printer resumed");
            continue;
        }

        if session.link.cursor() >= session.buffer.len() {
            let in_flight = !session.link.is_ack_received();
            session.flags.printing.store(in_flight, Ordering::SeqCst);
            thread::sleep(options.idle_poll_interval);
            continue;
        }
        session.flags.printing.store(true, Ordering::SeqCst);

        let Some(mut link) = session.link.wait_for_ack(stop, options.ack_poll_interval) else {
            break;
        };

        // A resend may have moved the cursor while we waited.
        let index = link.cursor;
        let Some(command) = session.buffer.get(index) else {
            continue;
        };

        let frame = link.numbering.frame(index, &command)?;
        transport
            .write_all(frame.encode().as_bytes())
            .map_err(|e| ConnectionError::ConnectionLost {
                reason: format!("write failed: {}", e),
            })?;
        link.ack_received = false;
        link.cursor += 1;
        link.frames_written += 1;
        link.numbering.observe(index, &command);
        // Recorded before the lock is released so a receiver fault sees it.
        session.sent_lines.lock().push(command);
        drop(link);

        trace!(frame = %frame, "Sent");
    }

    session.flags.printing.store(false, Ordering::SeqCst);
    Ok(())
}
