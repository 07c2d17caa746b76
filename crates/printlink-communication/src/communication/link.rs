//! Acknowledgment gate
//!
//! The ack flag, the send cursor and the line numbering live behind one
//! mutex. The sender holds it across "write frame, clear ack, advance
//! cursor" so the receiver can never set the flag for frame k after the
//! cursor has already moved past k.

use crate::communication::frame::LineNumbering;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// State guarded by the communication lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkState {
    /// The previous frame was acknowledged
    pub ack_received: bool,
    /// Send buffer index of the next command to transmit
    pub cursor: usize,
    /// Buffer index to printer line number mapping
    pub numbering: LineNumbering,
    /// Frames written so far, retransmissions included
    pub frames_written: usize,
}

impl Default for LinkState {
    fn default() -> Self {
        Self {
            ack_received: true,
            cursor: 0,
            numbering: LineNumbering::new(),
            frames_written: 0,
        }
    }
}

/// One-frame-in-flight gate shared by sender and receiver
#[derive(Debug, Default)]
pub struct LinkGate {
    state: Mutex<LinkState>,
    ack: Condvar,
}

impl LinkGate {
    /// Create a gate that is ready to send
    pub fn new() -> Self {
        Self::default()
    }

    /// Back to a fresh session: ack set, cursor and counters zeroed
    pub fn reset(&self) {
        *self.state.lock() = LinkState::default();
        self.ack.notify_all();
    }

    /// Mark the in-flight frame as acknowledged
    pub fn acknowledge(&self) {
        self.state.lock().ack_received = true;
        self.ack.notify_all();
    }

    /// Roll the cursor back to printer line `line_number` and unblock the
    /// sender so it retransmits from there. Returns the new cursor.
    pub fn rollback(&self, line_number: usize) -> usize {
        let mut state = self.state.lock();
        state.cursor = state.numbering.index_for(line_number);
        state.ack_received = true;
        let cursor = state.cursor;
        drop(state);
        self.ack.notify_all();
        cursor
    }

    /// Wait until the ack flag is set.
    ///
    /// Re-checks `stop` every `poll`. Returns the locked state once the
    /// flag is set, or `None` if `stop` was raised first.
    pub fn wait_for_ack(&self, stop: &AtomicBool, poll: Duration) -> Option<MutexGuard<'_, LinkState>> {
        let mut state = self.state.lock();
        loop {
            if stop.load(Ordering::SeqCst) {
                return None;
            }
            if state.ack_received {
                return Some(state);
            }
            self.ack.wait_for(&mut state, poll);
        }
    }

    /// Wake anything blocked in [`wait_for_ack`](Self::wait_for_ack)
    pub fn wake(&self) {
        self.ack.notify_all();
    }

    /// Send buffer index of the next command to transmit
    pub fn cursor(&self) -> usize {
        self.state.lock().cursor
    }

    /// Frames written so far
    pub fn frames_written(&self) -> usize {
        self.state.lock().frames_written
    }

    /// Whether the previous frame has been acknowledged
    pub fn is_ack_received(&self) -> bool {
        self.state.lock().ack_received
    }
}
