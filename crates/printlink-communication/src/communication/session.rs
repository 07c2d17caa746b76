//! Shared session state
//!
//! Everything the sender, the receiver and caller threads touch. Each
//! field is a cheap shared handle, so the whole [`Session`] is cloned into
//! the worker threads.

use crate::communication::link::LinkGate;
use crate::communication::response_log::ResponseLog;
use crate::communication::send_buffer::SendBuffer;
use crate::firmware::marlin;
use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use printlink_core::{thread_safe_vec, ThreadSafeVec};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A temperature report received from the printer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemperatureReading {
    /// The raw report line
    pub raw: String,
    /// When the line was read
    pub received_at: DateTime<Utc>,
}

impl TemperatureReading {
    /// Stamp a report line with the current time
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            received_at: Utc::now(),
        }
    }
}

/// Boolean flags raised across threads
#[derive(Debug, Default)]
pub struct SessionFlags {
    /// Ask the sender to exit between frames
    pub stop_sending: AtomicBool,
    /// Ask the receiver to exit after its current read
    pub stop_receiving: AtomicBool,
    /// New appends are refused
    pub disconnect_pending: AtomicBool,
    /// The sender has unsent or unacknowledged work
    pub printing: AtomicBool,
}

/// Pause switch observed by the sender only
#[derive(Debug, Default)]
pub struct PauseGate {
    paused: Mutex<bool>,
    resumed: Condvar,
}

impl PauseGate {
    /// Pause or resume
    pub fn set(&self, paused: bool) {
        *self.paused.lock() = paused;
        if !paused {
            self.resumed.notify_all();
        }
    }

    /// Whether the sender is held
    pub fn is_paused(&self) -> bool {
        *self.paused.lock()
    }

    /// Block while paused, re-checking `stop` every `poll`
    pub fn wait_while_paused(&self, stop: &AtomicBool, poll: Duration) {
        let mut paused = self.paused.lock();
        while *paused && !stop.load(Ordering::SeqCst) {
            self.resumed.wait_for(&mut paused, poll);
        }
    }

    /// Wake a sender blocked in [`wait_while_paused`](Self::wait_while_paused)
    pub fn wake(&self) {
        self.resumed.notify_all();
    }
}

#[derive(Debug, Default)]
struct BannerState {
    armed: bool,
    complete: bool,
    lines: Vec<String>,
}

/// Captures the boot banner a freshly opened printer prints.
///
/// The banner ends with the first acknowledged line, after which capture
/// stops on its own and later lines reach the response log.
#[derive(Debug, Default)]
pub struct BannerGate {
    state: Mutex<BannerState>,
    received: Condvar,
}

impl BannerGate {
    /// Start capturing: lines go to the banner instead of the response log
    pub fn arm(&self) {
        let mut state = self.state.lock();
        state.armed = true;
        state.complete = false;
        state.lines.clear();
    }

    /// Stop capturing
    pub fn disarm(&self) {
        self.state.lock().armed = false;
    }

    /// Record `line` if capturing. Returns whether the line was taken.
    pub fn offer(&self, line: &str) -> bool {
        let mut state = self.state.lock();
        if !state.armed {
            return false;
        }
        state.lines.push(line.to_string());
        if marlin::contains_ack(line) {
            state.armed = false;
            state.complete = true;
            self.received.notify_all();
        }
        true
    }

    /// Wait for the banner to finish.
    ///
    /// Gives up when `alive` turns false or `timeout` elapses. Returns
    /// whether the banner completed.
    pub fn wait_for_banner(
        &self,
        alive: impl Fn() -> bool,
        poll: Duration,
        timeout: Option<Duration>,
    ) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        while !state.complete {
            if !alive() || deadline.is_some_and(|d| Instant::now() >= d) {
                return false;
            }
            self.received.wait_for(&mut state, poll);
        }
        true
    }

    /// Lines captured during the last connect
    pub fn lines(&self) -> Vec<String> {
        self.state.lock().lines.clone()
    }
}

/// Handles shared by the printer, its sender and its receiver
#[derive(Debug, Clone)]
pub struct Session {
    /// Commands to stream
    pub buffer: SendBuffer,
    /// Ack flag, cursor and numbering
    pub link: Arc<LinkGate>,
    /// Completed responses and their waiters
    pub responses: ResponseLog,
    /// Commands actually written, in transmission order
    pub sent_lines: ThreadSafeVec<String>,
    /// Temperature reports, kept out of the response log
    pub temperatures: ThreadSafeVec<TemperatureReading>,
    /// Boot banner capture
    pub banner: Arc<BannerGate>,
    /// Pause switch
    pub pause: Arc<PauseGate>,
    /// Cross-thread flags
    pub flags: Arc<SessionFlags>,
}

impl Session {
    /// Create an empty session
    pub fn new() -> Self {
        Self {
            buffer: SendBuffer::new(),
            link: Arc::new(LinkGate::new()),
            responses: ResponseLog::new(),
            sent_lines: thread_safe_vec(),
            temperatures: thread_safe_vec(),
            banner: Arc::new(BannerGate::default()),
            pause: Arc::new(PauseGate::default()),
            flags: Arc::new(SessionFlags::default()),
        }
    }

    /// A fresh session for a new connection.
    ///
    /// Only the pause switch carries over. Workers detached from the
    /// previous connection keep the old handles.
    pub fn renewed(&self) -> Self {
        Self {
            pause: self.pause.clone(),
            ..Self::new()
        }
    }

    /// Empty the buffer and logs and rewind the link
    pub fn reset(&self) {
        self.buffer.clear();
        self.link.reset();
        self.responses.clear();
        self.sent_lines.lock().clear();
        self.temperatures.lock().clear();
        self.flags.printing.store(false, Ordering::SeqCst);
    }

    /// Ask the sender to exit and wake it wherever it is blocked
    pub fn request_stop_sending(&self) {
        self.flags.stop_sending.store(true, Ordering::SeqCst);
        self.link.wake();
        self.pause.wake();
    }

    /// Ask the receiver to exit after its current read
    pub fn request_stop_receiving(&self) {
        self.flags.stop_receiving.store(true, Ordering::SeqCst);
    }

    /// Stop both workers after a fault and release anyone gated on an ack
    pub fn halt(&self) {
        self.flags.printing.store(false, Ordering::SeqCst);
        self.request_stop_sending();
        self.request_stop_receiving();
        self.link.acknowledge();
    }

    /// The last command written, if any
    pub fn last_sent(&self) -> Option<String> {
        self.sent_lines.lock().last().cloned()
    }

    /// Whether appends are being refused
    pub fn is_disconnect_pending(&self) -> bool {
        self.flags.disconnect_pending.load(Ordering::SeqCst)
    }

    /// Whether the sender has work in hand
    pub fn is_printing(&self) -> bool {
        self.flags.printing.load(Ordering::SeqCst)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_pause_gate_releases_on_resume() {
        let gate = Arc::new(PauseGate::default());
        gate.set(true);
        let waiter = {
            let gate = gate.clone();
            thread::spawn(move || {
                let stop = AtomicBool::new(false);
                gate.wait_while_paused(&stop, Duration::from_secs(5));
            })
        };
        thread::sleep(Duration::from_millis(30));
        gate.set(false);
        waiter.join().unwrap();
        assert!(!gate.is_paused());
    }

    #[test]
    fn test_banner_captured_until_ack() {
        let banner = BannerGate::default();
        assert!(!banner.offer("start\n"));

        banner.arm();
        assert!(banner.offer("start\n"));
        assert!(banner.offer("echo:SD card ok\n"));
        assert!(banner.wait_for_banner(|| true, Duration::from_millis(5), None));
        assert!(!banner.offer("ok\n"));
        assert_eq!(banner.lines(), vec!["start\n", "echo:SD card ok\n"]);
    }

    #[test]
    fn test_banner_wait_gives_up() {
        let banner = BannerGate::default();
        banner.arm();
        assert!(banner.offer("start\n"));
        assert!(!banner.wait_for_banner(|| false, Duration::from_millis(5), None));
        assert!(!banner.wait_for_banner(
            || true,
            Duration::from_millis(5),
            Some(Duration::from_millis(20))
        ));
    }

    #[test]
    fn test_renewed_session_is_independent() {
        let old = Session::new();
        old.buffer.push("G28".to_string());
        old.pause.set(true);

        let new = old.renewed();
        old.halt();
        assert!(new.buffer.is_empty());
        assert!(!new.flags.stop_receiving.load(Ordering::SeqCst));
        assert!(!new.flags.stop_sending.load(Ordering::SeqCst));
        assert!(new.pause.is_paused());
    }

    #[test]
    fn test_halt_releases_ack() {
        let session = Session::new();
        session.link.reset();
        session.halt();
        assert!(session.link.is_ack_received());
        assert!(session.flags.stop_sending.load(Ordering::SeqCst));
        assert!(session.flags.stop_receiving.load(Ordering::SeqCst));
    }
}
