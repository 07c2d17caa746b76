//! Scripted in-memory transport for driving a `Printer` in tests

#![allow(dead_code)]

use parking_lot::{Condvar, Mutex};
use printlink_communication::{ConnectionParams, PrinterOptions, Transport, TransportOpener};
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Something that happened on the wire, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Wrote(String),
    Read(String),
}

type Reply = Box<dyn FnMut(&str, usize) -> Vec<String> + Send>;

#[derive(Default)]
struct Wire {
    incoming: VecDeque<String>,
    writes: Vec<String>,
    events: Vec<Event>,
    closed: bool,
    fail_reads: bool,
    fail_writes: bool,
    hold_reads: bool,
}

/// Replies to each write with lines produced by a closure
pub struct ScriptedTransport {
    wire: Mutex<Wire>,
    changed: Condvar,
    reply: Mutex<Reply>,
}

impl ScriptedTransport {
    /// Reply with `replies(frame, write_number)` to every write.
    /// `write_number` is 1-based.
    pub fn new(reply: impl FnMut(&str, usize) -> Vec<String> + Send + 'static) -> Arc<Self> {
        Arc::new(Self {
            wire: Mutex::new(Wire::default()),
            changed: Condvar::new(),
            reply: Mutex::new(Box::new(reply)),
        })
    }

    /// Acknowledge every frame with `ok`
    pub fn acking() -> Arc<Self> {
        Self::new(|_, _| vec!["ok\n".to_string()])
    }

    /// Never reply
    pub fn silent() -> Arc<Self> {
        Self::new(|_, _| Vec::new())
    }

    /// Queue unsolicited output from the printer
    pub fn push_incoming(&self, line: &str) {
        self.wire.lock().incoming.push_back(line.to_string());
        self.changed.notify_all();
    }

    /// Make every following read fail
    pub fn fail_reads(&self) {
        self.wire.lock().fail_reads = true;
    }

    /// Make every following write fail
    pub fn fail_writes(&self) {
        self.wire.lock().fail_writes = true;
    }

    /// Block reads, ignoring the read timeout, until [`release_reads`](Self::release_reads)
    pub fn hold_reads(&self) {
        self.wire.lock().hold_reads = true;
    }

    pub fn release_reads(&self) {
        self.wire.lock().hold_reads = false;
        self.changed.notify_all();
    }

    pub fn writes(&self) -> Vec<String> {
        self.wire.lock().writes.clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.wire.lock().events.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.wire.lock().closed
    }

    /// Block until at least `count` frames were written
    pub fn wait_for_writes(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut wire = self.wire.lock();
        while wire.writes.len() < count {
            if self.changed.wait_until(&mut wire, deadline).timed_out() {
                return wire.writes.len() >= count;
            }
        }
        true
    }
}

impl Transport for ScriptedTransport {
    fn write_all(&self, data: &[u8]) -> io::Result<()> {
        let frame = String::from_utf8_lossy(data).into_owned();
        let write_number = {
            let mut wire = self.wire.lock();
            if wire.fail_writes {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "cable pulled"));
            }
            wire.writes.push(frame.clone());
            wire.events.push(Event::Wrote(frame.clone()));
            wire.writes.len()
        };
        let replies = (self.reply.lock())(&frame, write_number);

        let mut wire = self.wire.lock();
        wire.incoming.extend(replies);
        drop(wire);
        self.changed.notify_all();
        Ok(())
    }

    fn read_line(&self) -> io::Result<String> {
        let deadline = Instant::now() + READ_TIMEOUT;
        let mut wire = self.wire.lock();
        loop {
            if wire.fail_reads {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "cable pulled"));
            }
            if wire.hold_reads {
                self.changed.wait(&mut wire);
                continue;
            }
            if let Some(line) = wire.incoming.pop_front() {
                wire.events.push(Event::Read(line.clone()));
                return Ok(line);
            }
            if self.changed.wait_until(&mut wire, deadline).timed_out() {
                return Ok(String::new());
            }
        }
    }

    fn read_timeout(&self) -> Option<Duration> {
        Some(READ_TIMEOUT)
    }

    fn write_timeout(&self) -> Option<Duration> {
        None
    }

    fn name(&self) -> String {
        "scripted".to_string()
    }

    fn close(&self) -> io::Result<()> {
        self.wire.lock().closed = true;
        Ok(())
    }
}

/// Options with short polls so stop requests are noticed quickly
pub fn fast_options() -> PrinterOptions {
    PrinterOptions {
        ack_poll_interval: Duration::from_millis(50),
        idle_poll_interval: Duration::from_millis(2),
        default_join_timeout: Duration::from_secs(2),
        banner_timeout: Some(Duration::from_secs(2)),
    }
}

/// Opener that hands out `transport` as if it had just been opened
pub fn opener_for(transport: &Arc<ScriptedTransport>) -> TransportOpener {
    let transport = transport.clone();
    Box::new(
        move |_: &ConnectionParams| -> printlink_core::Result<Arc<dyn Transport>> {
            Ok(transport.clone())
        },
    )
}

/// Poll `condition` until it holds or `timeout` elapses
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while !condition() {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    true
}
