//! Response log and pending wait table
//!
//! Completed responses are appended in the order their frames were
//! written, so response `k` (1-based) answers the `k`-th transmitted frame.
//! Callers that need a specific response register a [`ResponseSlot`] for its
//! index. Appending a response and resolving its slot happen under the same
//! lock.

use parking_lot::{Condvar, Mutex};
use printlink_core::{thread_safe, LinkFault, ThreadSafe};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Why a waiter will never get its response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitFailure {
    /// The receiver stopped normally before the response arrived
    Cancelled,
    /// The receiver died with a fault
    Fault(LinkFault),
}

/// Result of waiting on a slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The response arrived
    Ready(String),
    /// The wait bound elapsed first
    TimedOut,
    /// The response will never arrive
    Failed(WaitFailure),
}

#[derive(Debug)]
enum SlotState {
    Pending,
    Resolved(String),
    Failed(WaitFailure),
}

/// Single-assignment cell a caller blocks on until its response arrives
#[derive(Debug)]
pub struct ResponseSlot {
    state: Mutex<SlotState>,
    settled: Condvar,
}

impl ResponseSlot {
    fn pending() -> Self {
        Self {
            state: Mutex::new(SlotState::Pending),
            settled: Condvar::new(),
        }
    }

    fn resolved(response: String) -> Self {
        Self {
            state: Mutex::new(SlotState::Resolved(response)),
            settled: Condvar::new(),
        }
    }

    fn failed(failure: WaitFailure) -> Self {
        Self {
            state: Mutex::new(SlotState::Failed(failure)),
            settled: Condvar::new(),
        }
    }

    /// Set the response. Ignored if the slot already settled.
    fn resolve(&self, response: String) -> bool {
        let mut state = self.state.lock();
        if !matches!(*state, SlotState::Pending) {
            return false;
        }
        *state = SlotState::Resolved(response);
        self.settled.notify_all();
        true
    }

    /// Fail the slot. Ignored if the slot already settled.
    fn fail(&self, failure: WaitFailure) -> bool {
        let mut state = self.state.lock();
        if !matches!(*state, SlotState::Pending) {
            return false;
        }
        *state = SlotState::Failed(failure);
        self.settled.notify_all();
        true
    }

    /// Whether the slot holds a response or a failure
    pub fn is_settled(&self) -> bool {
        !matches!(*self.state.lock(), SlotState::Pending)
    }

    /// Block until the slot settles or `timeout` elapses.
    ///
    /// `None` waits forever.
    pub fn wait(&self, timeout: Option<Duration>) -> WaitOutcome {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        loop {
            match &*state {
                SlotState::Resolved(response) => return WaitOutcome::Ready(response.clone()),
                SlotState::Failed(failure) => return WaitOutcome::Failed(failure.clone()),
                SlotState::Pending => {}
            }
            match deadline {
                Some(deadline) => {
                    if self.settled.wait_until(&mut state, deadline).timed_out()
                        && matches!(*state, SlotState::Pending)
                    {
                        return WaitOutcome::TimedOut;
                    }
                }
                None => self.settled.wait(&mut state),
            }
        }
    }
}

#[derive(Debug, Default)]
struct LogInner {
    responses: Vec<String>,
    pending: HashMap<usize, Arc<ResponseSlot>>,
    closed: Option<WaitFailure>,
}

/// Ordered log of completed responses plus the waiters for future ones
#[derive(Debug, Clone)]
pub struct ResponseLog {
    inner: ThreadSafe<LogInner>,
}

impl ResponseLog {
    /// Create an empty, open log
    pub fn new() -> Self {
        Self {
            inner: thread_safe(LogInner::default()),
        }
    }

    /// Append a completed response and resolve its waiter.
    ///
    /// Returns the 1-based index of the response.
    pub fn complete(&self, response: String) -> usize {
        let mut inner = self.inner.lock();
        inner.responses.push(response);
        let index = inner.responses.len();
        if let Some(slot) = inner.pending.remove(&index) {
            slot.resolve(inner.responses[index - 1].clone());
        }
        index
    }

    /// Slot for the response at 1-based `index`.
    ///
    /// Already-received responses come back pre-resolved. Once the log is
    /// closed, new slots come back pre-failed with the closing reason.
    pub fn register(&self, index: usize) -> Arc<ResponseSlot> {
        let mut inner = self.inner.lock();
        if index >= 1 && index <= inner.responses.len() {
            return Arc::new(ResponseSlot::resolved(inner.responses[index - 1].clone()));
        }
        if let Some(failure) = &inner.closed {
            return Arc::new(ResponseSlot::failed(failure.clone()));
        }
        inner
            .pending
            .entry(index)
            .or_insert_with(|| Arc::new(ResponseSlot::pending()))
            .clone()
    }

    /// Accept waiters again after a receiver (re)start
    pub fn open(&self) {
        self.inner.lock().closed = None;
    }

    /// Fail every pending waiter and refuse new ones until reopened.
    ///
    /// The first closing reason sticks, so a fault recorded by one worker
    /// is not replaced by the other worker's clean exit.
    pub fn close(&self, failure: WaitFailure) {
        let mut inner = self.inner.lock();
        let failure = inner.closed.get_or_insert(failure).clone();
        for (_, slot) in inner.pending.drain() {
            slot.fail(failure.clone());
        }
    }

    /// Number of completed responses
    pub fn len(&self) -> usize {
        self.inner.lock().responses.len()
    }

    /// Whether no response has completed
    pub fn is_empty(&self) -> bool {
        self.inner.lock().responses.is_empty()
    }

    /// Number of registered, unsettled waiters
    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Copy of every completed response
    pub fn snapshot(&self) -> Vec<String> {
        self.inner.lock().responses.clone()
    }

    /// Drop all responses, cancel waiters and reopen
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        for (_, slot) in inner.pending.drain() {
            slot.fail(WaitFailure::Cancelled);
        }
        inner.responses.clear();
        inner.closed = None;
    }
}

impl Default for ResponseLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use printlink_core::ProtocolError;
    use std::thread;

    #[test]
    fn test_complete_resolves_waiter() {
        let log = ResponseLog::new();
        let slot = log.register(1);
        assert!(!slot.is_settled());

        let waiter = {
            let slot = slot.clone();
            thread::spawn(move || slot.wait(None))
        };
        assert_eq!(log.complete("ok\n".to_string()), 1);

        assert_eq!(waiter.join().unwrap(), WaitOutcome::Ready("ok\n".to_string()));
        assert_eq!(log.pending_count(), 0);
    }

    #[test]
    fn test_register_after_arrival_is_resolved() {
        let log = ResponseLog::new();
        log.complete("ok T:20.0\n".to_string());
        log.complete("ok\n".to_string());

        let slot = log.register(1);
        assert_eq!(slot.wait(Some(Duration::ZERO)), WaitOutcome::Ready("ok T:20.0\n".to_string()));
        assert_eq!(log.pending_count(), 0);
    }

    #[test]
    fn test_timeout_keeps_entry_until_resolved() {
        let log = ResponseLog::new();
        let slot = log.register(1);
        assert_eq!(slot.wait(Some(Duration::from_millis(20))), WaitOutcome::TimedOut);
        assert_eq!(log.pending_count(), 1);

        log.complete("ok\n".to_string());
        assert_eq!(log.pending_count(), 0);
        assert_eq!(slot.wait(Some(Duration::ZERO)), WaitOutcome::Ready("ok\n".to_string()));
    }

    #[test]
    fn test_close_fails_pending_and_future_waiters() {
        let log = ResponseLog::new();
        let slot = log.register(2);
        let fault: LinkFault = ProtocolError::OutOfSync {
            responses: 2,
            frames_written: 1,
        }
        .into();
        log.close(WaitFailure::Fault(fault.clone()));

        assert_eq!(slot.wait(None), WaitOutcome::Failed(WaitFailure::Fault(fault.clone())));
        let late = log.register(3);
        assert_eq!(late.wait(None), WaitOutcome::Failed(WaitFailure::Fault(fault)));

        log.open();
        assert!(!log.register(3).is_settled());
    }

    #[test]
    fn test_first_close_reason_sticks() {
        let log = ResponseLog::new();
        let fault: LinkFault = ProtocolError::EmptyFrame.into();
        log.close(WaitFailure::Fault(fault.clone()));
        log.close(WaitFailure::Cancelled);

        assert_eq!(
            log.register(1).wait(None),
            WaitOutcome::Failed(WaitFailure::Fault(fault))
        );
    }

    #[test]
    fn test_clear_cancels_waiters() {
        let log = ResponseLog::new();
        log.complete("ok\n".to_string());
        let slot = log.register(5);
        log.clear();

        assert!(log.is_empty());
        assert_eq!(slot.wait(None), WaitOutcome::Failed(WaitFailure::Cancelled));
    }
}
