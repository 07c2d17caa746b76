//! Worker threads
//!
//! The sender and receiver each run on a named thread. Faults and panics
//! are caught at the thread boundary and reported to the caller's exit
//! handler instead of unwinding into nothing. Joins are bounded so a hung
//! transport cannot hold up shutdown.

use printlink_core::Result;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::Span;

/// How a worker body ended
#[derive(Debug)]
pub enum Exit<E> {
    /// Returned `Ok`
    Clean,
    /// Returned an error
    Faulted(E),
    /// Panicked, with the panic message
    Panicked(String),
}

/// Run `body`, converting a panic into [`Exit::Panicked`]
pub fn guarded<E>(body: impl FnOnce() -> std::result::Result<(), E>) -> Exit<E> {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => Exit::Clean,
        Ok(Err(e)) => Exit::Faulted(e),
        Err(payload) => Exit::Panicked(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A running worker thread
#[derive(Debug)]
pub struct Activity {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl Activity {
    /// Spawn `body` on a thread called `name`, inside `span`
    pub fn spawn<F>(name: &'static str, span: Span, body: F) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            let _entered = span.enter();
            body();
        })?;
        tracing::debug!("{} started", name);
        Ok(Self { name, handle })
    }

    /// Whether the thread body is still executing
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Join, giving up after `timeout`.
    ///
    /// A thread that does not finish in time is detached. Returns whether
    /// the thread was joined.
    pub fn join_timeout(self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.handle.is_finished() {
            if Instant::now() >= deadline {
                tracing::warn!(
                    "{} did not stop within {:?}, detaching it",
                    self.name,
                    timeout
                );
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
        if self.handle.join().is_err() {
            tracing::error!("{} panicked outside its guard", self.name);
        }
        true
    }
}
