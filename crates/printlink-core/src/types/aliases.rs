//! Type aliases for the shared state of a printer session.
//!
//! The sender thread, the receiver thread and any number of caller threads
//! all touch the same buffers and logs. These aliases name the handful of
//! sharing shapes that state takes, so the session code reads by intent.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use printlink_core::types::*;
//!
//! // Instead of: Arc<Mutex<Vec<String>>>
//! let sent: ThreadSafeVec<String> = thread_safe_vec();
//! ```

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// A thread-safe, mutex-protected wrapper for cross-thread sharing.
///
/// Uses `parking_lot::Mutex`, which never poisons, so a panicking worker
/// cannot wedge every other thread that touches the same state.
pub type ThreadSafe<T> = Arc<Mutex<T>>;

/// A thread-safe vector, typically an append-only log.
pub type ThreadSafeVec<T> = Arc<Mutex<Vec<T>>>;

/// A thread-safe reader-writer lock wrapper.
///
/// Use when one side mostly reads by index while others append, as the
/// sender does against the send buffer.
pub type ThreadSafeRw<T> = Arc<RwLock<T>>;

/// Create a new `ThreadSafe<T>` from a value.
#[inline]
pub fn thread_safe<T>(value: T) -> ThreadSafe<T> {
    Arc::new(Mutex::new(value))
}

/// Create a new empty `ThreadSafeVec<T>`.
#[inline]
pub fn thread_safe_vec<T>() -> ThreadSafeVec<T> {
    Arc::new(Mutex::new(Vec::new()))
}

/// Create a new `ThreadSafeRw<T>` from a value.
#[inline]
pub fn thread_safe_rw<T>(value: T) -> ThreadSafeRw<T> {
    Arc::new(RwLock::new(value))
}
