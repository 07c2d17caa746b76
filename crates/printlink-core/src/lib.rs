//! # printlink Core
//!
//! Core types shared by every printlink crate: the layered error taxonomy
//! and the thread-safe sharing aliases used by the printer session.

pub mod error;
pub mod types;

pub use error::{ConnectionError, Error, LinkFault, ProtocolError, Result, SessionError};

pub use types::{thread_safe, thread_safe_rw, thread_safe_vec, ThreadSafe, ThreadSafeRw, ThreadSafeVec};
