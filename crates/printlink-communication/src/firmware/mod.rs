//! Firmware dialects
//!
//! Only the Marlin family is spoken: `ok` acknowledgments, `Resend:`
//! recovery and `N<line> ...*<checksum>` framing.

pub mod marlin;
