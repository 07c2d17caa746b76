//! # printlink Communication
//!
//! Streams G-code to Marlin-style printers over a serial link.
//! Every command is framed with a line number and checksum, and only one
//! frame is ever in flight: the next frame goes out once the printer has
//! acknowledged the previous one. Resend requests roll the stream back.

pub mod communication;
pub mod firmware;

pub use communication::{
    frame::{checksum, prepare_line, Frame, LineNumbering},
    printer::{Printer, PrinterOptions, SessionState, TransportOpener},
    response_log::{ResponseLog, ResponseSlot, WaitFailure, WaitOutcome},
    send_buffer::SendBuffer,
    serial::{list_ports, SerialPortInfo, SerialTransport},
    session::TemperatureReading,
    ConnectionParams, SerialParity, Transport,
};

pub use firmware::marlin::{self, LineKind};
