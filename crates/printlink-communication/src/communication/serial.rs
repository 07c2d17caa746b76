//! Serial port transport
//!
//! Opens the printer's USB/RS-232 serial console with the `serialport`
//! crate. The port is cloned into independent reader and writer handles so
//! the receiver's blocking reads never delay the sender's writes.
//!
//! Supports:
//! - Port enumeration filtered to likely printer devices
//! - Baud rate, data bits, stop bits, parity and flow control
//! - Line reads bounded by the configured read timeout

use crate::communication::{ConnectionParams, SerialParity, Transport};
use parking_lot::Mutex;
use printlink_core::{ConnectionError, Error, Result};
use std::io::{self, BufRead, BufReader, Write};
use std::time::Duration;

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyACM0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB Arduino Mega 2560")
    pub description: String,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,

    /// USB vendor ID if applicable
    pub vid: Option<u16>,

    /// USB product ID if applicable
    pub pid: Option<u16>,
}

/// List serial ports that look like printer controllers
///
/// Keeps:
/// - Windows: COM* (e.g., COM1, COM3)
/// - Linux: /dev/ttyUSB*, /dev/ttyACM*
/// - macOS: /dev/cu.usbserial-*, /dev/cu.usbmodem*, /dev/tty.usbmodem*
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        ConnectionError::SerialError {
            reason: format!("Failed to enumerate ports: {}", e),
        }
    })?;

    Ok(ports
        .iter()
        .filter(|port| is_printer_port(&port.port_name))
        .map(|port| {
            let mut info = SerialPortInfo {
                port_name: port.port_name.clone(),
                description: port_description(port),
                manufacturer: None,
                vid: None,
                pid: None,
            };
            if let serialport::SerialPortType::UsbPort(usb) = &port.port_type {
                info.manufacturer = usb.manufacturer.clone();
                info.vid = Some(usb.vid);
                info.pid = Some(usb.pid);
            }
            info
        })
        .collect())
}

fn is_printer_port(port_name: &str) -> bool {
    if let Some(number) = port_name.strip_prefix("COM") {
        return !number.is_empty() && number.chars().all(|c| c.is_ascii_digit());
    }

    port_name.starts_with("/dev/ttyUSB")
        || port_name.starts_with("/dev/ttyACM")
        || port_name.starts_with("/dev/cu.usbserial")
        || port_name.starts_with("/dev/cu.usbmodem")
        || port_name.starts_with("/dev/tty.usbmodem")
}

fn port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb) => format!(
            "USB {} {}",
            usb.manufacturer.as_deref().unwrap_or("Device"),
            usb.product.as_deref().unwrap_or("Serial Port")
        ),
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

fn to_serialport_parity(parity: SerialParity) -> serialport::Parity {
    match parity {
        SerialParity::None => serialport::Parity::None,
        SerialParity::Even => serialport::Parity::Even,
        SerialParity::Odd => serialport::Parity::Odd,
    }
}

fn invalid(reason: String) -> Error {
    ConnectionError::InvalidParameters { reason }.into()
}

type PortHandle = Box<dyn serialport::SerialPort>;

/// [`Transport`] over a real serial port
pub struct SerialTransport {
    port_name: String,
    reader: Mutex<Option<BufReader<PortHandle>>>,
    writer: Mutex<Option<PortHandle>>,
    read_timeout: Duration,
    write_timeout: Option<Duration>,
}

impl SerialTransport {
    /// Open a serial port with the given parameters
    pub fn open(params: &ConnectionParams) -> Result<Self> {
        let data_bits = match params.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            8 => serialport::DataBits::Eight,
            other => return Err(invalid(format!("Invalid data bits: {}", other))),
        };
        let stop_bits = match params.stop_bits {
            1 => serialport::StopBits::One,
            2 => serialport::StopBits::Two,
            other => return Err(invalid(format!("Invalid stop bits: {}", other))),
        };

        let failed = |e: serialport::Error| {
            tracing::warn!("Failed to open serial port {}: {}", params.port, e);
            Error::from(ConnectionError::FailedToOpen {
                port: params.port.clone(),
                reason: e.to_string(),
            })
        };

        let reader = serialport::new(&params.port, params.baud_rate)
            .timeout(params.read_timeout)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(to_serialport_parity(params.parity))
            .flow_control(if params.flow_control {
                serialport::FlowControl::Hardware
            } else {
                serialport::FlowControl::None
            })
            .open()
            .map_err(failed)?;
        let mut writer = reader.try_clone().map_err(failed)?;
        if let Some(timeout) = params.write_timeout {
            writer.set_timeout(timeout).map_err(failed)?;
        }

        tracing::debug!("Opened {} at {} baud", params.port, params.baud_rate);
        Ok(Self {
            port_name: params.port.clone(),
            reader: Mutex::new(Some(BufReader::new(reader))),
            writer: Mutex::new(Some(writer)),
            read_timeout: params.read_timeout,
            write_timeout: params.write_timeout,
        })
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "serial port closed")
}

impl Transport for SerialTransport {
    fn write_all(&self, data: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock();
        let port = writer.as_mut().ok_or_else(closed)?;
        port.write_all(data)?;
        port.flush()
    }

    fn read_line(&self) -> io::Result<String> {
        let mut reader = self.reader.lock();
        let port = reader.as_mut().ok_or_else(closed)?;

        let mut buf = Vec::new();
        match port.read_until(b'\n', &mut buf) {
            Ok(0) => return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "serial port hung up")),
            Ok(_) => {}
            // Whatever arrived before the timeout is still in `buf`.
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
            Err(e) => return Err(e),
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn read_timeout(&self) -> Option<Duration> {
        Some(self.read_timeout)
    }

    fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout
    }

    fn name(&self) -> String {
        self.port_name.clone()
    }

    fn close(&self) -> io::Result<()> {
        self.writer.lock().take();
        self.reader.lock().take();
        Ok(())
    }
}
