//! Serial port transport.
//!
//! One port per direction: the transmit flow writes to one end of a null-modem
//! pair and the receive flow reads from the other. Each port sits behind its own
//! mutex so reads and writes never overlap.

use std::io::{ErrorKind, Read, Write};
use std::sync::Mutex;
use std::thread::sleep;
use std::time::Duration;

use log::{debug, info, trace};
use serialport::SerialPort;

use super::{port_number, sort_by_port_number, Transport, READ_CHUNK};
use crate::errors::TransportError;
use crate::logutil::wire_preview;

pub struct SerialTransport {
    name: String,
    port: Mutex<Box<dyn SerialPort>>,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("name", &self.name)
            .finish()
    }
}

impl SerialTransport {
    /// Open `name` at 8N1 with the given read timeout.
    pub fn open(name: &str, baud_rate: u32, read_timeout: Duration) -> Result<Self, TransportError> {
        debug!("Opening serial port {} at {} baud", name, baud_rate);
        let builder = serialport::new(name, baud_rate)
            .timeout(read_timeout)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None);
        let port = builder
            .open()
            .map_err(|e| TransportError::Serial(format!("failed to open {}: {}", name, e)))?;

        // Drop anything left over from a previous session.
        let _ = port.clear(serialport::ClearBuffer::All);
        sleep(Duration::from_millis(50));

        info!("Port {} opened", name);
        Ok(Self {
            name: name.to_string(),
            port: Mutex::new(port),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source identifier derived from the port name's trailing digits.
    pub fn number(&self) -> u32 {
        port_number(&self.name).unwrap_or(0)
    }

    fn with_port<T>(
        &self,
        f: impl FnOnce(&mut Box<dyn SerialPort>) -> Result<T, TransportError>,
    ) -> Result<T, TransportError> {
        let mut guard = self
            .port
            .lock()
            .map_err(|_| TransportError::Poisoned("serial port"))?;
        f(&mut guard)
    }
}

fn map_io(e: std::io::Error) -> TransportError {
    match e.kind() {
        ErrorKind::BrokenPipe | ErrorKind::NotConnected | ErrorKind::UnexpectedEof => {
            TransportError::Closed
        }
        _ => TransportError::Io(e),
    }
}

impl Transport for SerialTransport {
    fn write(&self, bytes: &[u8]) -> Result<(), TransportError> {
        self.with_port(|port| {
            port.write_all(bytes).map_err(map_io)?;
            port.flush().map_err(map_io)
        })?;
        trace!("Written {} bytes to port {}", bytes.len(), self.name);
        Ok(())
    }

    fn read(&self) -> Result<Vec<u8>, TransportError> {
        let mut buf = [0u8; READ_CHUNK];
        let n = self.with_port(|port| match port.read(&mut buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(map_io(e)),
        })?;
        if n > 0 {
            trace!(
                "Read {} bytes from port {}: {}",
                n,
                self.name,
                wire_preview(&buf[..n])
            );
        }
        Ok(buf[..n].to_vec())
    }
}

/// Names of the serial ports on this machine, ordered by trailing number.
pub fn available_port_names() -> Result<Vec<String>, TransportError> {
    let ports = serialport::available_ports().map_err(|e| TransportError::Serial(e.to_string()))?;
    let mut names: Vec<String> = ports.into_iter().map(|p| p.port_name).collect();
    sort_by_port_number(&mut names);
    Ok(names)
}
