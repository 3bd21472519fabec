//! # Transport Boundary
//!
//! The link layer never owns a device. It talks to a [`Transport`] that can
//! write bytes and read whatever has arrived, and optionally reports progress to
//! a [`StatusSink`].
//!
//! Implementations must serialise their own operations: at most one read or
//! write is in flight at a time, which is what lets the media-access controller
//! treat "write, observe collision, jam" as one ordered sequence even while a
//! receive flow polls the same transport from another thread.
//!
//! - [`LoopbackTransport`] - in-memory wire used by tests and `simulate`
//! - [`serial::SerialTransport`] - a real serial port (feature `serial`)

#[cfg(feature = "serial")]
pub mod serial;

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use log::trace;

use crate::errors::TransportError;
use crate::logutil::wire_preview;

/// Largest chunk a single read hands back.
pub const READ_CHUNK: usize = 256;

/// Byte-level transport capability consumed by the link layer.
pub trait Transport: Send + Sync {
    fn write(&self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Return the bytes available right now, possibly none.
    /// [`TransportError::Closed`] marks the end of the stream.
    fn read(&self) -> Result<Vec<u8>, TransportError>;
}

/// Observer for formatted frame/status text. Purely for display.
pub trait StatusSink: Send + Sync {
    fn update(&self, status: &str);
}

/// Sink that forwards status lines to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn update(&self, status: &str) {
        log::debug!("status: {}", status);
    }
}

/// Sink that remembers the most recent status line.
#[derive(Debug, Default)]
pub struct LatestStatus {
    latest: Mutex<String>,
}

impl LatestStatus {
    pub fn get(&self) -> String {
        self.latest
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl StatusSink for LatestStatus {
    fn update(&self, status: &str) {
        if let Ok(mut guard) = self.latest.lock() {
            guard.clear();
            guard.push_str(status);
        }
    }
}

#[derive(Debug, Default)]
struct Wire {
    bytes: VecDeque<u8>,
    closed: bool,
}

/// In-memory wire: whatever is written can be read back, in order.
///
/// Reads wait up to `read_timeout` for data so a polling receiver does not spin.
/// Once [`LoopbackTransport::close`] is called, buffered bytes are still
/// delivered and then reads report [`TransportError::Closed`].
#[derive(Debug)]
pub struct LoopbackTransport {
    wire: Mutex<Wire>,
    arrived: Condvar,
    read_timeout: Duration,
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new(Duration::from_millis(50))
    }
}

impl LoopbackTransport {
    pub fn new(read_timeout: Duration) -> Self {
        Self {
            wire: Mutex::new(Wire::default()),
            arrived: Condvar::new(),
            read_timeout,
        }
    }

    pub fn close(&self) {
        if let Ok(mut wire) = self.wire.lock() {
            wire.closed = true;
        }
        self.arrived.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().map(|wire| wire.closed).unwrap_or(true)
    }

    /// Everything currently buffered, without consuming it.
    pub fn snapshot(&self) -> Vec<u8> {
        self.lock()
            .map(|wire| wire.bytes.iter().copied().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Wire>, TransportError> {
        self.wire
            .lock()
            .map_err(|_| TransportError::Poisoned("loopback wire"))
    }
}

impl Transport for LoopbackTransport {
    fn write(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut wire = self.lock()?;
        if wire.closed {
            return Err(TransportError::Closed);
        }
        wire.bytes.extend(bytes.iter().copied());
        trace!("loopback wrote {} bytes: {}", bytes.len(), wire_preview(bytes));
        drop(wire);
        self.arrived.notify_all();
        Ok(())
    }

    fn read(&self) -> Result<Vec<u8>, TransportError> {
        let mut wire = self.lock()?;
        if wire.bytes.is_empty() && !wire.closed {
            wire = self
                .arrived
                .wait_timeout_while(wire, self.read_timeout, |w| {
                    w.bytes.is_empty() && !w.closed
                })
                .map_err(|_| TransportError::Poisoned("loopback wire"))?
                .0;
        }
        if wire.bytes.is_empty() {
            return if wire.closed {
                Err(TransportError::Closed)
            } else {
                Ok(Vec::new())
            };
        }
        let take = wire.bytes.len().min(READ_CHUNK);
        Ok(wire.bytes.drain(..take).collect())
    }
}

/// Trailing decimal number of a port name (`/dev/ttyS3` -> 3, `COM12` -> 12).
pub fn port_number(name: &str) -> Option<u32> {
    let digits = name
        .bytes()
        .rev()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits == 0 {
        return None;
    }
    name[name.len() - digits..].parse().ok()
}

/// Order port names by their trailing number; names without one sort first.
pub fn sort_by_port_number(names: &mut [String]) {
    names.sort_by_key(|name| (port_number(name).unwrap_or(0), name.clone()));
}
