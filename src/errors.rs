use thiserror::Error;

/// Errors raised by the transport collaborator.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The port was closed underneath us. The link layer treats this as a
    /// benign end of stream, never as a failure.
    #[error("port has been closed")]
    Closed,

    /// Wrapper around IO errors from the underlying device.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors reported by the serial driver while opening or configuring a port.
    #[error("serial error: {0}")]
    Serial(String),

    /// A thread panicked while holding the named lock.
    #[error("{0} lock poisoned")]
    Poisoned(&'static str),
}

impl TransportError {
    pub fn is_closed(&self) -> bool {
        matches!(self, TransportError::Closed)
    }
}

/// Errors that can arise while framing, stuffing or transmitting link frames.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Caller handed over a malformed chunk (wrong length, reserved byte).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The first eight units of a frame are not the flag pattern.
    #[error("invalid flag: {found}")]
    InvalidFlag { found: String },

    /// Fewer units than the fixed frame length were supplied.
    #[error("frame too short: need {required} units, got {actual}")]
    FrameTooShort { required: usize, actual: usize },

    /// A stuffed stream could not be turned back into a frame.
    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    /// Transport failure, propagated to the caller.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl LinkError {
    /// Malformed wire data the receiver recovers from by resynchronising on the
    /// next flag.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LinkError::InvalidFlag { .. }
                | LinkError::FrameTooShort { .. }
                | LinkError::InvalidPacket(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, LinkError>;
