//! Receive side of the link: reassembles frames from a byte stream that may
//! carry jam markers, leading noise and truncated frames.
//!
//! Bytes accumulate in a [`BytesMut`]. When the link runs under contention a
//! jam marker deletes the byte received just before it; without a jam marker
//! every byte is data. Whenever the buffer changes, the assembler
//! - drops everything in front of the first flag,
//! - drops a frame that a later flag cuts short (bytes were lost upstream),
//! - releases a frame once its stuffed length has arrived and it is settled.
//!
//! A frame counts as settled when the line went idle or when enough bytes
//! follow it that any flag overlapping its tail is visible. Until then a late
//! jam could still rewrite its last byte.

use std::sync::Arc;

use bytes::{Buf, BytesMut};
use log::{debug, trace, warn};

use crate::errors::Result;
use crate::link::frame::{frame_len, FLAG, FLAG_LEN};
use crate::link::hamming::FcsVariant;
use crate::link::stuffing::{annotate, stuffed_frame_len};
use crate::link::{decode_frame, DecodedFrame};
use crate::logutil::{escape_log, wire_preview};
use crate::metrics::LinkStats;
use crate::transport::{StatusSink, Transport};

const PREFIX_LEN: usize = FLAG_LEN - 1;

/// A frame pulled off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFrame {
    pub annotated: String,
    pub decoded: DecodedFrame,
}

#[derive(Debug)]
pub struct FrameAssembler {
    buffer: BytesMut,
    variant: FcsVariant,
    jam_marker: Option<u8>,
    max_buffer: usize,
    stats: Arc<LinkStats>,
}

impl FrameAssembler {
    /// `jam_marker` is `None` on a line without contention.
    pub fn new(variant: FcsVariant, jam_marker: Option<u8>, stats: Arc<LinkStats>) -> Self {
        let frame = frame_len(variant);
        Self {
            buffer: BytesMut::with_capacity(frame * 2),
            variant,
            jam_marker,
            // A stuffed frame gains at most one guard per seven units.
            max_buffer: 2 * (frame + frame / PREFIX_LEN) + FLAG_LEN,
            stats,
        }
    }

    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Feed freshly read bytes and return every frame that is now settled.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<ReceivedFrame> {
        self.stats.add_bytes_received(bytes.len() as u64);
        for &byte in bytes {
            if Some(byte) == self.jam_marker {
                self.stats.inc_jams_seen();
                let len = self.buffer.len();
                if len > 0 {
                    self.buffer.truncate(len - 1);
                }
                trace!("jam, buffer back to {} bytes", self.buffer.len());
            } else {
                self.buffer.extend_from_slice(&[byte]);
            }
        }
        self.extract(false)
    }

    /// The line went quiet: release a frame that ends exactly at the buffer end.
    pub fn flush_idle(&mut self) -> Vec<ReceivedFrame> {
        self.extract(true)
    }

    fn extract(&mut self, idle: bool) -> Vec<ReceivedFrame> {
        let mut frames = Vec::new();
        loop {
            match find_flag(&self.buffer, 0) {
                None => {
                    // Keep just enough for a flag that is still arriving.
                    let len = self.buffer.len();
                    if len > PREFIX_LEN {
                        self.buffer.advance(len - PREFIX_LEN);
                    }
                    break;
                }
                Some(0) => {}
                Some(start) => {
                    trace!("skipping {} bytes before flag", start);
                    self.buffer.advance(start);
                }
            }

            let complete = stuffed_frame_len(&self.buffer, self.variant);
            if let Some(next) = self.superseding_flag(complete) {
                warn!(
                    "dropping truncated frame: {}",
                    wire_preview(&self.buffer[..next])
                );
                self.stats.inc_buffers_discarded();
                self.buffer.advance(next);
                continue;
            }

            match complete {
                Some(n)
                    if (idle && n <= self.buffer.len())
                        || self.buffer.len() >= n + PREFIX_LEN =>
                {
                    let stuffed = self.buffer.split_to(n);
                    if let Some(frame) = self.decode(&stuffed) {
                        frames.push(frame);
                    }
                }
                _ => {
                    if self.buffer.len() > self.max_buffer {
                        warn!(
                            "discarding overlong buffer of {} bytes",
                            self.buffer.len()
                        );
                        self.stats.inc_buffers_discarded();
                        self.buffer.clear();
                    }
                    break;
                }
            }
        }
        frames
    }

    /// Start of a later flag proving the frame at offset 0 lost bytes.
    ///
    /// A frame whose last seven units spell the flag prefix forms a flag with
    /// the first unit of the next frame; that one overlap is not a cut.
    fn superseding_flag(&self, complete: Option<usize>) -> Option<usize> {
        let horizon = complete.unwrap_or(self.buffer.len());
        let mut from = 1;
        while let Some(q) = find_flag(&self.buffer, from) {
            if q >= horizon {
                return None;
            }
            if complete.map_or(true, |n| q + PREFIX_LEN != n) {
                return Some(q);
            }
            from = q + 1;
        }
        None
    }

    fn decode(&self, stuffed: &[u8]) -> Option<ReceivedFrame> {
        match decode_frame(stuffed, self.variant) {
            Ok(decoded) => {
                self.stats.inc_frames_received();
                if decoded.corrected {
                    self.stats.inc_frames_corrected();
                }
                let annotated = annotate(stuffed, self.variant);
                debug!(
                    "received frame from {}: {}",
                    decoded.source,
                    escape_log(&decoded.text)
                );
                Some(ReceivedFrame { annotated, decoded })
            }
            Err(e) => {
                warn!("dropping frame {}: {}", wire_preview(stuffed), e);
                self.stats.inc_buffers_discarded();
                None
            }
        }
    }
}

fn find_flag(buffer: &[u8], from: usize) -> Option<usize> {
    buffer
        .get(from..)?
        .windows(FLAG_LEN)
        .position(|w| w == FLAG)
        .map(|p| p + from)
}

/// Result of one poll of the transport.
#[derive(Debug, Default)]
pub struct Received {
    pub frames: Vec<ReceivedFrame>,
    /// The transport reported end of stream; nothing more will arrive.
    pub closed: bool,
}

/// Polling receive flow: reads the transport, feeds the assembler and reports
/// each recovered frame to the status sink.
#[derive(Debug)]
pub struct Receiver {
    assembler: FrameAssembler,
}

impl Receiver {
    pub fn new(assembler: FrameAssembler) -> Self {
        Self { assembler }
    }

    pub fn assembler(&self) -> &FrameAssembler {
        &self.assembler
    }

    /// Perform one read. An empty read means the line is idle.
    pub fn poll(
        &mut self,
        transport: &dyn Transport,
        status: Option<&dyn StatusSink>,
    ) -> Result<Received> {
        let mut received = Received::default();
        match transport.read() {
            Ok(bytes) if bytes.is_empty() => received.frames = self.assembler.flush_idle(),
            Ok(bytes) => {
                trace!("read {} bytes: {}", bytes.len(), wire_preview(&bytes));
                received.frames = self.assembler.push(&bytes);
            }
            Err(e) if e.is_closed() => {
                debug!("transport closed");
                received.frames = self.assembler.flush_idle();
                received.closed = true;
            }
            Err(e) => return Err(e.into()),
        }
        if let Some(sink) = status {
            for frame in &received.frames {
                sink.update(&format!(
                    "{} {}",
                    frame.annotated,
                    escape_log(&frame.decoded.text)
                ));
            }
        }
        Ok(received)
    }

    /// Poll until the transport closes, handing each frame to `on_frame`.
    pub fn run(
        &mut self,
        transport: &dyn Transport,
        status: Option<&dyn StatusSink>,
        mut on_frame: impl FnMut(&ReceivedFrame),
    ) -> Result<()> {
        loop {
            let received = self.poll(transport, status)?;
            received.frames.iter().for_each(&mut on_frame);
            if received.closed {
                return Ok(());
            }
        }
    }
}
