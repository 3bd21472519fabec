//! Link counters.
//! Shared between the transmit and receive flows through an `Arc`; `snapshot`
//! produces a plain copy for reports.
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct LinkStats {
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    frames_corrected: AtomicU64,
    collisions: AtomicU64,
    jams_seen: AtomicU64,
    bytes_abandoned: AtomicU64,
    buffers_discarded: AtomicU64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub frames_sent: u64,
    pub frames_received: u64,
    /// Frame bytes that got through the channel, jams excluded.
    pub bytes_sent: u64,
    /// Raw bytes read off the line, jams and noise included.
    pub bytes_received: u64,
    pub frames_corrected: u64,
    pub collisions: u64,
    pub jams_seen: u64,
    pub bytes_abandoned: u64,
    pub buffers_discarded: u64,
}

impl LinkStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_frames_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_frames_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }
    pub fn add_bytes_sent(&self, n: u64) {
        self.bytes_sent.fetch_add(n, Ordering::Relaxed);
    }
    pub fn add_bytes_received(&self, n: u64) {
        self.bytes_received.fetch_add(n, Ordering::Relaxed);
    }
    pub fn inc_frames_corrected(&self) {
        self.frames_corrected.fetch_add(1, Ordering::Relaxed);
    }
    pub fn add_collisions(&self, n: u64) {
        self.collisions.fetch_add(n, Ordering::Relaxed);
    }
    pub fn inc_jams_seen(&self) {
        self.jams_seen.fetch_add(1, Ordering::Relaxed);
    }
    pub fn add_bytes_abandoned(&self, n: u64) {
        self.bytes_abandoned.fetch_add(n, Ordering::Relaxed);
    }
    pub fn inc_buffers_discarded(&self) {
        self.buffers_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            frames_corrected: self.frames_corrected.load(Ordering::Relaxed),
            collisions: self.collisions.load(Ordering::Relaxed),
            jams_seen: self.jams_seen.load(Ordering::Relaxed),
            bytes_abandoned: self.bytes_abandoned.load(Ordering::Relaxed),
            buffers_discarded: self.buffers_discarded.load(Ordering::Relaxed),
        }
    }
}
