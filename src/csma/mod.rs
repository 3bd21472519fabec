//! # CSMA/CD Media Access
//!
//! Simulated contention on a shared half-duplex line. Each byte of a stuffed
//! frame goes through:
//!
//! ```text
//! SENSE ──busy──► SENSE
//!   │
//!  free
//!   ▼
//! SEND ──collision──► JAM ─► BACKOFF ─► SENSE   (attempts += 1)
//!   │
//!  clear
//!   ▼
//! ADVANCE
//! ```
//!
//! Busy channels and collisions are coin flips (70% / 30% by default). After a
//! collision the sender writes the jam marker so the receiver can undo the
//! colliding byte, then sleeps a random number of backoff slots drawn from
//! `[0, 2^min(attempts, 10))`. After `max_attempts` collisions on one byte the
//! byte is abandoned and the transmitter moves on; nothing is retransmitted and
//! the caller only learns about it from the [`TransmitReport`].
//!
//! The paired receive side lives in [`receiver`].

pub mod receiver;

use std::thread::sleep;
use std::time::Duration;

use log::{debug, trace, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::{LinkError, Result};
use crate::logutil::escape_log;
use crate::transport::{StatusSink, Transport};

pub const DEFAULT_JAM_MARKER: u8 = b'j';
pub const DEFAULT_MAX_ATTEMPTS: u32 = 16;
pub const DEFAULT_BACKOFF_CAP: u32 = 10;

/// Tunables of the contention simulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsmaConfig {
    /// Chance that a carrier sense finds the channel busy.
    pub busy_probability: f64,
    /// Chance that a write on a free channel collides.
    pub collision_probability: f64,
    /// Collisions tolerated per byte before the byte is abandoned.
    pub max_attempts: u32,
    /// Backoff window stops growing at `2^backoff_cap` slots.
    pub backoff_cap: u32,
    /// Length of one backoff slot in milliseconds.
    pub slot_ms: u64,
    pub jam_marker: u8,
}

impl Default for CsmaConfig {
    fn default() -> Self {
        Self {
            busy_probability: 0.70,
            collision_probability: 0.30,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_cap: DEFAULT_BACKOFF_CAP,
            slot_ms: 1,
            jam_marker: DEFAULT_JAM_MARKER,
        }
    }
}

impl CsmaConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(0.0..1.0).contains(&self.busy_probability) {
            return Err(format!(
                "busy_probability must be in [0, 1), got {}",
                self.busy_probability
            ));
        }
        if !(0.0..=1.0).contains(&self.collision_probability) {
            return Err(format!(
                "collision_probability must be in [0, 1], got {}",
                self.collision_probability
            ));
        }
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.backoff_cap > 16 {
            return Err(format!("backoff_cap {} is above 16", self.backoff_cap));
        }
        if self.jam_marker <= 1 {
            return Err("jam_marker must not be a bit value".to_string());
        }
        Ok(())
    }
}

/// Result of a carrier sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Free,
    Busy,
}

/// Backoff slots after `attempts` collisions: uniform in `[0, 2^min(attempts, cap))`.
pub fn backoff_slots<R: Rng + ?Sized>(rng: &mut R, attempts: u32, cap: u32) -> u64 {
    let window = 1u64 << attempts.min(cap);
    rng.gen_range(0..window)
}

/// What happened while sending one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransmitReport {
    pub bytes_delivered: usize,
    pub bytes_abandoned: usize,
    pub collisions: u64,
    pub busy_senses: u64,
    /// `!` per collision, `. ` per delivered byte, in order.
    pub markers: String,
}

/// Per-byte attempt state.
#[derive(Debug, Default)]
struct Session {
    attempts: u32,
}

/// Sending half of the media-access controller. Owns its random source.
#[derive(Debug)]
pub struct MediaAccess<R> {
    config: CsmaConfig,
    rng: R,
}

impl<R: Rng> MediaAccess<R> {
    pub fn new(config: CsmaConfig, rng: R) -> Self {
        Self { config, rng }
    }

    pub fn config(&self) -> &CsmaConfig {
        &self.config
    }

    pub fn sense_channel(&mut self) -> ChannelState {
        if self.rng.gen_bool(self.config.busy_probability) {
            ChannelState::Busy
        } else {
            ChannelState::Free
        }
    }

    pub fn collision(&mut self) -> bool {
        self.rng.gen_bool(self.config.collision_probability)
    }

    /// Draw and return the backoff delay for `attempts` collisions.
    pub fn backoff_delay(&mut self, attempts: u32) -> Duration {
        let slots = backoff_slots(&mut self.rng, attempts, self.config.backoff_cap);
        Duration::from_millis(slots * self.config.slot_ms)
    }

    /// Send `stuffed` byte by byte under contention.
    ///
    /// `annotated` is the display form of the frame; the status sink receives it
    /// with the running collision markers appended.
    pub fn transmit(
        &mut self,
        transport: &dyn Transport,
        stuffed: &[u8],
        annotated: &str,
        status: Option<&dyn StatusSink>,
    ) -> Result<TransmitReport> {
        let jam = self.config.jam_marker;
        if stuffed.contains(&jam) {
            return Err(LinkError::InvalidInput(format!(
                "frame carries the jam marker {:?}",
                jam as char
            )));
        }

        let mut report = TransmitReport::default();
        for (index, &byte) in stuffed.iter().enumerate() {
            let mut session = Session::default();
            loop {
                if self.sense_channel() == ChannelState::Busy {
                    report.busy_senses += 1;
                    continue;
                }
                transport.write(&[byte])?;
                if !self.collision() {
                    report.markers.push_str(". ");
                    report.bytes_delivered += 1;
                    break;
                }

                session.attempts += 1;
                report.collisions += 1;
                report.markers.push('!');
                notify(status, annotated, &report.markers);
                transport.write(&[jam])?;
                trace!("collision on byte {} (attempt {})", index, session.attempts);

                if session.attempts >= self.config.max_attempts {
                    warn!(
                        "abandoning byte {} after {} collisions",
                        index, session.attempts
                    );
                    report.bytes_abandoned += 1;
                    break;
                }
                let delay = self.backoff_delay(session.attempts);
                trace!("random delay: {} ms", delay.as_millis());
                if !delay.is_zero() {
                    sleep(delay);
                }
            }
            notify(status, annotated, &report.markers);
        }

        debug!(
            "sent {} bytes ({} abandoned, {} collisions)",
            report.bytes_delivered, report.bytes_abandoned, report.collisions
        );
        Ok(report)
    }
}

fn notify(status: Option<&dyn StatusSink>, annotated: &str, markers: &str) {
    if let Some(sink) = status {
        sink.update(&format!("{} {}", annotated, escape_log(markers)));
    }
}

/// Write a whole stuffed frame in one go, without contention.
pub fn send_direct(transport: &dyn Transport, stuffed: &[u8]) -> Result<()> {
    transport.write(stuffed)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{LatestStatus, LoopbackTransport};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn quiet(busy: f64, collision: f64) -> CsmaConfig {
        CsmaConfig {
            busy_probability: busy,
            collision_probability: collision,
            slot_ms: 0,
            ..CsmaConfig::default()
        }
    }

    #[test]
    fn backoff_stays_inside_window() {
        let mut rng = StdRng::seed_from_u64(5);
        for attempts in 0..=16 {
            for _ in 0..500 {
                let slots = backoff_slots(&mut rng, attempts, DEFAULT_BACKOFF_CAP);
                assert!(slots < 1 << attempts.min(10));
                assert!(slots <= 1023);
            }
        }
        assert_eq!(backoff_slots(&mut rng, 0, DEFAULT_BACKOFF_CAP), 0);
    }

    #[test]
    fn backoff_duration_uses_slot_length() {
        let mut mac = MediaAccess::new(
            CsmaConfig {
                slot_ms: 1,
                ..CsmaConfig::default()
            },
            StdRng::seed_from_u64(8),
        );
        for attempts in 0..=16 {
            assert!(mac.backoff_delay(attempts) <= Duration::from_millis(1023));
        }
    }

    #[test]
    fn clear_channel_writes_bytes_in_order() {
        let wire = LoopbackTransport::default();
        let mut mac = MediaAccess::new(quiet(0.0, 0.0), StdRng::seed_from_u64(1));
        let frame = [1, 0, 0, 0, 0, 1, 1, 1, 0, 1];
        let report = mac.transmit(&wire, &frame, "f", None).unwrap();
        assert_eq!(wire.snapshot(), frame.to_vec());
        assert_eq!(report.bytes_delivered, frame.len());
        assert_eq!(report.collisions, 0);
        assert_eq!(report.markers, ". ".repeat(frame.len()));
    }

    #[test]
    fn every_collision_is_followed_by_a_jam() {
        let wire = LoopbackTransport::default();
        let mut mac = MediaAccess::new(quiet(0.7, 0.3), StdRng::seed_from_u64(99));
        let frame = [1, 0, 1, 1, 0, 0, 1, 0, 1, 1, 1, 0];
        let report = mac.transmit(&wire, &frame, "f", None).unwrap();
        let written = wire.snapshot();

        let jams = written.iter().filter(|&&b| b == b'j').count() as u64;
        assert_eq!(jams, report.collisions);
        assert_eq!(written.len() as u64, frame.len() as u64 + 2 * report.collisions);
        assert_eq!(report.markers.matches('!').count() as u64, report.collisions);

        // Undo each jammed byte and the frame reappears.
        let mut replay: Vec<u8> = Vec::new();
        for b in written {
            if b == b'j' {
                replay.pop();
            } else {
                replay.push(b);
            }
        }
        assert_eq!(replay, frame.to_vec());
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let wire = LoopbackTransport::default();
        let config = CsmaConfig {
            max_attempts: 4,
            ..quiet(0.0, 1.0)
        };
        let mut mac = MediaAccess::new(config, StdRng::seed_from_u64(3));
        let report = mac.transmit(&wire, &[1, 0], "f", None).unwrap();
        assert_eq!(report.bytes_abandoned, 2);
        assert_eq!(report.bytes_delivered, 0);
        assert_eq!(report.collisions, 8);
        let mut expected = [1, b'j'].repeat(4);
        expected.extend([0, b'j'].repeat(4));
        assert_eq!(wire.snapshot(), expected);
    }

    #[test]
    fn refuses_frames_containing_the_jam_marker() {
        let wire = LoopbackTransport::default();
        let mut mac = MediaAccess::new(quiet(0.0, 0.0), StdRng::seed_from_u64(3));
        let err = mac.transmit(&wire, &[1, b'j', 0], "f", None).unwrap_err();
        assert!(matches!(err, LinkError::InvalidInput(_)));
        assert!(wire.snapshot().is_empty());
    }

    #[test]
    fn status_sink_sees_markers() {
        let wire = LoopbackTransport::default();
        let sink = LatestStatus::default();
        let mut mac = MediaAccess::new(quiet(0.0, 0.0), StdRng::seed_from_u64(3));
        mac.transmit(&wire, &[1, 0], "1000", Some(&sink)).unwrap();
        assert_eq!(sink.get(), "1000 . . ");
    }

    #[test]
    fn closed_transport_propagates() {
        let wire = LoopbackTransport::default();
        wire.close();
        let mut mac = MediaAccess::new(quiet(0.0, 0.0), StdRng::seed_from_u64(3));
        let err = mac.transmit(&wire, &[1], "f", None).unwrap_err();
        assert!(matches!(err, LinkError::Transport(e) if e.is_closed()));
    }

    #[test]
    fn config_validation() {
        assert!(CsmaConfig::default().validate().is_ok());
        assert!(quiet(1.0, 0.3).validate().is_err());
        assert!(quiet(0.5, 1.5).validate().is_err());
        let bad_jam = CsmaConfig {
            jam_marker: 1,
            ..CsmaConfig::default()
        };
        assert!(bad_jam.validate().is_err());
    }
}
