//! Noisy-line simulation: occasionally flips one data unit.
//!
//! Applied after the check sequence is computed and before stuffing, so the
//! receiver's error correction has something to do.

use log::debug;
use rand::Rng;

use super::bits::flip;
use super::frame::{Data, DATA_LEN};

pub const DEFAULT_FLIP_PROBABILITY: f64 = 0.30;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distortion {
    probability: f64,
}

impl Default for Distortion {
    fn default() -> Self {
        Self {
            probability: DEFAULT_FLIP_PROBABILITY,
        }
    }
}

impl Distortion {
    /// `probability` is clamped into `[0, 1]`.
    pub fn new(probability: f64) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
        }
    }

    /// A line that never flips anything.
    pub fn clean() -> Self {
        Self::new(0.0)
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    /// With the configured probability flip one uniformly chosen data unit.
    /// Units that are not bits (the newline sentinel, letters) are never altered.
    pub fn maybe_flip<R: Rng + ?Sized>(&self, rng: &mut R, data: &Data) -> Data {
        let mut out = *data;
        if rng.gen_bool(self.probability) {
            let position = rng.gen_range(0..DATA_LEN);
            if flip(&mut out[position]) {
                debug!("line noise flipped data unit {}", position);
            }
        }
        out
    }
}
