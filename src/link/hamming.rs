//! Hamming-style frame check sequence.
//!
//! The canonical code is an (11,7) Hamming code. The seven data units sit at the
//! non-power-of-two positions of an 11-unit codeword and the four check units
//! occupy positions 1, 2, 4 and 8:
//!
//! ```text
//! position   1  2  3  4  5  6  7  8  9 10 11
//! unit      p0 p1 d0 p2 d1 d2 d3 p3 d4 d5 d6
//! ```
//!
//! Check unit `k` is the even parity of every codeword position with bit `k`
//! set, so a single flipped unit yields its own position as the syndrome.
//!
//! The three-unit variant keeps the older layout where the data units take
//! syndrome positions 1..=7 and the check units live outside the codeword. A
//! flipped check unit therefore looks exactly like a flipped data unit at
//! position 1, 2 or 4 and gets "corrected" into the data. Double errors are
//! never detected as such by either variant.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::bits::{flip, parity_value, Unit};
use super::frame::{Data, DATA_LEN};

/// Widest check sequence any variant produces.
pub const MAX_FCS_LEN: usize = 4;

/// Check sequence storage; only the first [`FcsVariant::width`] units are used.
pub type Fcs = [Unit; MAX_FCS_LEN];

const HAMMING4_POSITIONS: [u8; DATA_LEN] = [3, 5, 6, 7, 9, 10, 11];
const HAMMING3_POSITIONS: [u8; DATA_LEN] = [1, 2, 3, 4, 5, 6, 7];

/// Which error-control code protects the data field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FcsVariant {
    /// No check units at all.
    None,
    /// Three check units, data-only syndrome space.
    Hamming3,
    /// Four check units, (11,7) Hamming code.
    #[default]
    Hamming4,
}

impl FcsVariant {
    pub fn width(self) -> usize {
        match self {
            FcsVariant::None => 0,
            FcsVariant::Hamming3 => 3,
            FcsVariant::Hamming4 => 4,
        }
    }

    /// Codeword positions of the data units, `None` for the uncoded variant.
    fn positions(self) -> Option<&'static [u8; DATA_LEN]> {
        match self {
            FcsVariant::None => None,
            FcsVariant::Hamming3 => Some(&HAMMING3_POSITIONS),
            FcsVariant::Hamming4 => Some(&HAMMING4_POSITIONS),
        }
    }

    /// Highest syndrome that names a real codeword position.
    fn codeword_len(self) -> u8 {
        match self {
            FcsVariant::None => 0,
            FcsVariant::Hamming3 => 7,
            FcsVariant::Hamming4 => 11,
        }
    }
}

impl std::fmt::Display for FcsVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FcsVariant::None => "none",
            FcsVariant::Hamming3 => "hamming3",
            FcsVariant::Hamming4 => "hamming4",
        };
        f.write_str(name)
    }
}

/// What the syndrome says about a received data/fcs pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syndrome {
    Clean,
    /// Data unit at this index (0-based) is wrong.
    Data(usize),
    /// A check unit is wrong; the data is intact.
    Parity(u8),
    /// Syndrome points past the codeword: more than one unit flipped.
    Overflow(u8),
}

/// Compute the check sequence for `data`. Pure: equal data, equal fcs.
pub fn encode(variant: FcsVariant, data: &Data) -> Fcs {
    let mut fcs = [0; MAX_FCS_LEN];
    if let Some(positions) = variant.positions() {
        for (k, slot) in fcs.iter_mut().take(variant.width()).enumerate() {
            *slot = parity(positions, data, k);
        }
    }
    fcs
}

fn parity(positions: &[u8; DATA_LEN], data: &Data, k: usize) -> Unit {
    positions
        .iter()
        .zip(data.iter())
        .filter(|(pos, _)| *pos & (1 << k) != 0)
        .fold(0, |acc, (_, &unit)| acc ^ parity_value(unit))
}

/// Recompute parity over `data` and compare it with the received `fcs`.
pub fn diagnose(variant: FcsVariant, data: &Data, fcs: &Fcs) -> Syndrome {
    let Some(positions) = variant.positions() else {
        return Syndrome::Clean;
    };
    let fresh = encode(variant, data);
    let syndrome = (0..variant.width()).fold(0u8, |acc, k| {
        acc | ((fresh[k] ^ parity_value(fcs[k])) << k)
    });
    if syndrome == 0 {
        return Syndrome::Clean;
    }
    if syndrome > variant.codeword_len() {
        return Syndrome::Overflow(syndrome);
    }
    match positions.iter().position(|&p| p == syndrome) {
        Some(index) => Syndrome::Data(index),
        None => Syndrome::Parity(syndrome),
    }
}

/// Correct at most one flipped data unit.
///
/// Returns the (possibly repaired) data and whether a data unit was flipped back.
/// A wrong check unit leaves the data untouched and reports `false`.
pub fn check_and_correct(variant: FcsVariant, data: &Data, fcs: &Fcs) -> (Data, bool) {
    let mut repaired = *data;
    match diagnose(variant, data, fcs) {
        Syndrome::Clean => (repaired, false),
        Syndrome::Data(index) => {
            let corrected = flip(&mut repaired[index]);
            if corrected {
                debug!("corrected data unit {} ({})", index, variant);
            } else {
                warn!(
                    "syndrome names data unit {} which is not a bit; left as is",
                    index
                );
            }
            (repaired, corrected)
        }
        Syndrome::Parity(position) => {
            debug!("check unit at codeword position {} was flipped", position);
            (repaired, false)
        }
        Syndrome::Overflow(syndrome) => {
            warn!(
                "syndrome {} is outside the {} codeword; multi-unit error passed through",
                syndrome, variant
            );
            (repaired, false)
        }
    }
}
