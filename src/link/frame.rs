//! Frame layout and codec.
//!
//! ```text
//! +-----------+-------------+---------+---------+-----------+
//! | flag (8)  | destination | source  | data    | fcs       |
//! | 10000111  | (4) 0000    | (4)     | (7)     | (0, 3, 4) |
//! +-----------+-------------+---------+---------+-----------+
//! ```
//!
//! Every field is a run of units, one byte per unit. The destination is always
//! zero (single logical peer); the source is the sender's port number modulo 16.

use super::bits::{number_to_units, units_to_number, units_to_text, Unit, NEWLINE};
use super::hamming::{Fcs, FcsVariant, MAX_FCS_LEN};
use crate::errors::{LinkError, Result};

pub const FLAG: [Unit; FLAG_LEN] = [1, 0, 0, 0, 0, 1, 1, 1];
pub const FLAG_LEN: usize = 8;
pub const ADDRESS_LEN: usize = 4;
pub const DATA_LEN: usize = 7;

/// Units before the check sequence: flag, destination, source, data.
pub const HEADER_AND_DATA_LEN: usize = FLAG_LEN + 2 * ADDRESS_LEN + DATA_LEN;

const SOURCE_OFFSET: usize = FLAG_LEN + ADDRESS_LEN;
const DATA_OFFSET: usize = SOURCE_OFFSET + ADDRESS_LEN;
const FCS_OFFSET: usize = DATA_OFFSET + DATA_LEN;

/// The seven data units of one frame.
pub type Data = [Unit; DATA_LEN];

/// Total unstuffed length of a frame protected by `variant`.
pub const fn frame_len(variant: FcsVariant) -> usize {
    HEADER_AND_DATA_LEN
        + match variant {
            FcsVariant::None => 0,
            FcsVariant::Hamming3 => 3,
            FcsVariant::Hamming4 => 4,
        }
}

/// One unit of transmission. Immutable once built: every change yields a new frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    variant: FcsVariant,
    destination: [Unit; ADDRESS_LEN],
    source: [Unit; ADDRESS_LEN],
    data: Data,
    fcs: Fcs,
}

impl Frame {
    /// Frame a 7-unit chunk. The check sequence starts zeroed; fill it with
    /// [`Frame::with_fcs`] once the code has been computed.
    pub fn build(data: &[Unit], source: u32, variant: FcsVariant) -> Result<Self> {
        let data: Data = data.try_into().map_err(|_| {
            LinkError::InvalidInput(format!(
                "frame data must be exactly {} units, got {}",
                DATA_LEN,
                data.len()
            ))
        })?;
        let mut source_units = [0; ADDRESS_LEN];
        source_units.copy_from_slice(&number_to_units(source % 16, ADDRESS_LEN));
        Ok(Frame {
            variant,
            destination: [0; ADDRESS_LEN],
            source: source_units,
            data,
            fcs: [0; MAX_FCS_LEN],
        })
    }

    pub fn with_fcs(self, fcs: Fcs) -> Self {
        let mut fcs = fcs;
        for unit in fcs.iter_mut().skip(self.variant.width()) {
            *unit = 0;
        }
        Frame { fcs, ..self }
    }

    pub fn with_data(self, data: Data) -> Self {
        Frame { data, ..self }
    }

    pub fn variant(&self) -> FcsVariant {
        self.variant
    }

    pub fn destination(&self) -> &[Unit; ADDRESS_LEN] {
        &self.destination
    }

    pub fn source(&self) -> &[Unit; ADDRESS_LEN] {
        &self.source
    }

    pub fn source_id(&self) -> u32 {
        units_to_number(&self.source)
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    pub fn fcs(&self) -> &[Unit] {
        &self.fcs[..self.variant.width()]
    }

    pub(crate) fn fcs_array(&self) -> &Fcs {
        &self.fcs
    }

    pub fn len(&self) -> usize {
        frame_len(self.variant)
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Data field rendered back to text.
    pub fn text(&self) -> String {
        units_to_text(&self.data)
    }

    /// Flag, destination, source, data and fcs, in that order.
    pub fn to_raw(&self) -> Vec<Unit> {
        let mut raw = Vec::with_capacity(self.len());
        raw.extend_from_slice(&FLAG);
        raw.extend_from_slice(&self.destination);
        raw.extend_from_slice(&self.source);
        raw.extend_from_slice(&self.data);
        raw.extend_from_slice(self.fcs());
        raw
    }

    /// Parse an unstuffed frame. Units past the fixed length are ignored.
    ///
    /// A newline sentinel is tolerated anywhere inside the flag.
    pub fn from_raw(units: &[Unit], variant: FcsVariant) -> Result<Self> {
        let required = frame_len(variant);
        if units.len() < required {
            return Err(LinkError::FrameTooShort {
                required,
                actual: units.len(),
            });
        }
        let flag_ok = units[..FLAG_LEN]
            .iter()
            .zip(FLAG.iter())
            .all(|(&got, &want)| got == want || got == NEWLINE);
        if !flag_ok {
            return Err(LinkError::InvalidFlag {
                found: units_to_text(&units[..FLAG_LEN]),
            });
        }

        let mut frame = Frame {
            variant,
            destination: [0; ADDRESS_LEN],
            source: [0; ADDRESS_LEN],
            data: [0; DATA_LEN],
            fcs: [0; MAX_FCS_LEN],
        };
        frame
            .destination
            .copy_from_slice(&units[FLAG_LEN..SOURCE_OFFSET]);
        frame
            .source
            .copy_from_slice(&units[SOURCE_OFFSET..DATA_OFFSET]);
        frame.data.copy_from_slice(&units[DATA_OFFSET..FCS_OFFSET]);
        frame.fcs[..variant.width()].copy_from_slice(&units[FCS_OFFSET..required]);
        Ok(frame)
    }
}
