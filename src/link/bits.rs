//! Bit-per-byte helpers.
//!
//! Frames are handled as arrays of *units*: one byte per transmitted symbol.
//! A unit is `0` or `1` for bits, the newline sentinel for a literal line break
//! typed by the user, or the ASCII value of any other character. Keeping stuffed
//! guard bits and data bits in one addressable array is what lets the stuffing
//! engine and the Hamming code work on the same buffer.

use crate::errors::{LinkError, Result};

/// One transmitted symbol.
pub type Unit = u8;

/// Literal newline carried through the whole pipeline untouched.
pub const NEWLINE: Unit = b'\n';

#[inline]
pub fn is_bit(unit: Unit) -> bool {
    unit <= 1
}

/// Value a unit contributes to parity arithmetic: non-bits count as zero.
#[inline]
pub fn parity_value(unit: Unit) -> Unit {
    if is_bit(unit) {
        unit
    } else {
        0
    }
}

/// Flip a bit unit in place. Anything that is not a bit is left alone.
/// Returns whether a flip happened.
#[inline]
pub fn flip(unit: &mut Unit) -> bool {
    match *unit {
        0 => {
            *unit = 1;
            true
        }
        1 => {
            *unit = 0;
            true
        }
        _ => false,
    }
}

/// Convert typed text into units.
///
/// `'0'` and `'1'` become bits, every other ASCII character is stored as its
/// byte value. NUL and SOH are rejected because they would be read back as bits.
pub fn text_to_units(text: &str) -> Result<Vec<Unit>> {
    text.chars()
        .map(|ch| match ch {
            '0' => Ok(0),
            '1' => Ok(1),
            '\0' | '\u{1}' => Err(LinkError::InvalidInput(format!(
                "character {:?} collides with a bit value",
                ch
            ))),
            c if c.is_ascii() => Ok(c as u8),
            c => Err(LinkError::InvalidInput(format!(
                "character {:?} is not ASCII",
                c
            ))),
        })
        .collect()
}

/// Inverse of [`text_to_units`].
pub fn units_to_text(units: &[Unit]) -> String {
    units
        .iter()
        .map(|&u| match u {
            0 => '0',
            1 => '1',
            other => other as char,
        })
        .collect()
}

/// Big-endian bit pattern of `value`, `width` units wide. Higher bits are dropped.
pub fn number_to_units(value: u32, width: usize) -> Vec<Unit> {
    (0..width)
        .rev()
        .map(|shift| ((value >> shift) & 1) as Unit)
        .collect()
}

/// Read a big-endian bit pattern back into a number. Non-bit units read as 0.
pub fn units_to_number(units: &[Unit]) -> u32 {
    units
        .iter()
        .fold(0, |acc, &u| (acc << 1) | parity_value(u) as u32)
}

/// Parse a textual bit sequence such as `"10000111"`.
pub fn parse_bits(bits: &str) -> Result<Vec<Unit>> {
    bits.chars()
        .map(|ch| match ch {
            '0' => Ok(0),
            '1' => Ok(1),
            other => Err(LinkError::InvalidInput(format!(
                "{:?} is not a bit",
                other
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_round_trips_through_units() {
        let text = "10a1\nZ0";
        let units = text_to_units(text).unwrap();
        assert_eq!(units, vec![1, 0, b'a', 1, NEWLINE, b'Z', 0]);
        assert_eq!(units_to_text(&units), text);
    }

    #[test]
    fn rejects_ambiguous_and_non_ascii() {
        assert!(text_to_units("\u{1}").is_err());
        assert!(text_to_units("é").is_err());
    }

    #[test]
    fn numbers_are_msb_first() {
        assert_eq!(number_to_units(3, 4), vec![0, 0, 1, 1]);
        assert_eq!(number_to_units(15, 4), vec![1, 1, 1, 1]);
        assert_eq!(units_to_number(&[1, 0, 1, 0]), 10);
    }

    #[test]
    fn flip_ignores_sentinel() {
        let mut u = NEWLINE;
        assert!(!flip(&mut u));
        assert_eq!(u, NEWLINE);
        let mut b = 1;
        assert!(flip(&mut b));
        assert_eq!(b, 0);
    }

    #[test]
    fn parse_bits_rejects_garbage() {
        assert_eq!(parse_bits("1001").unwrap(), vec![1, 0, 0, 1]);
        assert!(parse_bits("10x1").is_err());
    }
}
