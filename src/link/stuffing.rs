//! Bit stuffing.
//!
//! The body of a frame (everything from unit 7 on, so the flag's last unit is
//! included) is scanned as it is emitted. Whenever the last seven emitted body
//! units spell the flag prefix `1000011` and more units follow, a guard `0` is
//! emitted. On the wire that reads `10000110`, the flag with its final bit
//! flipped, so the real flag `10000111` can only ever start a frame.
//!
//! The scan looks at the stuffed stream rather than the raw one: a guard may
//! itself be one of the zeros of a later prefix, and checking the emitted
//! stream is what stops a guard from completing a flag. A guard can never be the
//! first unit of a match, so the scan never re-matches on just-inserted units.

use super::bits::{units_to_text, Unit};
use super::frame::{frame_len, FLAG, FLAG_LEN, HEADER_AND_DATA_LEN};
use super::hamming::FcsVariant;
use crate::errors::{LinkError, Result};
use crate::logutil::escape_log;

/// Flag prefix that triggers a guard.
pub const STUFF_PREFIX: [Unit; PREFIX_LEN] = [1, 0, 0, 0, 0, 1, 1];
const PREFIX_LEN: usize = FLAG_LEN - 1;

/// First unit examined by the scan.
const BODY_START: usize = FLAG_LEN - 1;

const GUARD: Unit = 0;

/// True when `stream[..=end]` finishes a prefix lying entirely inside the body.
#[inline]
fn prefix_ends_at(stream: &[Unit], end: usize) -> bool {
    end + 1 >= BODY_START + PREFIX_LEN && stream[end + 1 - PREFIX_LEN..=end] == STUFF_PREFIX
}

/// Insert guard units into a raw frame.
pub fn stuff(raw: &[Unit]) -> Vec<Unit> {
    let mut out = Vec::with_capacity(raw.len() + raw.len() / PREFIX_LEN);
    out.extend_from_slice(&raw[..raw.len().min(BODY_START)]);
    for (index, &unit) in raw.iter().enumerate().skip(BODY_START) {
        out.push(unit);
        if index + 1 < raw.len() && prefix_ends_at(&out, out.len() - 1) {
            out.push(GUARD);
        }
    }
    out
}

/// Remove guard units, yielding exactly one unstuffed frame.
pub fn destuff(stuffed: &[Unit], variant: FcsVariant) -> Result<Vec<Unit>> {
    let expected = frame_len(variant);
    if stuffed.len() < expected {
        return Err(LinkError::InvalidPacket(format!(
            "stuffed stream holds {} units, a frame needs at least {}",
            stuffed.len(),
            expected
        )));
    }
    if stuffed[..FLAG_LEN] != FLAG {
        return Err(LinkError::InvalidPacket(format!(
            "stream starts with {} instead of the flag",
            units_to_text(&stuffed[..FLAG_LEN])
        )));
    }

    let mut out = Vec::with_capacity(expected);
    out.extend_from_slice(&stuffed[..BODY_START]);
    let mut i = BODY_START;
    while i < stuffed.len() {
        out.push(stuffed[i]);
        if i + 1 < stuffed.len() && prefix_ends_at(stuffed, i) {
            if stuffed[i + 1] != GUARD {
                return Err(LinkError::InvalidPacket(format!(
                    "flag found inside frame body at unit {}",
                    i + 1 - PREFIX_LEN
                )));
            }
            i += 2;
        } else {
            i += 1;
        }
    }

    if out.len() != expected {
        return Err(LinkError::InvalidPacket(format!(
            "destuffed frame has {} units, expected {}",
            out.len(),
            expected
        )));
    }
    Ok(out)
}

/// Number of guard units in a (possibly partial) stuffed stream. A prefix at
/// the very end of the stream is not counted until its follower arrives.
pub fn count_guards(stuffed: &[Unit]) -> usize {
    let mut guards = 0;
    let mut i = BODY_START;
    while i < stuffed.len() {
        if i + 1 < stuffed.len() && prefix_ends_at(stuffed, i) {
            guards += 1;
            i += 2;
        } else {
            i += 1;
        }
    }
    guards
}

/// Length of the first complete stuffed frame at the start of `stream`, or
/// `None` while more units are needed. `stream` must start with the flag.
///
/// This is the frame's fixed length plus every guard met on the way; a prefix
/// closing the final raw unit carries no guard.
pub fn stuffed_frame_len(stream: &[Unit], variant: FcsVariant) -> Option<usize> {
    let target = frame_len(variant);
    let mut raw = BODY_START;
    let mut i = BODY_START;
    while i < stream.len() {
        raw += 1;
        if raw == target {
            return Some(i + 1);
        }
        if prefix_ends_at(stream, i) {
            if i + 1 >= stream.len() {
                return None;
            }
            i += 2;
        } else {
            i += 1;
        }
    }
    None
}

/// Render a stuffed frame for display: guards wrapped as `-0-`, the check
/// sequence set off by a space, newline sentinels escaped.
pub fn annotate(stuffed: &[Unit], variant: FcsVariant) -> String {
    let mut text = units_to_text(&stuffed[..stuffed.len().min(BODY_START)]);
    let mut raw_index = BODY_START;
    let mut i = BODY_START;
    while i < stuffed.len() {
        if raw_index == HEADER_AND_DATA_LEN && variant.width() > 0 {
            text.push(' ');
        }
        text.push_str(&units_to_text(&stuffed[i..=i]));
        raw_index += 1;
        if i + 1 < stuffed.len() && prefix_ends_at(stuffed, i) {
            text.push('-');
            text.push_str(&units_to_text(&stuffed[i + 1..=i + 1]));
            text.push('-');
            i += 2;
        } else {
            i += 1;
        }
    }
    escape_log(&text)
}
