//! # Link Frame Pipeline
//!
//! Turns typed text into stuffed, error-protected frames and back.
//!
//! ```text
//! text ─► TextChunker ─► Frame::build ─► hamming::encode ─► Distortion ─► stuff ─► wire
//! wire ─► destuff ─► Frame::from_raw ─► hamming::check_and_correct ─► text
//! ```
//!
//! ## Modules
//!
//! - [`bits`] - unit buffers and text conversion
//! - [`frame`] - frame layout, `build` / `to_raw` / `from_raw`
//! - [`stuffing`] - guard insertion and removal
//! - [`hamming`] - frame check sequence and single-error correction
//! - [`distortion`] - simulated line noise
//!
//! ## Example
//!
//! ```rust
//! use linksim::link::{decode_frame, FrameEncoder};
//! use linksim::link::hamming::FcsVariant;
//! use linksim::link::distortion::Distortion;
//! use rand::SeedableRng;
//!
//! let encoder = FrameEncoder::new(5, FcsVariant::Hamming4, Distortion::new(1.0));
//! let mut rng = rand::rngs::StdRng::seed_from_u64(9);
//! let encoded = encoder.encode_text(&mut rng, "0110100").unwrap();
//! let decoded = decode_frame(&encoded.stuffed, FcsVariant::Hamming4).unwrap();
//! assert_eq!(decoded.text, "0110100");
//! assert!(decoded.corrected);
//! ```

pub mod bits;
pub mod distortion;
pub mod frame;
pub mod hamming;
pub mod stuffing;

use log::debug;
use rand::Rng;

use crate::errors::{LinkError, Result};
use bits::{text_to_units, Unit};
use distortion::Distortion;
use frame::{Frame, DATA_LEN};
use hamming::FcsVariant;

/// A frame ready for the wire.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// Frame as built, with its check sequence and any injected noise.
    pub frame: Frame,
    pub stuffed: Vec<Unit>,
    /// Human-readable rendering for status displays.
    pub annotated: String,
}

/// Text recovered from one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub text: String,
    pub source: u32,
    /// A flipped data unit was repaired.
    pub corrected: bool,
}

/// Sender-side half of the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct FrameEncoder {
    source: u32,
    variant: FcsVariant,
    distortion: Distortion,
}

impl FrameEncoder {
    pub fn new(source: u32, variant: FcsVariant, distortion: Distortion) -> Self {
        Self {
            source,
            variant,
            distortion,
        }
    }

    pub fn variant(&self) -> FcsVariant {
        self.variant
    }

    /// Build, protect, distort and stuff one 7-unit chunk. The check sequence is
    /// computed strictly before the line noise is applied.
    pub fn encode<R: Rng + ?Sized>(&self, rng: &mut R, chunk: &[Unit]) -> Result<EncodedFrame> {
        let frame = Frame::build(chunk, self.source, self.variant)?;
        let frame = frame.with_fcs(hamming::encode(self.variant, frame.data()));
        let frame = frame.with_data(self.distortion.maybe_flip(rng, frame.data()));
        let stuffed = stuffing::stuff(&frame.to_raw());
        let annotated = stuffing::annotate(&stuffed, self.variant);
        debug!("serialized frame: {}", annotated);
        Ok(EncodedFrame {
            frame,
            stuffed,
            annotated,
        })
    }

    pub fn encode_text<R: Rng + ?Sized>(&self, rng: &mut R, chunk: &str) -> Result<EncodedFrame> {
        self.encode(rng, &text_to_units(chunk)?)
    }
}

/// Receiver-side half of the pipeline: destuff, parse, correct.
pub fn decode_frame(stuffed: &[Unit], variant: FcsVariant) -> Result<DecodedFrame> {
    let raw = stuffing::destuff(stuffed, variant)?;
    let frame = Frame::from_raw(&raw, variant)?;
    let (data, corrected) = hamming::check_and_correct(variant, frame.data(), frame.fcs_array());
    let frame = frame.with_data(data);
    debug!(
        "deserialized frame from source {}: {}",
        frame.source_id(),
        crate::logutil::escape_log(&frame.text())
    );
    Ok(DecodedFrame {
        text: frame.text(),
        source: frame.source_id(),
        corrected,
    })
}

/// Collects typed text and hands out complete 7-character chunks. A partial
/// chunk stays pending until more text arrives.
#[derive(Debug, Default)]
pub struct TextChunker {
    pending: String,
}

impl TextChunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append text, returning every chunk that is now complete.
    ///
    /// Characters are validated on the way in; on error nothing is consumed.
    pub fn push(&mut self, text: &str) -> Result<Vec<String>> {
        text_to_units(text)?;
        self.pending.push_str(text);
        let mut chunks = Vec::new();
        while self.pending.len() >= DATA_LEN {
            let rest = self.pending.split_off(DATA_LEN);
            chunks.push(std::mem::replace(&mut self.pending, rest));
        }
        Ok(chunks)
    }

    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Put chunks that were handed out but never sent back in front of the
    /// pending text, in order.
    pub fn requeue(&mut self, chunks: &[String]) {
        let mut restored = chunks.concat();
        restored.push_str(&self.pending);
        self.pending = restored;
    }
}

/// Split a complete text into chunks, failing if it does not divide evenly.
pub fn chunk_exact(text: &str) -> Result<Vec<String>> {
    let mut chunker = TextChunker::new();
    let chunks = chunker.push(text)?;
    if !chunker.pending().is_empty() {
        return Err(LinkError::InvalidInput(format!(
            "{} trailing characters do not fill a {}-unit frame",
            chunker.pending().len(),
            DATA_LEN
        )));
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn pipeline_recovers_text() {
        let mut rng = StdRng::seed_from_u64(11);
        for variant in [FcsVariant::Hamming3, FcsVariant::Hamming4] {
            let encoder = FrameEncoder::new(21, variant, Distortion::default());
            for chunk in ["1010101", "0000000", "1111111", "10\n0110", "abc1\n0z"] {
                let encoded = encoder.encode_text(&mut rng, chunk).unwrap();
                let decoded = decode_frame(&encoded.stuffed, variant).unwrap();
                assert_eq!(decoded.text, chunk);
                assert_eq!(decoded.source, 5);
            }
        }
    }

    #[test]
    fn uncoded_frames_carry_noise_through() {
        let mut rng = StdRng::seed_from_u64(2);
        let encoder = FrameEncoder::new(1, FcsVariant::None, Distortion::new(1.0));
        let encoded = encoder.encode_text(&mut rng, "1111111").unwrap();
        let decoded = decode_frame(&encoded.stuffed, FcsVariant::None).unwrap();
        assert!(!decoded.corrected);
        assert_eq!(decoded.text.matches('0').count(), 1);
    }

    #[test]
    fn wrong_chunk_length_is_rejected() {
        let mut rng = StdRng::seed_from_u64(2);
        let encoder = FrameEncoder::new(1, FcsVariant::Hamming4, Distortion::clean());
        assert!(matches!(
            encoder.encode_text(&mut rng, "101"),
            Err(LinkError::InvalidInput(_))
        ));
    }

    #[test]
    fn chunker_keeps_remainder() {
        let mut chunker = TextChunker::new();
        assert!(chunker.push("10101").unwrap().is_empty());
        assert_eq!(chunker.push("0110").unwrap(), vec!["1010101".to_string()]);
        assert_eq!(chunker.pending(), "10");
        assert_eq!(
            chunker.push("000001111111").unwrap(),
            vec!["1000000".to_string(), "1111111".to_string()]
        );
        assert_eq!(chunker.pending(), "");
        assert!(chunker.push("é").is_err());
        assert_eq!(chunker.pending(), "");
    }

    #[test]
    fn requeued_chunks_come_out_first() {
        let mut chunker = TextChunker::new();
        let chunks = chunker.push("000111010101011100").unwrap();
        assert_eq!(chunker.pending(), "1100");
        chunker.requeue(&chunks[1..]);
        assert_eq!(chunker.pending(), "10101011100");
        assert_eq!(chunker.push("110").unwrap(), vec!["1010101", "1100110"]);
        assert_eq!(chunker.pending(), "");
    }

    #[test]
    fn chunk_exact_requires_whole_frames() {
        assert_eq!(chunk_exact("10101010101010").unwrap().len(), 2);
        assert!(chunk_exact("1010101010").is_err());
    }
}
