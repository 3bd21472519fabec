//! CSMA/CD transmit and frame reassembly over the in-memory line.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use linksim::csma::receiver::{FrameAssembler, Receiver};
use linksim::csma::{CsmaConfig, MediaAccess};
use linksim::link::distortion::Distortion;
use linksim::link::hamming::FcsVariant;
use linksim::link::FrameEncoder;
use linksim::metrics::LinkStats;
use linksim::transport::{LoopbackTransport, Transport};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn contended() -> CsmaConfig {
    CsmaConfig {
        slot_ms: 0,
        ..CsmaConfig::default()
    }
}

fn frames(texts: &[&str], source: u32) -> Vec<Vec<u8>> {
    let mut rng = StdRng::seed_from_u64(21);
    let encoder = FrameEncoder::new(source, FcsVariant::Hamming4, Distortion::default());
    texts
        .iter()
        .map(|t| encoder.encode_text(&mut rng, t).unwrap().stuffed)
        .collect()
}

#[test]
fn concurrent_transmit_and_receive() {
    let texts = ["1010101", "0000000", "1111111", "hi\nthe0", "1000011", "0111000"];
    let line = Arc::new(LoopbackTransport::new(Duration::from_millis(5)));
    let stats = Arc::new(LinkStats::new());

    let tx = {
        let line = line.clone();
        let stuffed = frames(&texts, 12);
        thread::spawn(move || {
            let mut mac = MediaAccess::new(contended(), StdRng::seed_from_u64(77));
            let mut collisions = 0;
            for frame in &stuffed {
                let report = mac.transmit(line.as_ref(), frame, "", None).unwrap();
                assert_eq!(report.bytes_abandoned, 0);
                collisions += report.collisions;
            }
            line.close();
            collisions
        })
    };

    let mut receiver = Receiver::new(FrameAssembler::new(
        FcsVariant::Hamming4,
        Some(b'j'),
        stats.clone(),
    ));
    let mut received = Vec::new();
    receiver
        .run(line.as_ref(), None, |f| received.push(f.decoded.text.clone()))
        .unwrap();
    let collisions = tx.join().unwrap();

    assert_eq!(received, texts);
    let snap = stats.snapshot();
    assert_eq!(snap.jams_seen, collisions);
    assert_eq!(snap.frames_received, texts.len() as u64);
    assert_eq!(snap.buffers_discarded, 0);
}

#[test]
fn lost_byte_costs_one_frame_only() {
    let stuffed = frames(&["1100110", "0011001", "1010000"], 5);
    let mut wire = Vec::new();
    wire.extend(&stuffed[0]);
    // An abandoned byte in the middle of the second frame.
    let mut damaged = stuffed[1].clone();
    damaged.remove(12);
    wire.extend(&damaged);
    wire.extend(&stuffed[2]);

    let stats = Arc::new(LinkStats::new());
    let mut asm = FrameAssembler::new(FcsVariant::Hamming4, Some(b'j'), stats.clone());
    let mut texts: Vec<String> = asm
        .push(&wire)
        .into_iter()
        .map(|f| f.decoded.text)
        .collect();
    texts.extend(asm.flush_idle().into_iter().map(|f| f.decoded.text));

    assert_eq!(texts.first().map(String::as_str), Some("1100110"));
    assert_eq!(texts.last().map(String::as_str), Some("1010000"));
    assert!(texts.len() <= 3);
}

#[test]
fn jam_markers_split_across_reads() {
    let stuffed = frames(&["0101010"], 1).remove(0);
    let line = LoopbackTransport::new(Duration::from_millis(1));
    let (head, tail) = stuffed.split_at(stuffed.len() - 1);
    line.write(head).unwrap();
    line.write(&[tail[0] ^ 1]).unwrap();

    let stats = Arc::new(LinkStats::new());
    let mut receiver = Receiver::new(FrameAssembler::new(
        FcsVariant::Hamming4,
        Some(b'j'),
        stats,
    ));
    let first = receiver.poll(&line, None).unwrap();
    assert!(first.frames.is_empty());

    // The collided last byte is withdrawn before the line goes idle.
    line.write(b"j").unwrap();
    line.write(tail).unwrap();
    let second = receiver.poll(&line, None).unwrap();
    assert!(second.frames.is_empty());

    let idle = receiver.poll(&line, None).unwrap();
    assert_eq!(idle.frames.len(), 1);
    assert_eq!(idle.frames[0].decoded.text, "0101010");
    assert!(!idle.closed);

    line.close();
    assert!(receiver.poll(&line, None).unwrap().closed);
}
