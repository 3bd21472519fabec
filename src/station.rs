//! Station wiring: turns configuration into a transmit flow and a receive flow
//! and runs them against a [`Transport`].
//!
//! Both flows are synchronous; [`simulate`] runs them side by side on tokio's
//! blocking pool over a [`LoopbackTransport`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::csma::receiver::{FrameAssembler, Receiver};
use crate::csma::{send_direct, CsmaConfig, MediaAccess, TransmitReport};
use crate::errors::LinkError;
use crate::link::distortion::Distortion;
use crate::link::hamming::FcsVariant;
use crate::link::{EncodedFrame, FrameEncoder, TextChunker};
use crate::logutil::escape_log;
use crate::metrics::{LinkStats, Snapshot};
use crate::transport::{LogSink, LoopbackTransport, StatusSink, Transport};

/// How stuffed frames reach the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    /// One write per frame, no contention.
    Direct,
    /// Byte-wise CSMA/CD.
    #[default]
    Csma,
}

/// Everything a station needs, resolved from config and command line.
#[derive(Debug, Clone)]
pub struct StationSettings {
    pub source: u32,
    pub fcs: FcsVariant,
    pub mode: LinkMode,
    pub distortion: Distortion,
    pub csma: CsmaConfig,
    pub seed: Option<u64>,
}

impl StationSettings {
    /// `source` is used when the config does not pin one.
    pub fn from_config(config: &Config, source: u32) -> Self {
        Self {
            source: wrap_source(config.link.source.unwrap_or(source)),
            fcs: config.link.fcs,
            mode: config.link.mode,
            distortion: config.channel.distortion(),
            csma: config.channel.csma(),
            seed: config.channel.seed,
        }
    }
}

/// Source addresses are four bits wide; larger identifiers wrap around.
pub fn wrap_source(source: u32) -> u32 {
    let wrapped = source % 16;
    if wrapped != source {
        debug!("source {} wraps to {}", source, wrapped);
    }
    wrapped
}

fn rng_for(seed: Option<u64>, stream: u64) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(stream)),
        None => StdRng::from_entropy(),
    }
}

/// One frame handed to the transport.
#[derive(Debug, Clone)]
pub struct Sent {
    pub encoded: EncodedFrame,
    /// Contention details, present in CSMA mode.
    pub report: Option<TransmitReport>,
}

/// Transmit flow: chunks text, encodes frames and puts them on the line.
#[derive(Debug)]
pub struct Sender {
    encoder: FrameEncoder,
    mode: LinkMode,
    rng: StdRng,
    mac: MediaAccess<StdRng>,
    chunker: TextChunker,
    stats: Arc<LinkStats>,
}

impl Sender {
    pub fn new(settings: &StationSettings, stats: Arc<LinkStats>) -> Self {
        Self {
            encoder: FrameEncoder::new(settings.source, settings.fcs, settings.distortion),
            mode: settings.mode,
            rng: rng_for(settings.seed, 1),
            mac: MediaAccess::new(settings.csma, rng_for(settings.seed, 2)),
            chunker: TextChunker::new(),
            stats,
        }
    }

    /// Text still waiting for a full chunk.
    pub fn pending(&self) -> &str {
        self.chunker.pending()
    }

    /// Queue text and send every chunk it completes.
    ///
    /// Text is refused whole if it cannot be framed for this mode. When a chunk
    /// fails on the transport, it and every later chunk go back to the front of
    /// the pending text.
    pub fn send_text(
        &mut self,
        transport: &dyn Transport,
        text: &str,
        status: Option<&dyn StatusSink>,
    ) -> crate::errors::Result<Vec<Sent>> {
        if self.mode == LinkMode::Csma {
            let jam = self.mac.config().jam_marker;
            if text.bytes().any(|b| b == jam) {
                return Err(LinkError::InvalidInput(format!(
                    "text carries the jam marker {:?}",
                    jam as char
                )));
            }
        }

        let chunks = self.chunker.push(text)?;
        let mut sent = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.iter().enumerate() {
            match self.send_chunk(transport, chunk, status) {
                Ok(frame) => sent.push(frame),
                Err(e) => {
                    self.chunker.requeue(&chunks[index..]);
                    return Err(e);
                }
            }
        }
        Ok(sent)
    }

    /// Send one 7-character chunk.
    pub fn send_chunk(
        &mut self,
        transport: &dyn Transport,
        chunk: &str,
        status: Option<&dyn StatusSink>,
    ) -> crate::errors::Result<Sent> {
        let encoded = self.encoder.encode_text(&mut self.rng, chunk)?;
        let report = match self.mode {
            LinkMode::Direct => {
                send_direct(transport, &encoded.stuffed)?;
                self.stats.add_bytes_sent(encoded.stuffed.len() as u64);
                if let Some(sink) = status {
                    sink.update(&encoded.annotated);
                }
                None
            }
            LinkMode::Csma => {
                let report =
                    self.mac
                        .transmit(transport, &encoded.stuffed, &encoded.annotated, status)?;
                self.stats.add_collisions(report.collisions);
                self.stats.add_bytes_sent(report.bytes_delivered as u64);
                self.stats.add_bytes_abandoned(report.bytes_abandoned as u64);
                Some(report)
            }
        };
        self.stats.inc_frames_sent();
        debug!("sent chunk {}", escape_log(chunk));
        Ok(Sent { encoded, report })
    }
}

/// Receive flow matching `settings`. Only a contended line carries jams.
pub fn receiver(settings: &StationSettings, stats: Arc<LinkStats>) -> Receiver {
    let jam_marker = match settings.mode {
        LinkMode::Direct => None,
        LinkMode::Csma => Some(settings.csma.jam_marker),
    };
    Receiver::new(FrameAssembler::new(settings.fcs, jam_marker, stats))
}

/// Outcome of a loopback simulation.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub frames_sent: usize,
    /// Recovered chunks, in arrival order.
    pub received: Vec<String>,
    pub text: String,
    /// Trailing characters that never filled a chunk.
    pub unsent: String,
    pub stats: Snapshot,
}

/// Send `text` over an in-memory line while a receiver drains it.
pub async fn simulate(settings: StationSettings, text: String) -> Result<SimulationReport> {
    let transport = Arc::new(LoopbackTransport::new(Duration::from_millis(5)));
    let stats = Arc::new(LinkStats::new());

    let tx = {
        let transport = transport.clone();
        let mut sender = Sender::new(&settings, stats.clone());
        tokio::task::spawn_blocking(move || {
            let result = sender.send_text(transport.as_ref(), &text, Some(&LogSink));
            transport.close();
            result.map(|sent| (sent.len(), sender.pending().to_string()))
        })
    };

    let rx = {
        let transport = transport.clone();
        let mut receiver = receiver(&settings, stats.clone());
        tokio::task::spawn_blocking(move || {
            let mut received = Vec::new();
            receiver
                .run(transport.as_ref(), Some(&LogSink), |frame| {
                    received.push(frame.decoded.text.clone())
                })
                .map(|()| received)
        })
    };

    let (frames_sent, unsent) = tx
        .await
        .map_err(|e| anyhow!("transmit task failed: {}", e))?
        .map_err(|e| anyhow!("transmit failed: {}", e))?;
    let received = rx
        .await
        .map_err(|e| anyhow!("receive task failed: {}", e))?
        .map_err(|e| anyhow!("receive failed: {}", e))?;

    let report = SimulationReport {
        frames_sent,
        text: received.concat(),
        received,
        unsent,
        stats: stats.snapshot(),
    };
    info!(
        "simulation finished: {} frames sent, {} received",
        report.frames_sent,
        report.received.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TransportError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Accepts a fixed number of writes, then fails like a pulled cable.
    struct FlakyLine {
        line: LoopbackTransport,
        writes_left: AtomicUsize,
    }

    impl Transport for FlakyLine {
        fn write(&self, bytes: &[u8]) -> std::result::Result<(), TransportError> {
            self.writes_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .map_err(|_| {
                    TransportError::Io(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "cable pulled",
                    ))
                })?;
            self.line.write(bytes)
        }

        fn read(&self) -> std::result::Result<Vec<u8>, TransportError> {
            self.line.read()
        }
    }

    fn settings(mode: LinkMode) -> StationSettings {
        let mut config = Config::default();
        config.link.mode = mode;
        config.channel.slot_ms = 0;
        config.channel.seed = Some(7);
        StationSettings::from_config(&config, 3)
    }

    #[test]
    fn config_source_wins_over_port_number() {
        let mut config = Config::default();
        assert_eq!(StationSettings::from_config(&config, 4).source, 4);
        config.link.source = Some(9);
        assert_eq!(StationSettings::from_config(&config, 4).source, 9);
        config.link.source = Some(25);
        assert_eq!(StationSettings::from_config(&config, 4).source, 9);
        config.link.source = None;
        assert_eq!(StationSettings::from_config(&config, 16).source, 0);
    }

    #[test]
    fn direct_mode_writes_whole_frames() {
        let wire = LoopbackTransport::default();
        let stats = Arc::new(LinkStats::new());
        let mut sender = Sender::new(&settings(LinkMode::Direct), stats.clone());
        let sent = sender.send_text(&wire, "1010101", None).unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].report.is_none());
        assert_eq!(wire.snapshot(), sent[0].encoded.stuffed);
        assert_eq!(stats.snapshot().frames_sent, 1);
    }

    #[test]
    fn csma_refuses_jam_text_without_losing_anything() {
        let wire = LoopbackTransport::default();
        let stats = Arc::new(LinkStats::new());
        let mut sender = Sender::new(&settings(LinkMode::Csma), stats.clone());
        sender.send_text(&wire, "10", None).unwrap();

        let err = sender
            .send_text(&wire, "1010101abcdefj1111111", None)
            .unwrap_err();
        assert!(matches!(err, LinkError::InvalidInput(_)));
        assert!(wire.snapshot().is_empty());
        assert_eq!(sender.pending(), "10");
        assert_eq!(stats.snapshot().frames_sent, 0);

        let sent = sender.send_text(&wire, "10101", None).unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sender.pending(), "");
    }

    #[test]
    fn direct_mode_accepts_the_jam_character() {
        let wire = LoopbackTransport::default();
        let mut sender = Sender::new(&settings(LinkMode::Direct), Arc::new(LinkStats::new()));
        let sent = sender
            .send_text(&wire, "1010101abcdefj1111111", None)
            .unwrap();
        assert_eq!(sent.len(), 3);
    }

    #[test]
    fn transport_failure_requeues_unsent_chunks() {
        let line = FlakyLine {
            line: LoopbackTransport::default(),
            writes_left: AtomicUsize::new(1),
        };
        let stats = Arc::new(LinkStats::new());
        let mut sender = Sender::new(&settings(LinkMode::Direct), stats.clone());

        let err = sender
            .send_text(&line, "1010101000000011111110", None)
            .unwrap_err();
        assert!(matches!(err, LinkError::Transport(TransportError::Io(_))));
        assert_eq!(sender.pending(), "000000011111110");
        let snap = stats.snapshot();
        assert_eq!(snap.frames_sent, 1);
        assert_eq!(snap.bytes_sent, line.line.snapshot().len() as u64);
    }

    #[test]
    fn seeded_senders_agree() {
        let a = LoopbackTransport::default();
        let b = LoopbackTransport::default();
        let stats = Arc::new(LinkStats::new());
        Sender::new(&settings(LinkMode::Csma), stats.clone())
            .send_text(&a, "10011101100111", None)
            .unwrap();
        Sender::new(&settings(LinkMode::Csma), stats)
            .send_text(&b, "10011101100111", None)
            .unwrap();
        assert_eq!(a.snapshot(), b.snapshot());
    }

    #[tokio::test]
    async fn simulation_recovers_text() {
        let report = simulate(settings(LinkMode::Csma), "1010101\n0110z1".to_string())
            .await
            .unwrap();
        assert_eq!(report.frames_sent, 2);
        assert_eq!(report.text, "1010101\n0110z1");
        assert_eq!(report.unsent, "");
        assert_eq!(report.stats.frames_received, 2);
        assert_eq!(report.stats.jams_seen, report.stats.collisions);
        // Every collided write is followed by a jam; both reach the receiver.
        assert_eq!(
            report.stats.bytes_received,
            report.stats.bytes_sent + 2 * report.stats.collisions
        );
    }

    #[tokio::test]
    async fn direct_simulation_carries_the_jam_character() {
        let report = simulate(settings(LinkMode::Direct), "jumpingjazzjig".to_string())
            .await
            .unwrap();
        assert_eq!(report.received, vec!["jumping", "jazzjig"]);
        assert_eq!(report.text, "jumpingjazzjig");
        assert_eq!(report.stats.jams_seen, 0);
        assert_eq!(report.stats.buffers_discarded, 0);
        assert!(report.stats.bytes_sent > 0);
        assert_eq!(report.stats.bytes_received, report.stats.bytes_sent);
    }

    #[tokio::test]
    async fn simulation_keeps_partial_chunk() {
        let report = simulate(settings(LinkMode::Direct), "111000111".to_string())
            .await
            .unwrap();
        assert_eq!(report.received, vec!["1110001".to_string()]);
        assert_eq!(report.unsent, "11");
    }
}
