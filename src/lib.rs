//! # linksim - a simulated data-link layer
//!
//! linksim moves 7-character chunks of text across a noisy, contended line the
//! way a teaching-lab data-link layer does: every chunk becomes a fixed-layout
//! frame, protected by a Hamming check sequence, bit-stuffed so the start flag
//! stays unique, and sent byte by byte under CSMA/CD.
//!
//! - **Framing**: flag, destination, source, data and check sequence, one unit per byte.
//! - **Bit stuffing**: a guard `0` after every in-body flag prefix.
//! - **Error control**: (11,7) Hamming single-error correction, or the 3-unit lab code.
//! - **Line noise**: a random data unit flipped with configurable probability.
//! - **Media access**: carrier sense, collision jam and binary exponential backoff.
//! - **Transports**: in-memory loopback and serial ports (feature `serial`).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use linksim::config::Config;
//! use linksim::station::{simulate, StationSettings};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("linksim.toml").await?;
//!     let settings = StationSettings::from_config(&config, 1);
//!     let report = simulate(settings, "1010101".to_string()).await?;
//!     println!("{}", report.text);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`link`] - frame codec, stuffing, Hamming code, distortion
//! - [`csma`] - media-access controller and frame reassembly
//! - [`station`] - transmit and receive flows built from configuration
//! - [`transport`] - byte transports and status sinks
//! - [`config`] - configuration loading and validation
//! - [`metrics`] - link counters
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │    Station      │ ← chunking, modes, flows
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │   Link / CSMA   │ ← frames, stuffing, FEC, contention
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │   Transport     │ ← loopback or serial port
//! └─────────────────┘
//! ```

pub mod config;
pub mod csma;
pub mod errors;
pub mod link;
pub mod logutil;
pub mod metrics;
pub mod station;
pub mod transport;
