//! # Configuration
//!
//! TOML configuration for `linksim`, loaded with `tokio::fs` and validated once
//! on load. Every section has defaults, so an empty file is a valid config.
//!
//! ## Sections
//!
//! - [`LinkConfig`] - source address, check sequence, link mode
//! - [`ChannelConfig`] - noise and contention of the simulated line
//! - [`SerialConfig`] - ports used by `send` / `receive`
//! - [`LoggingConfig`] - log level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use linksim::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Config::create_default("linksim.toml").await?;
//!     let config = Config::load("linksim.toml").await?;
//!     println!("check sequence: {}", config.link.fcs);
//!     Ok(())
//! }
//! ```
//!
//! ## File Format
//!
//! ```toml
//! [link]
//! fcs = "hamming4"
//! mode = "csma"
//!
//! [channel]
//! distortion = 0.3
//! busy_probability = 0.7
//! collision_probability = 0.3
//! max_attempts = 16
//! jam_marker = "j"
//!
//! [serial]
//! tx_port = "/dev/ttyS1"
//! rx_port = "/dev/ttyS2"
//! baud_rate = 9600
//! ```
//!
//! Command line arguments take precedence over the file, the file over defaults.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

use crate::csma::{CsmaConfig, DEFAULT_BACKOFF_CAP, DEFAULT_MAX_ATTEMPTS};
use crate::link::distortion::{Distortion, DEFAULT_FLIP_PROBABILITY};
use crate::link::hamming::FcsVariant;
use crate::station::LinkMode;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Source address, modulo 16. When unset it is taken from the transmit port's number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<u32>,
    #[serde(default)]
    pub fcs: FcsVariant,
    #[serde(default)]
    pub mode: LinkMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Chance of flipping one data unit per frame.
    pub distortion: f64,
    pub busy_probability: f64,
    pub collision_probability: f64,
    pub max_attempts: u32,
    /// Backoff window exponent cap.
    pub backoff_cap: u32,
    pub slot_ms: u64,
    pub jam_marker: char,
    /// Fixed seed for reproducible runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            distortion: DEFAULT_FLIP_PROBABILITY,
            busy_probability: 0.70,
            collision_probability: 0.30,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_cap: DEFAULT_BACKOFF_CAP,
            slot_ms: 1,
            jam_marker: 'j',
            seed: None,
        }
    }
}

impl ChannelConfig {
    pub fn distortion(&self) -> Distortion {
        Distortion::new(self.distortion)
    }

    pub fn csma(&self) -> CsmaConfig {
        CsmaConfig {
            busy_probability: self.busy_probability,
            collision_probability: self.collision_probability,
            max_attempts: self.max_attempts,
            backoff_cap: self.backoff_cap,
            slot_ms: self.slot_ms,
            jam_marker: jam_byte(self.jam_marker),
        }
    }
}

/// Jam markers must be plain ASCII; anything else maps to 0 and fails validation.
fn jam_byte(marker: char) -> u8 {
    if marker.is_ascii() {
        marker as u8
    } else {
        0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub tx_port: String,
    pub rx_port: String,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            tx_port: "/dev/ttyS1".to_string(),
            rx_port: "/dev/ttyS2".to_string(),
            baud_rate: 9600,
            read_timeout_ms: 100,
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Config {
    /// Load and validate a configuration file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config
            .validate()
            .map_err(|e| anyhow!("Invalid config file {}: {}", path, e))?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let content = toml::to_string_pretty(&Config::default())
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.channel.distortion) {
            return Err(anyhow!(
                "channel.distortion must be in [0, 1], got {}",
                self.channel.distortion
            ));
        }
        if !self.channel.jam_marker.is_ascii() {
            return Err(anyhow!(
                "channel.jam_marker {:?} is not ASCII",
                self.channel.jam_marker
            ));
        }
        if self.channel.jam_marker == '\n' {
            return Err(anyhow!("channel.jam_marker must differ from the newline"));
        }
        self.channel
            .csma()
            .validate()
            .map_err(|e| anyhow!("channel: {}", e))?;
        if self.serial.baud_rate == 0 {
            return Err(anyhow!("serial.baud_rate must be positive"));
        }
        if !["error", "warn", "info", "debug", "trace"]
            .contains(&self.logging.level.to_ascii_lowercase().as_str())
        {
            return Err(anyhow!("unknown logging.level '{}'", self.logging.level));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.link.fcs, FcsVariant::Hamming4);
        assert_eq!(config.link.mode, LinkMode::Csma);
        assert_eq!(config.channel.csma(), CsmaConfig::default());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn partial_sections_fill_in() {
        let config: Config = toml::from_str(
            r#"
            [link]
            source = 3
            fcs = "hamming3"
            mode = "direct"

            [channel]
            distortion = 0.0
            seed = 42
            "#,
        )
        .unwrap();
        assert_eq!(config.link.source, Some(3));
        assert_eq!(config.link.fcs, FcsVariant::Hamming3);
        assert_eq!(config.link.mode, LinkMode::Direct);
        assert_eq!(config.channel.seed, Some(42));
        assert_eq!(config.channel.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.serial, SerialConfig::default());
    }

    #[test]
    fn large_source_wraps_instead_of_failing() {
        let config: Config = toml::from_str("[link]\nsource = 19\n").unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.link.source, Some(19));
        assert_eq!(crate::station::StationSettings::from_config(&config, 0).source, 3);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = Config::default();
        config.channel.busy_probability = 1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.channel.jam_marker = 'é';
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.level = "loud".into();
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn create_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("linksim.toml");
        let path = path.to_str().unwrap();
        Config::create_default(path).await.unwrap();
        let loaded = Config::load(path).await.unwrap();
        assert_eq!(loaded, Config::default());
    }

    #[tokio::test]
    async fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let err = Config::load(path.to_str().unwrap()).await.unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
