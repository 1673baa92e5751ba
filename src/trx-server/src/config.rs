// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for trx-server.
//!
//! Config is loaded from the `[trx-server]` section of `trx-rs.toml`.
//! Default search order:
//! 1. Path specified via `--config` CLI argument
//! 2. `$TRX_CONFIG`
//! 3. `./trx-rs.toml`
//! 4. `~/.config/trx-rs/trx-rs.toml`
//! 5. `/etc/trx-rs/trx-rs.toml`

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use trx_app::ConfigFile;
use trx_core::{AgcSpeed, DspSettings, Freq, Mode, RxOutput};
use trx_dsp::{RadioConfig, RxConfig, TxConfig, BLOCK_SIZE, MAX_RECEIVERS, SAMPLE_RATE};

/// Top-level server configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// General settings
    pub general: GeneralConfig,
    /// Conditioning shared by every receiver
    pub dsp: DspSettings,
    /// Simulated sound driver
    pub audio: AudioConfig,
    /// Transmitter setup
    pub tx: TxConfig,
    /// Oscillator and dial
    pub lo: LoConfig,
    /// Receivers created at startup
    pub receivers: Vec<RxConfig>,
    /// TCP control listener
    pub listen: ListenConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Callsign or owner label
    pub callsign: Option<String>,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
    /// Speaker volume, 0..=100
    pub volume: u8,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            callsign: Some("N0CALL".to_string()),
            log_level: None,
            volume: 100,
        }
    }
}

/// What the simulated sound driver feeds into the receive path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AudioSource {
    #[default]
    Silence,
    Tone,
    File,
}

/// Simulated sound driver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Samples handed to the engine per driver callback
    pub block_size: usize,
    pub source: AudioSource,
    /// IF frequency of the generated tone (Hz)
    pub tone_hz: f64,
    /// Tone amplitude, 0.0..=1.0 of full scale
    pub tone_level: f32,
    /// Raw signed 32-bit little-endian PCM, looped
    pub input_file: Option<PathBuf>,
    /// Speaker output written as raw signed 32-bit little-endian PCM
    pub output_file: Option<PathBuf>,
    /// Seconds between driver statistics log lines, 0 disables
    pub stats_interval_secs: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            block_size: BLOCK_SIZE,
            source: AudioSource::Silence,
            tone_hz: 13_000.0,
            tone_level: 0.1,
            input_file: None,
            output_file: None,
            stats_interval_secs: 10,
        }
    }
}

/// Local oscillator and dial setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoConfig {
    /// Dial frequency at startup (Hz)
    pub dial_hz: u64,
    /// Fixed offset between the oscillator and the dial (Hz)
    pub bfo_hz: i64,
    /// Calibration offset (Hz)
    pub bfo_offset_hz: i32,
    /// Where the dial frequency sits within the IF band (Hz)
    pub if_slot_hz: i64,
}

impl Default for LoConfig {
    fn default() -> Self {
        let radio = RadioConfig::default();
        Self {
            dial_hz: 7_074_000,
            bfo_hz: radio.bfo_hz,
            bfo_offset_hz: radio.bfo_offset_hz,
            if_slot_hz: radio.if_slot_hz,
        }
    }
}

/// TCP control listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// Whether the listener is enabled
    pub enabled: bool,
    /// IP address to listen on
    pub listen: IpAddr,
    /// TCP port to listen on
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 4530,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_log_level(self.general.log_level.as_deref())?;
        if self.general.volume > 100 {
            return Err("[general].volume must be in range 0..=100".to_string());
        }

        if self.lo.dial_hz == 0 {
            return Err("[lo].dial_hz must be > 0".to_string());
        }

        if self.audio.block_size == 0 || self.audio.block_size > 8 * BLOCK_SIZE {
            return Err(format!(
                "[audio].block_size must be in range 1..={}",
                8 * BLOCK_SIZE
            ));
        }
        if self.audio.source == AudioSource::File && self.audio.input_file.is_none() {
            return Err("[audio].source = \"file\" requires [audio].input_file".to_string());
        }
        let nyquist = f64::from(SAMPLE_RATE) / 2.0;
        if !(0.0..nyquist).contains(&self.audio.tone_hz) {
            return Err(format!("[audio].tone_hz must be in range 0..{}", nyquist));
        }
        if !(0.0..=1.0).contains(&self.audio.tone_level) {
            return Err("[audio].tone_level must be in range 0.0..=1.0".to_string());
        }

        if !(0..=30).contains(&self.dsp.noise_threshold) {
            return Err("[dsp].noise_threshold must be in range 0..=30".to_string());
        }
        if self.dsp.noise_update_interval == 0 {
            return Err("[dsp].noise_update_interval must be > 0".to_string());
        }
        if self.dsp.compression_control_level > 10 {
            return Err("[dsp].compression_control_level must be in range 0..=10".to_string());
        }

        if self.receivers.len() > MAX_RECEIVERS {
            return Err(format!(
                "at most {} [[receivers]] entries are supported",
                MAX_RECEIVERS
            ));
        }
        for (idx, rx) in self.receivers.iter().enumerate() {
            let (low, high) = rx.passband();
            if low >= high {
                return Err(format!(
                    "[[receivers]] entry {} has an empty passband {}..{}",
                    idx + 1,
                    low,
                    high
                ));
            }
        }

        if self.listen.enabled && self.listen.port == 0 {
            return Err("[listen].port must be > 0 when listener is enabled".to_string());
        }
        Ok(())
    }

    /// Engine setup derived from the config.
    pub fn radio_config(&self) -> RadioConfig {
        RadioConfig {
            settings: self.dsp,
            volume: self.general.volume,
            tx: self.tx.clone(),
            dial: Freq::new(self.lo.dial_hz),
            bfo_hz: self.lo.bfo_hz,
            bfo_offset_hz: self.lo.bfo_offset_hz,
            if_slot_hz: self.lo.if_slot_hz,
        }
    }

    /// Generate an example configuration wrapped under the `[trx-server]`
    /// section header, suitable for use in a combined `trx-rs.toml` file.
    pub fn example_toml() -> String {
        #[derive(serde::Serialize)]
        struct Wrapper {
            #[serde(rename = "trx-server")]
            inner: ServerConfig,
        }
        let example = ServerConfig {
            general: GeneralConfig {
                callsign: Some("N0CALL".to_string()),
                log_level: Some("info".to_string()),
                volume: 80,
            },
            dsp: DspSettings::default(),
            audio: AudioConfig {
                source: AudioSource::Tone,
                ..AudioConfig::default()
            },
            tx: TxConfig::default(),
            lo: LoConfig::default(),
            receivers: vec![
                RxConfig {
                    freq_hz: 12_000.0,
                    mode: Mode::USB,
                    ..RxConfig::default()
                },
                RxConfig {
                    freq_hz: 15_000.0,
                    mode: Mode::FT8,
                    agc: AgcSpeed::Slow,
                    output: RxOutput::Network,
                    ..RxConfig::default()
                },
            ],
            listen: ListenConfig::default(),
        };
        toml::to_string_pretty(&Wrapper { inner: example }).unwrap_or_default()
    }
}

impl ConfigFile for ServerConfig {
    fn section_key() -> &'static str {
        "trx-server"
    }
}

fn validate_log_level(level: Option<&str>) -> Result<(), String> {
    if let Some(level) = level {
        match level {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(format!(
                    "[general].log_level '{}' is invalid (expected one of: trace, debug, info, warn, error)",
                    level
                ))
            }
        }
    }
    Ok(())
}
