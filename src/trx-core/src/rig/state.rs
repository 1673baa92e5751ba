// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::radio::freq::Freq;
use crate::rig::response::RigError;

/// Operating mode of a receiver or of the transmitter.
///
/// Numeric codes are stable and used on the wire: USB=0 through
/// CALIBRATE=11, FM=12. Any other name is carried verbatim in `Other`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    #[default]
    USB,
    LSB,
    CW,
    CWR,
    NBFM,
    AM,
    FT8,
    PSK31,
    RTTY,
    DIGITAL,
    #[serde(rename = "2TONE")]
    TwoTone,
    #[serde(rename = "CALIBRATE")]
    Calibrate,
    FM,
    Other(String),
}

impl Mode {
    pub const ALL: [Mode; 13] = [
        Mode::USB,
        Mode::LSB,
        Mode::CW,
        Mode::CWR,
        Mode::NBFM,
        Mode::AM,
        Mode::FT8,
        Mode::PSK31,
        Mode::RTTY,
        Mode::DIGITAL,
        Mode::TwoTone,
        Mode::Calibrate,
        Mode::FM,
    ];

    pub fn code(&self) -> Option<u8> {
        let code = match self {
            Mode::USB => 0,
            Mode::LSB => 1,
            Mode::CW => 2,
            Mode::CWR => 3,
            Mode::NBFM => 4,
            Mode::AM => 5,
            Mode::FT8 => 6,
            Mode::PSK31 => 7,
            Mode::RTTY => 8,
            Mode::DIGITAL => 9,
            Mode::TwoTone => 10,
            Mode::Calibrate => 11,
            Mode::FM => 12,
            Mode::Other(_) => return None,
        };
        Some(code)
    }

    pub fn from_code(code: u8) -> Mode {
        Mode::ALL
            .iter()
            .find(|mode| mode.code() == Some(code))
            .cloned()
            .unwrap_or_else(|| Mode::Other(code.to_string()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Mode::USB => "USB",
            Mode::LSB => "LSB",
            Mode::CW => "CW",
            Mode::CWR => "CWR",
            Mode::NBFM => "NBFM",
            Mode::AM => "AM",
            Mode::FT8 => "FT8",
            Mode::PSK31 => "PSK31",
            Mode::RTTY => "RTTY",
            Mode::DIGITAL => "DIGITAL",
            Mode::TwoTone => "2TONE",
            Mode::Calibrate => "CALIBRATE",
            Mode::FM => "FM",
            Mode::Other(name) => name,
        }
    }

    /// Modes whose audio is handed to the external modem.
    pub fn is_digital(&self) -> bool {
        matches!(self, Mode::FT8 | Mode::PSK31 | Mode::RTTY | Mode::DIGITAL)
    }

    /// Modes whose audio sits below the carrier.
    pub fn is_lower_sideband(&self) -> bool {
        matches!(self, Mode::LSB | Mode::CWR)
    }

    pub fn is_cw(&self) -> bool {
        matches!(self, Mode::CW | Mode::CWR)
    }

    /// Modes with a symmetric spectrum around the carrier.
    pub fn is_double_sideband(&self) -> bool {
        matches!(self, Mode::AM | Mode::NBFM | Mode::FM)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses mode names case-insensitively; unknown names become `Other`.
impl FromStr for Mode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let mode = Mode::ALL
            .iter()
            .find(|mode| mode.as_str() == upper)
            .cloned()
            .unwrap_or(Mode::Other(upper));
        Ok(mode)
    }
}

/// What put the radio into transmit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TxTrigger {
    #[default]
    Off,
    Ptt,
    Soft,
}

impl TxTrigger {
    pub fn as_u8(self) -> u8 {
        match self {
            TxTrigger::Off => 0,
            TxTrigger::Ptt => 1,
            TxTrigger::Soft => 2,
        }
    }

    pub fn from_u8(value: u8) -> TxTrigger {
        match value {
            1 => TxTrigger::Ptt,
            2 => TxTrigger::Soft,
            _ => TxTrigger::Off,
        }
    }
}

/// Per-receiver automatic gain control speed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgcSpeed {
    Off,
    Slow,
    #[default]
    Medium,
    Fast,
}

impl AgcSpeed {
    pub fn as_str(self) -> &'static str {
        match self {
            AgcSpeed::Off => "off",
            AgcSpeed::Slow => "slow",
            AgcSpeed::Medium => "medium",
            AgcSpeed::Fast => "fast",
        }
    }
}

impl FromStr for AgcSpeed {
    type Err = RigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(AgcSpeed::Off),
            "slow" => Ok(AgcSpeed::Slow),
            "med" | "medium" => Ok(AgcSpeed::Medium),
            "fast" => Ok(AgcSpeed::Fast),
            other => Err(RigError(format!("unknown AGC speed: {other}"))),
        }
    }
}

/// Where a receiver's demodulated audio goes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RxOutput {
    None,
    #[default]
    Speaker,
    Network,
}

impl RxOutput {
    pub fn as_str(self) -> &'static str {
        match self {
            RxOutput::None => "none",
            RxOutput::Speaker => "speaker",
            RxOutput::Network => "network",
        }
    }
}

impl FromStr for RxOutput {
    type Err = RigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(RxOutput::None),
            "speaker" => Ok(RxOutput::Speaker),
            "network" => Ok(RxOutput::Network),
            other => Err(RigError(format!("unknown output: {other}"))),
        }
    }
}

/// Source of CW keying handed to the keyer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CwInput {
    #[default]
    Straight,
    Iambic,
    IambicB,
    Keyboard,
}

impl FromStr for CwInput {
    type Err = RigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "straight" => Ok(CwInput::Straight),
            "iambic" => Ok(CwInput::Iambic),
            "iambicb" => Ok(CwInput::IambicB),
            "keyboard" => Ok(CwInput::Keyboard),
            other => Err(RigError(format!("unknown CW input: {other}"))),
        }
    }
}

/// How much of an FT8 QSO the modem runs without the operator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Ft8Mode {
    #[default]
    Manual,
    Semi,
    Auto,
}

impl FromStr for Ft8Mode {
    type Err = RigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(Ft8Mode::Manual),
            "semi" => Ok(Ft8Mode::Semi),
            "auto" => Ok(Ft8Mode::Auto),
            other => Err(RigError(format!("unknown FT8 mode: {other}"))),
        }
    }
}

/// Conditioning controls shared by every receiver, copied wholesale to the
/// audio thread whenever one of them changes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DspSettings {
    pub notch_enabled: bool,
    /// Audio frequency of the notch centre.
    pub notch_freq: f32,
    pub notch_bandwidth: f32,
    pub anr_enabled: bool,
    /// Enables the spectral noise gate.
    pub dsp_enabled: bool,
    /// Gate level above the estimated noise floor, in dB (0..=30).
    pub noise_threshold: i32,
    /// Blocks averaged into each noise floor estimate.
    pub noise_update_interval: u32,
    /// Fixed compression level, 0 disables.
    pub compression_control_level: u8,
    /// Microphone gain, percent.
    pub input_volume: u8,
    /// Voice monitor level while transmitting, percent.
    pub txmon_control_level: u8,
}

impl Default for DspSettings {
    fn default() -> Self {
        Self {
            notch_enabled: false,
            notch_freq: 1000.0,
            notch_bandwidth: 100.0,
            anr_enabled: false,
            dsp_enabled: false,
            noise_threshold: 6,
            noise_update_interval: 20,
            compression_control_level: 0,
            input_volume: 100,
            txmon_control_level: 0,
        }
    }
}

/// Status of a single receiver as reported to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiverStatus {
    pub id: u32,
    pub freq_hz: f64,
    pub tuned_bin: usize,
    pub mode: Mode,
    pub low_hz: i32,
    pub high_hz: i32,
    pub agc: AgcSpeed,
    pub output: RxOutput,
}

/// Point-in-time view of the whole radio.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RadioSnapshot {
    pub freq: Freq,
    pub lo_hz: i64,
    pub bfo_offset_hz: i32,
    pub tx: bool,
    pub tx_trigger: TxTrigger,
    pub tx_mode: Mode,
    pub pitch_hz: u32,
    pub volume: u8,
    pub rx_gain_db: f32,
    pub modulation_peak: f32,
    pub settings: DspSettings,
    pub receivers: Vec<ReceiverStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_codes_are_stable() {
        assert_eq!(Mode::USB.code(), Some(0));
        assert_eq!(Mode::TwoTone.code(), Some(10));
        assert_eq!(Mode::Calibrate.code(), Some(11));
        assert_eq!(Mode::FM.code(), Some(12));
        assert_eq!(Mode::Other("SSTV".into()).code(), None);
        for mode in Mode::ALL {
            let code = mode.code().unwrap();
            assert_eq!(Mode::from_code(code), mode);
        }
        assert_eq!(Mode::from_code(42), Mode::Other("42".into()));
    }

    #[test]
    fn mode_names_parse_case_insensitively() {
        assert_eq!("usb".parse::<Mode>().unwrap(), Mode::USB);
        assert_eq!("2tone".parse::<Mode>().unwrap(), Mode::TwoTone);
        assert_eq!("Calibrate".parse::<Mode>().unwrap(), Mode::Calibrate);
        assert_eq!("sstv".parse::<Mode>().unwrap(), Mode::Other("SSTV".into()));
        assert_eq!(Mode::TwoTone.to_string(), "2TONE");
    }

    #[test]
    fn mode_serde_uses_wire_names() {
        assert_eq!(serde_json::to_string(&Mode::TwoTone).unwrap(), "\"2TONE\"");
        let mode: Mode = serde_json::from_str("\"CALIBRATE\"").unwrap();
        assert_eq!(mode, Mode::Calibrate);
    }

    #[test]
    fn tx_trigger_round_trips_through_u8() {
        for trigger in [TxTrigger::Off, TxTrigger::Ptt, TxTrigger::Soft] {
            assert_eq!(TxTrigger::from_u8(trigger.as_u8()), trigger);
        }
        assert_eq!(TxTrigger::from_u8(200), TxTrigger::Off);
    }

    #[test]
    fn agc_speed_rejects_unknown() {
        assert_eq!("MED".parse::<AgcSpeed>().unwrap(), AgcSpeed::Medium);
        assert!("turbo".parse::<AgcSpeed>().is_err());
    }
}
