// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Transmit path: microphone, keyed CW or modem audio is modulated onto a
//! carrier inside the IF band.

use std::f32::consts::{PI, TAU};

use num_complex::Complex;
use serde::{Deserialize, Serialize};
use trx_core::{DspSettings, Mode};

use crate::demod::{TestPattern, FM_DEVIATION_HZ, NBFM_DEVIATION_HZ};
use crate::dsp::conditioning::apply_fixed_compression;
use crate::dsp::filter::{Filter, DEFAULT_KAISER_BETA};
use crate::dsp::{alloc_zeroed, ZERO};
use crate::error::DspError;
use crate::modem::Modem;
use crate::rx::{bin_for_freq, default_passband, DEFAULT_IF_HZ, DEFAULT_PITCH_HZ};
use crate::vfo::{PhaseTable, Vfo};
use crate::{BLOCK_SIZE, SAMPLE_RATE};

/// CW envelope rise and fall time, seconds.
const CW_RAMP_SECS: f32 = 0.005;
/// Sidetone level on the speaker while keying.
const SIDETONE_LEVEL: f32 = 0.25;
/// Decay of the modulation peak meter per block.
const MODULATION_DECAY: f32 = 0.9;
const CALIBRATE_LEVEL: f32 = 0.9;
/// Upper audio frequency kept by AM and FM.
const VOICE_BANDWIDTH_HZ: f32 = 3000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TxConfig {
    pub mode: Mode,
    /// Carrier position within the IF, Hz.
    pub freq_hz: f64,
    pub pitch_hz: u32,
}

impl Default for TxConfig {
    fn default() -> Self {
        Self {
            mode: Mode::USB,
            freq_hz: DEFAULT_IF_HZ,
            pitch_hz: DEFAULT_PITCH_HZ,
        }
    }
}

fn modulation_meter(held: f32, samples: &[f32], scale_up: f32) -> f32 {
    let peak = samples.iter().fold(0.0_f32, |m, s| m.max(s.abs())) * scale_up;
    peak.max(held * MODULATION_DECAY)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Modulation {
    Sideband,
    Am,
    Fm(f32),
    Cw,
    Carrier,
    Silent,
}

impl Modulation {
    fn for_mode(mode: &Mode) -> Self {
        match mode {
            Mode::CW | Mode::CWR => Self::Cw,
            Mode::AM => Self::Am,
            Mode::FM => Self::Fm(FM_DEVIATION_HZ),
            Mode::NBFM => Self::Fm(NBFM_DEVIATION_HZ),
            Mode::Calibrate => Self::Carrier,
            Mode::Other(_) => Self::Silent,
            _ => Self::Sideband,
        }
    }
}

/// Builds one block of transmit samples at a time.
///
/// Constructed on the control thread with its filter designed; a change of
/// mode, frequency or pitch replaces the whole transmitter.
pub struct Transmitter {
    config: TxConfig,
    modulation: Modulation,
    carrier: Vfo,
    cw_tone: Vfo,
    sidetone: Vfo,
    pattern: Option<TestPattern>,
    filter: Filter,
    source: Vec<f32>,
    baseband: Vec<Complex<f32>>,
    filtered: Vec<Complex<f32>>,
    output: Vec<f32>,
    monitor: Vec<f32>,
    cw_envelope: f32,
    fm_phase: f32,
    modulation_peak: f32,
}

impl Transmitter {
    pub fn new(config: &TxConfig) -> Result<Self, DspError> {
        bin_for_freq(config.freq_hz)?;
        let carrier_hz = config.freq_hz.round() as i32;
        let pitch = config.pitch_hz as i32;
        let cw_offset = if config.mode == Mode::CWR { -pitch } else { pitch };

        let modulation = Modulation::for_mode(&config.mode);

        let mut filter = Filter::new(BLOCK_SIZE, BLOCK_SIZE + 1)?;
        match modulation {
            Modulation::Am | Modulation::Fm(_) => {
                filter.tune(-VOICE_BANDWIDTH_HZ, VOICE_BANDWIDTH_HZ, DEFAULT_KAISER_BETA)?
            }
            _ => {
                let (low, high) = default_passband(&config.mode, config.pitch_hz);
                filter.tune(low as f32, high as f32, DEFAULT_KAISER_BETA)?
            }
        }

        let pattern = match config.mode {
            Mode::TwoTone => Some(TestPattern::two_tone()),
            _ => None,
        };

        Ok(Self {
            config: config.clone(),
            modulation,
            carrier: Vfo::new(carrier_hz, 0),
            cw_tone: Vfo::new(carrier_hz + cw_offset, 0),
            sidetone: Vfo::new(pitch, 0),
            pattern,
            filter,
            source: alloc_zeroed(BLOCK_SIZE)?,
            baseband: alloc_zeroed(BLOCK_SIZE)?,
            filtered: alloc_zeroed(BLOCK_SIZE)?,
            output: alloc_zeroed(BLOCK_SIZE)?,
            monitor: alloc_zeroed(BLOCK_SIZE)?,
            cw_envelope: 0.0,
            fm_phase: 0.0,
            modulation_peak: 0.0,
        })
    }

    pub fn config(&self) -> &TxConfig {
        &self.config
    }

    pub fn mode(&self) -> &Mode {
        &self.config.mode
    }

    /// Audio to mix into the speaker while transmitting.
    pub fn monitor(&self) -> &[f32] {
        &self.monitor
    }

    pub fn modulation_peak(&self) -> f32 {
        self.modulation_peak
    }

    /// Forget filter history and ramps, e.g. after a flush.
    pub fn reset(&mut self) {
        self.filter.reset();
        self.cw_envelope = 0.0;
        self.fm_phase = 0.0;
        self.modulation_peak = 0.0;
    }

    /// Peak meter over the transmitted samples, held and slowly released.
    pub fn sdr_modulation_update(&mut self, samples: &[f32], scale_up: f32) {
        self.modulation_peak = modulation_meter(self.modulation_peak, samples, scale_up);
    }

    /// Produce one block of transmit samples.
    ///
    /// `mic` holds normalised microphone samples; `key_down` is the keyer
    /// state for CW modes.
    pub fn process(
        &mut self,
        table: &PhaseTable,
        mic: &[f32],
        key_down: bool,
        modem: &mut dyn Modem,
        settings: &DspSettings,
    ) -> &[f32] {
        let len = mic.len().min(BLOCK_SIZE);

        match self.modulation {
            Modulation::Cw => self.key_cw(table, key_down, len),
            Modulation::Carrier => {
                for out in self.output[..len].iter_mut() {
                    *out = CALIBRATE_LEVEL * self.carrier.read(table);
                }
                self.monitor[..len].fill(0.0);
            }
            Modulation::Silent => {
                self.output[..len].fill(0.0);
                self.monitor[..len].fill(0.0);
            }
            voice => {
                self.fill_source(table, mic, modem, settings, len);
                self.voice_monitor(settings, len);
                match voice {
                    Modulation::Am => self.modulate_am(table, len),
                    Modulation::Fm(deviation) => self.modulate_fm(table, deviation, len),
                    _ => self.modulate_sideband(table, len),
                }
            }
        }

        self.modulation_peak = modulation_meter(self.modulation_peak, &self.output[..len], 1.0);
        &self.output[..len]
    }

    fn fill_source(
        &mut self,
        table: &PhaseTable,
        mic: &[f32],
        modem: &mut dyn Modem,
        settings: &DspSettings,
        len: usize,
    ) {
        let mode = &self.config.mode;
        let source = &mut self.source[..len];
        if mode.is_digital() {
            for s in source.iter_mut() {
                *s = modem.modem_next_sample(mode).clamp(-1.0, 1.0);
            }
        } else if let Some(pattern) = self.pattern.as_mut() {
            for s in source.iter_mut() {
                *s = pattern.next(table);
            }
        } else {
            let gain = f32::from(settings.input_volume) / 100.0;
            for (s, m) in source.iter_mut().zip(mic.iter()) {
                *s = (m * gain).clamp(-1.0, 1.0);
            }
            apply_fixed_compression(source, settings.compression_control_level);
        }
    }

    fn voice_monitor(&mut self, settings: &DspSettings, len: usize) {
        let level = f32::from(settings.txmon_control_level.min(100)) / 100.0;
        for (m, s) in self.monitor[..len].iter_mut().zip(self.source.iter()) {
            *m = s * level;
        }
    }

    fn bandlimit(&mut self, len: usize) {
        for (b, s) in self.baseband[..len].iter_mut().zip(self.source.iter()) {
            *b = Complex::new(*s, 0.0);
        }
        self.filtered[..len].fill(ZERO);
        self.filter
            .process_block(&self.baseband[..len], &mut self.filtered[..len]);
    }

    fn modulate_sideband(&mut self, table: &PhaseTable, len: usize) {
        self.bandlimit(len);
        // the filter kept one side of the spectrum at half amplitude
        for (out, z) in self.output[..len].iter_mut().zip(self.filtered.iter()) {
            *out = (2.0 * (z * self.carrier.read_complex(table)).re).clamp(-1.0, 1.0);
        }
    }

    fn modulate_am(&mut self, table: &PhaseTable, len: usize) {
        self.bandlimit(len);
        for (out, z) in self.output[..len].iter_mut().zip(self.filtered.iter()) {
            let envelope = 0.5 + 0.5 * z.re.clamp(-1.0, 1.0);
            *out = envelope * self.carrier.read(table);
        }
    }

    fn modulate_fm(&mut self, table: &PhaseTable, deviation_hz: f32, len: usize) {
        self.bandlimit(len);
        let step = TAU * deviation_hz / SAMPLE_RATE as f32;
        for (out, z) in self.output[..len].iter_mut().zip(self.filtered.iter()) {
            self.fm_phase += step * z.re.clamp(-1.0, 1.0);
            if self.fm_phase > PI {
                self.fm_phase -= TAU;
            } else if self.fm_phase < -PI {
                self.fm_phase += TAU;
            }
            let carrier = self.carrier.read_complex(table);
            *out = (carrier * Complex::from_polar(1.0, self.fm_phase)).im;
        }
    }

    fn key_cw(&mut self, table: &PhaseTable, key_down: bool, len: usize) {
        let step = 1.0 / (CW_RAMP_SECS * SAMPLE_RATE as f32);
        let target = if key_down { 1.0 } else { 0.0 };
        for (out, mon) in self.output[..len]
            .iter_mut()
            .zip(self.monitor[..len].iter_mut())
        {
            if self.cw_envelope < target {
                self.cw_envelope = (self.cw_envelope + step).min(1.0);
            } else if self.cw_envelope > target {
                self.cw_envelope = (self.cw_envelope - step).max(0.0);
            }
            let shaped = 0.5 * (1.0 - (PI * self.cw_envelope).cos());
            *out = shaped * self.cw_tone.read(table);
            *mon = SIDETONE_LEVEL * shaped * self.sidetone.read(table);
        }
    }
}

impl std::fmt::Debug for Transmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transmitter")
            .field("config", &self.config)
            .field("filter", &self.filter)
            .field("modulation_peak", &self.modulation_peak)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modem::NullModem;

    fn tone(freq_hz: f64, amplitude: f32, start: usize, len: usize) -> Vec<f32> {
        (start..start + len)
            .map(|n| {
                let phase = std::f64::consts::TAU * freq_hz * n as f64 / f64::from(SAMPLE_RATE);
                amplitude * phase.sin() as f32
            })
            .collect()
    }

    /// Amplitude of the component at `freq_hz`, Hann-weighted.
    fn level_at(samples: &[f32], freq_hz: f64) -> f32 {
        let len = samples.len() as f64;
        let (mut re, mut im, mut wsum) = (0.0_f64, 0.0_f64, 0.0_f64);
        for (n, &s) in samples.iter().enumerate() {
            let w = 0.5 - 0.5 * (std::f64::consts::TAU * n as f64 / len).cos();
            let phase = std::f64::consts::TAU * freq_hz * n as f64 / f64::from(SAMPLE_RATE);
            re += f64::from(s) * w * phase.cos();
            im += f64::from(s) * w * phase.sin();
            wsum += w;
        }
        (2.0 * (re * re + im * im).sqrt() / wsum) as f32
    }

    fn transmit(config: &TxConfig, mic_hz: f64, key_down: bool, blocks: usize) -> Vec<f32> {
        let table = PhaseTable::new();
        let mut tx = Transmitter::new(config).unwrap();
        let settings = DspSettings::default();
        let mut out = Vec::new();
        for block in 0..blocks {
            let mic = tone(mic_hz, 0.5, block * BLOCK_SIZE, BLOCK_SIZE);
            out.extend_from_slice(tx.process(&table, &mic, key_down, &mut NullModem, &settings));
        }
        out
    }

    fn carrier_hz(config: &TxConfig) -> f64 {
        let vfo = Vfo::new(config.freq_hz.round() as i32, 0);
        f64::from(vfo.phase_increment()) * f64::from(SAMPLE_RATE)
            / crate::vfo::MAX_PHASE_COUNT as f64
    }

    #[test]
    fn rejects_carrier_outside_if() {
        let config = TxConfig {
            freq_hz: 25_000.0,
            ..TxConfig::default()
        };
        assert!(matches!(
            Transmitter::new(&config),
            Err(DspError::InvalidTuning(_))
        ));
    }

    #[test]
    fn usb_places_tone_above_carrier() {
        let config = TxConfig::default();
        let out = transmit(&config, 1000.0, false, 8);
        let tail = &out[4 * BLOCK_SIZE..];
        let fc = carrier_hz(&config);
        let wanted = level_at(tail, fc + 1000.0);
        let image = level_at(tail, fc - 1000.0);
        assert!((wanted - 0.5).abs() < 0.05, "wanted {wanted}");
        assert!(image < wanted * 0.01, "image {image}");
    }

    #[test]
    fn lsb_places_tone_below_carrier() {
        let config = TxConfig {
            mode: Mode::LSB,
            ..TxConfig::default()
        };
        let out = transmit(&config, 1000.0, false, 8);
        let tail = &out[4 * BLOCK_SIZE..];
        let fc = carrier_hz(&config);
        assert!(level_at(tail, fc - 1000.0) > 0.4);
        assert!(level_at(tail, fc + 1000.0) < 0.005);
    }

    #[test]
    fn cw_keys_with_ramps() {
        let table = PhaseTable::new();
        let config = TxConfig {
            mode: Mode::CW,
            ..TxConfig::default()
        };
        let mut tx = Transmitter::new(&config).unwrap();
        let settings = DspSettings::default();
        let silence = vec![0.0; BLOCK_SIZE];

        let first = tx
            .process(&table, &silence, true, &mut NullModem, &settings)
            .to_vec();
        // the ramp starts from zero
        assert!(first[0].abs() < 1e-3);
        let fc = carrier_hz(&config) + 700.0;
        let level = level_at(&first[512..], fc);
        assert!((level - 1.0).abs() < 0.05, "keyed level {level}");
        assert!(tx.monitor().iter().any(|s| s.abs() > 0.2));

        let second = tx
            .process(&table, &silence, false, &mut NullModem, &settings)
            .to_vec();
        assert!(second[300..].iter().all(|s| *s == 0.0));
        assert!(tx.modulation_peak() > 0.9);
    }

    #[test]
    fn am_keeps_carrier() {
        let config = TxConfig {
            mode: Mode::AM,
            ..TxConfig::default()
        };
        let out = transmit(&config, 1000.0, false, 8);
        let tail = &out[4 * BLOCK_SIZE..];
        let fc = carrier_hz(&config);
        let carrier = level_at(tail, fc);
        let upper = level_at(tail, fc + 1000.0);
        assert!((carrier - 0.5).abs() < 0.05, "carrier {carrier}");
        assert!((upper - 0.125).abs() < 0.02, "sideband {upper}");
    }

    #[test]
    fn voice_monitor_follows_level() {
        let table = PhaseTable::new();
        let mut tx = Transmitter::new(&TxConfig::default()).unwrap();
        let mic = tone(1000.0, 0.5, 0, BLOCK_SIZE);
        let muted = DspSettings::default();
        tx.process(&table, &mic, false, &mut NullModem, &muted);
        assert!(tx.monitor().iter().all(|s| *s == 0.0));

        let half = DspSettings {
            txmon_control_level: 50,
            ..DspSettings::default()
        };
        tx.process(&table, &mic, false, &mut NullModem, &half);
        let peak = tx.monitor().iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!((peak - 0.25).abs() < 0.01, "monitor {peak}");
    }

    #[test]
    fn modulation_meter_holds_and_releases() {
        let mut tx = Transmitter::new(&TxConfig::default()).unwrap();
        tx.sdr_modulation_update(&[0.1, -0.4, 0.2], 2.0);
        assert!((tx.modulation_peak() - 0.8).abs() < 1e-6);
        tx.sdr_modulation_update(&[0.0], 1.0);
        assert!((tx.modulation_peak() - 0.72).abs() < 1e-6);
    }

    #[test]
    fn unknown_mode_transmits_silence() {
        let config = TxConfig {
            mode: Mode::Other("SSTV".into()),
            ..TxConfig::default()
        };
        let out = transmit(&config, 1000.0, true, 2);
        assert!(out.iter().all(|s| *s == 0.0));
    }
}
