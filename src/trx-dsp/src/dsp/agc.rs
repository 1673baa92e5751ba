// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use trx_core::AgcSpeed;

/// Peak level the AGC steers its output toward.
pub const AGC_TARGET: f32 = 0.5;
/// Gain cap, 60 dB.
pub const AGC_MAX_GAIN: f32 = 1000.0;
/// Input peaks below this count as noise when computing the wanted gain.
pub const AGC_DEFAULT_THRESHOLD: f32 = 1e-3;
/// Fraction of the gap to the wanted gain closed per block when attacking.
const AGC_ATTACK: f32 = 0.5;
/// Smoothing of the displayed signal average.
const AVG_COEFF: f32 = 0.1;

/// Hang time in blocks and recovery rate in dB per block.
fn speed_params(speed: AgcSpeed) -> (u32, f32) {
    match speed {
        AgcSpeed::Off => (0, 0.0),
        AgcSpeed::Slow => (48, 0.5),
        AgcSpeed::Medium => (24, 1.0),
        AgcSpeed::Fast => (6, 3.0),
    }
}

/// Block automatic gain control with attack, hang and decay.
///
/// Gain drops within a few blocks when a louder signal appears, is held for
/// `agc_speed` dependent hang blocks after the signal goes away, then rises
/// again at `agc_decay_rate` dB per block until the wanted gain is reached.
#[derive(Debug, Clone, PartialEq)]
pub struct Agc {
    pub agc_speed: AgcSpeed,
    pub agc_gain: f32,
    /// Held input peak used for the S-meter.
    pub signal_strength: f32,
    pub signal_avg: f32,
    pub agc_threshold: f32,
    pub agc_decay_rate: f32,
    /// Hang blocks left before the gain may rise.
    pub agc_loop: u32,
}

impl Agc {
    pub fn new(speed: AgcSpeed) -> Self {
        let mut agc = Self {
            agc_speed: speed,
            agc_gain: 1.0,
            signal_strength: 0.0,
            signal_avg: 0.0,
            agc_threshold: AGC_DEFAULT_THRESHOLD,
            agc_decay_rate: 0.0,
            agc_loop: 0,
        };
        agc.set_speed(speed);
        agc
    }

    pub fn set_speed(&mut self, speed: AgcSpeed) {
        self.agc_speed = speed;
        self.agc_decay_rate = speed_params(speed).1;
        self.agc_loop = 0;
        if speed == AgcSpeed::Off {
            self.agc_gain = 1.0;
        }
    }

    pub fn reset(&mut self) {
        *self = Agc::new(self.agc_speed);
    }

    /// Scale `samples` in place and return the gain reached at block end.
    ///
    /// The gain ramps linearly from the previous block's value to avoid
    /// zipper noise; output is clamped to full scale.
    pub fn process_block(&mut self, samples: &mut [f32]) -> f32 {
        let peak = samples.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        self.signal_avg += AVG_COEFF * (peak - self.signal_avg);

        let start_gain = self.agc_gain;
        if self.agc_speed == AgcSpeed::Off {
            self.signal_strength = peak;
        } else {
            let (hang, _) = speed_params(self.agc_speed);
            let wanted = (AGC_TARGET / peak.max(self.agc_threshold)).min(AGC_MAX_GAIN);
            if wanted < self.agc_gain {
                self.agc_gain += AGC_ATTACK * (wanted - self.agc_gain);
                self.signal_strength = self.signal_strength.max(peak);
                self.agc_loop = hang;
            } else if self.agc_loop > 0 {
                self.agc_loop -= 1;
            } else {
                let step = 10.0_f32.powf(self.agc_decay_rate / 20.0);
                self.agc_gain = (self.agc_gain * step).min(wanted);
                self.signal_strength = peak;
            }
        }

        let len = samples.len().max(1) as f32;
        let delta = (self.agc_gain - start_gain) / len;
        for (i, s) in samples.iter_mut().enumerate() {
            let gain = start_gain + delta * (i + 1) as f32;
            *s = (*s * gain).clamp(-1.0, 1.0);
        }
        self.agc_gain
    }
}
