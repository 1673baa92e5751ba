// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Post-selection conditioning: notch, spectral noise gate, adaptive noise
//! reduction and fixed compression. The receiver applies them in the order
//! notch, filter, gate, demodulation, AGC, ANR, compression.

use std::f32::consts::PI;

use num_complex::Complex;

use super::bin_freq;
use crate::error::DspError;

/// Highest accepted noise threshold control, dB.
pub const MAX_NOISE_THRESHOLD: i32 = 30;
/// Residual gain of gated bins.
const GATE_FLOOR: f32 = 0.05;
/// Fraction of passband bins treated as noise when estimating the floor.
const NOISE_PERCENTILE: f32 = 0.25;
/// Bins whose filter response falls below this are outside the passband.
const PASSBAND_EDGE: f32 = 0.5;

pub const ANR_TAPS: usize = 32;
pub const ANR_DELAY: usize = 16;
const ANR_MU: f32 = 0.05;
const ANR_LEAK: f32 = 0.9999;

/// Linear multiplier for a noise threshold control value in dB.
pub fn scale_noise_threshold(control: i32) -> f32 {
    10.0_f32.powf(control.clamp(0, MAX_NOISE_THRESHOLD) as f32 / 20.0)
}

/// Fill `mask` with a notch at `centre_hz` of `width_hz`, with raised
/// cosine skirts half the notch width on each side. With `mirrored` the
/// notch also covers `-centre_hz`. A non-positive width leaves the mask
/// all-pass.
pub fn build_notch_mask(mask: &mut [f32], centre_hz: f32, width_hz: f32, mirrored: bool) {
    let n = mask.len();
    mask.fill(1.0);
    if width_hz <= 0.0 || !width_hz.is_finite() || !centre_hz.is_finite() {
        return;
    }
    let half = width_hz / 2.0;
    let skirt = half.max(2.0 * crate::BIN_HZ);
    let depth = |d: f32| -> f32 {
        if d <= half {
            0.0
        } else if d < half + skirt {
            0.5 * (1.0 - (PI * (d - half) / skirt).cos())
        } else {
            1.0
        }
    };
    for (k, m) in mask.iter_mut().enumerate() {
        let f = bin_freq(k, n);
        let mut gain = depth((f - centre_hz).abs());
        if mirrored {
            gain = gain.min(depth((f + centre_hz).abs()));
        }
        *m = gain;
    }
}

/// Frequency-domain gate that attenuates bins close to the noise floor.
///
/// The floor is a low percentile of the passband bin magnitudes, averaged
/// over `interval` blocks before it replaces the previous estimate.
#[derive(Debug, Clone)]
pub struct NoiseGate {
    magnitudes: Vec<f32>,
    accum: f32,
    blocks: u32,
    floor: Option<f32>,
}

impl NoiseGate {
    pub fn new(bins: usize) -> Result<Self, DspError> {
        Ok(Self {
            magnitudes: super::alloc_zeroed(bins)?,
            accum: 0.0,
            blocks: 0,
            floor: None,
        })
    }

    pub fn floor(&self) -> Option<f32> {
        self.floor
    }

    pub fn reset(&mut self) {
        self.accum = 0.0;
        self.blocks = 0;
        self.floor = None;
    }

    pub fn process(
        &mut self,
        bins: &mut [Complex<f32>],
        response: &[Complex<f32>],
        threshold: f32,
        interval: u32,
    ) {
        let mut count = 0;
        for (bin, h) in bins.iter().zip(response.iter()) {
            if h.norm_sqr() >= PASSBAND_EDGE * PASSBAND_EDGE && count < self.magnitudes.len() {
                self.magnitudes[count] = bin.norm();
                count += 1;
            }
        }
        if count == 0 {
            return;
        }

        let rank = ((count as f32 * NOISE_PERCENTILE) as usize).min(count - 1);
        let in_band = &mut self.magnitudes[..count];
        let (_, level, _) = in_band.select_nth_unstable_by(rank, f32::total_cmp);
        self.accum += *level;
        self.blocks += 1;
        if self.blocks >= interval.max(1) {
            self.floor = Some(self.accum / self.blocks as f32);
            self.accum = 0.0;
            self.blocks = 0;
        }

        let Some(floor) = self.floor else {
            return;
        };
        let gate = floor * threshold;
        for (bin, h) in bins.iter_mut().zip(response.iter()) {
            if h.norm_sqr() >= PASSBAND_EDGE * PASSBAND_EDGE && bin.norm() < gate {
                *bin *= GATE_FLOOR;
            }
        }
    }
}

/// Adaptive noise reduction: a normalised LMS line enhancer that predicts
/// each sample from a delayed history. Periodic components (speech
/// harmonics, carriers) are predictable and pass; white noise is not.
#[derive(Debug, Clone)]
pub struct Anr {
    weights: [f32; ANR_TAPS],
    history: [f32; ANR_DELAY + ANR_TAPS],
}

impl Default for Anr {
    fn default() -> Self {
        Self {
            weights: [0.0; ANR_TAPS],
            history: [0.0; ANR_DELAY + ANR_TAPS],
        }
    }
}

impl Anr {
    pub fn reset(&mut self) {
        *self = Anr::default();
    }

    pub fn process_block(&mut self, samples: &mut [f32]) {
        for s in samples.iter_mut() {
            let x = *s;
            let reference = &self.history[ANR_DELAY..];
            let y: f32 = self
                .weights
                .iter()
                .zip(reference.iter())
                .map(|(w, r)| w * r)
                .sum();
            let power: f32 = reference.iter().map(|r| r * r).sum();
            let err = x - y;
            let step = ANR_MU * err / (power + 1e-6);
            for (w, r) in self.weights.iter_mut().zip(reference.iter()) {
                *w = ANR_LEAK * *w + step * r;
            }
            self.history.copy_within(0..ANR_DELAY + ANR_TAPS - 1, 1);
            self.history[0] = x;
            *s = y;
        }
    }
}

/// Threshold (dBFS) and ratio for a compression level.
fn compression_params(level: u8) -> (f32, f32) {
    let level = f32::from(level.min(10));
    (-2.0 * level, 1.0 + 0.5 * level)
}

/// Static compression curve applied in place. Level 0 bypasses; levels
/// 1..=10 lower the threshold and raise the ratio, with makeup gain so
/// that full scale stays near full scale.
pub fn apply_fixed_compression(samples: &mut [f32], level: u8) {
    if level == 0 {
        return;
    }
    let (threshold_db, ratio) = compression_params(level);
    let threshold = 10.0_f32.powf(threshold_db / 20.0);
    let makeup = 10.0_f32.powf(-threshold_db * (1.0 - 1.0 / ratio) / 20.0);
    for s in samples.iter_mut() {
        let mag = s.abs();
        let gain = if mag > threshold {
            let over_db = 20.0 * (mag / threshold).log10();
            10.0_f32.powf(-over_db * (1.0 - 1.0 / ratio) / 20.0)
        } else {
            1.0
        };
        *s = (*s * gain * makeup).clamp(-1.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MAX_BINS;
    use std::f32::consts::TAU;

    fn assert_approx_eq(a: f32, b: f32, tol: f32, label: &str) {
        assert!(
            (a - b).abs() <= tol,
            "{}: expected {} ~ {} (tol {})",
            label,
            a,
            b,
            tol
        );
    }

    #[test]
    fn noise_threshold_scale_clamps() {
        assert_approx_eq(scale_noise_threshold(0), 1.0, 1e-6, "0 dB");
        assert_approx_eq(scale_noise_threshold(20), 10.0, 1e-4, "20 dB");
        assert_eq!(scale_noise_threshold(-5), scale_noise_threshold(0));
        assert_eq!(scale_noise_threshold(99), scale_noise_threshold(30));
    }

    #[test]
    fn notch_mask_shape() {
        let mut mask = vec![0.0; MAX_BINS];
        build_notch_mask(&mut mask, 1000.0, 200.0, false);
        let bin = |hz: f32| (hz / crate::BIN_HZ).round() as usize;
        assert_eq!(mask[bin(1000.0)], 0.0);
        assert_eq!(mask[bin(3000.0)], 1.0);
        // the mirror image is untouched unless asked for
        assert_eq!(mask[MAX_BINS - bin(1000.0)], 1.0);
        let skirt = mask[bin(1150.0)];
        assert!(skirt > 0.0 && skirt < 1.0, "skirt {skirt}");

        build_notch_mask(&mut mask, 1000.0, 200.0, true);
        assert_eq!(mask[MAX_BINS - bin(1000.0)], 0.0);

        build_notch_mask(&mut mask, 1000.0, 0.0, true);
        assert!(mask.iter().all(|m| *m == 1.0));
    }

    #[test]
    fn gate_keeps_strong_bins() {
        let n = 64;
        let mut gate = NoiseGate::new(n).unwrap();
        let response = vec![Complex::new(1.0, 0.0); n];
        let mut bins = vec![Complex::new(0.0, 0.0); n];
        for _ in 0..4 {
            for (k, b) in bins.iter_mut().enumerate() {
                *b = Complex::new(if k == 10 { 50.0 } else { 1.0 + (k % 3) as f32 * 0.1 }, 0.0);
            }
            gate.process(&mut bins, &response, scale_noise_threshold(6), 2);
        }
        let floor = gate.floor().unwrap();
        assert_approx_eq(floor, 1.0, 0.11, "floor");
        assert_approx_eq(bins[10].re, 50.0, 1e-4, "carrier");
        assert!(bins[0].re < 0.1, "noise bin kept at {}", bins[0].re);
    }

    #[test]
    fn gate_ignores_bins_outside_passband() {
        let n = 16;
        let mut gate = NoiseGate::new(n).unwrap();
        let mut response = vec![Complex::new(0.0, 0.0); n];
        response[..8].fill(Complex::new(1.0, 0.0));
        let mut bins = vec![Complex::new(1.0, 0.0); n];
        gate.process(&mut bins, &response, 2.0, 1);
        assert!(bins[..8].iter().all(|b| b.re < 0.1));
        assert!(bins[8..].iter().all(|b| b.re == 1.0));
    }

    #[test]
    fn anr_passes_tones() {
        let mut anr = Anr::default();
        let mut block: Vec<f32> = (0..20_000)
            .map(|n| 0.5 * (TAU * 700.0 * n as f32 / 48_000.0).sin())
            .collect();
        let input = block.clone();
        anr.process_block(&mut block);
        let tail = 19_000..20_000;
        let err: f32 = tail
            .clone()
            .map(|n| (block[n] - input[n]).powi(2))
            .sum::<f32>()
            / 1000.0;
        assert!(err.sqrt() < 0.05, "rms error {}", err.sqrt());
    }

    #[test]
    fn anr_suppresses_white_noise() {
        let mut state = 12345_u32;
        let mut block: Vec<f32> = (0..20_000)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 8) as f32 / (1u32 << 24) as f32 - 0.5
            })
            .collect();
        let rms_in = (block.iter().map(|s| s * s).sum::<f32>() / block.len() as f32).sqrt();
        let mut anr = Anr::default();
        anr.process_block(&mut block);
        let rms_out = (block[10_000..].iter().map(|s| s * s).sum::<f32>() / 10_000.0).sqrt();
        assert!(rms_out < 0.5 * rms_in, "in {rms_in} out {rms_out}");
    }

    #[test]
    fn compression_levels() {
        let mut bypass = vec![0.3, -0.9];
        apply_fixed_compression(&mut bypass, 0);
        assert_eq!(bypass, vec![0.3, -0.9]);

        let (threshold_db, ratio) = compression_params(5);
        let threshold = 10.0_f32.powf(threshold_db / 20.0);
        let makeup = 10.0_f32.powf(-threshold_db * (1.0 - 1.0 / ratio) / 20.0);

        let mut quiet = vec![0.05];
        apply_fixed_compression(&mut quiet, 5);
        assert_approx_eq(quiet[0], 0.05 * makeup, 1e-5, "below threshold");

        let mut loud = vec![1.0, -1.0];
        apply_fixed_compression(&mut loud, 5);
        assert_approx_eq(loud[0], 1.0, 1e-4, "full scale");
        assert_approx_eq(loud[1], -1.0, 1e-4, "negative full scale");

        // 6 dB over the threshold comes out 6 / ratio dB over
        let mut over = vec![threshold * 2.0];
        apply_fixed_compression(&mut over, 5);
        let out_db = 20.0 * (over[0] / (threshold * makeup)).log10();
        assert_approx_eq(out_db, 20.0 * 2.0_f32.log10() / ratio, 0.01, "ratio");
    }
}
