// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::f32::consts::TAU;

use num_complex::Complex;

use crate::SAMPLE_RATE;

/// FM quadrature discriminator: instantaneous frequency via
/// `arg(s[n] * conj(s[n-1]))`, scaled so that the peak deviation maps to
/// full scale. A zero deviation yields silence instead of dividing by zero.
#[derive(Debug, Clone, PartialEq)]
pub struct FmDiscriminator {
    prev: Option<Complex<f32>>,
    gain: f32,
}

impl FmDiscriminator {
    pub fn new(deviation_hz: f32) -> Self {
        let gain = if deviation_hz > 0.0 && deviation_hz.is_finite() {
            SAMPLE_RATE as f32 / (TAU * deviation_hz)
        } else {
            0.0
        };
        Self { prev: None, gain }
    }

    pub(super) fn demodulate(&mut self, input: &[Complex<f32>], output: &mut [f32]) {
        for (out, &sample) in output.iter_mut().zip(input.iter()) {
            *out = match self.prev {
                Some(prev) => (sample * prev.conj()).arg() * self.gain,
                None => 0.0,
            };
            self.prev = Some(sample);
        }
    }
}
