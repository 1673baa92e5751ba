// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use num_complex::Complex;

/// Makes up for the half of the power the passband threw away.
pub(super) const SIDEBAND_GAIN: f32 = 2.0;

/// Single-sideband product detector: the channel filter has already kept
/// only one side of the carrier, so the real part is the audio.
pub(super) fn demod_sideband(input: &[Complex<f32>], output: &mut [f32]) {
    for (out, sample) in output.iter_mut().zip(input.iter()) {
        *out = sample.re * SIDEBAND_GAIN;
    }
}
