// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use num_complex::Complex;

use super::DcBlocker;

/// Envelope detector followed by a DC blocker to strip the carrier level.
#[derive(Debug, Clone, PartialEq)]
pub struct AmDetector {
    dc: DcBlocker,
}

impl AmDetector {
    pub fn new() -> Self {
        Self {
            dc: DcBlocker::new(0.999),
        }
    }

    pub(super) fn demodulate(&mut self, input: &[Complex<f32>], output: &mut [f32]) {
        for (out, sample) in output.iter_mut().zip(input.iter()) {
            *out = self.dc.process(sample.norm());
        }
    }
}

impl Default for AmDetector {
    fn default() -> Self {
        Self::new()
    }
}
