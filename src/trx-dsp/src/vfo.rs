// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::f64::consts::TAU;

use num_complex::Complex;

use crate::SAMPLE_RATE;

/// Entries in one period of the oscillator lookup tables.
pub const MAX_PHASE_COUNT: usize = 16385;

/// Sine and cosine lookup tables shared by every oscillator.
#[derive(Debug, Clone)]
pub struct PhaseTable {
    sine: Box<[f32]>,
    cosine: Box<[f32]>,
}

impl PhaseTable {
    pub fn new() -> Self {
        let angle = |i: usize| TAU * i as f64 / MAX_PHASE_COUNT as f64;
        Self {
            sine: (0..MAX_PHASE_COUNT).map(|i| angle(i).sin() as f32).collect(),
            cosine: (0..MAX_PHASE_COUNT).map(|i| angle(i).cos() as f32).collect(),
        }
    }

    #[inline]
    pub fn sin(&self, phase: usize) -> f32 {
        self.sine[phase % MAX_PHASE_COUNT]
    }

    #[inline]
    pub fn cos(&self, phase: usize) -> f32 {
        self.cosine[phase % MAX_PHASE_COUNT]
    }
}

impl Default for PhaseTable {
    fn default() -> Self {
        Self::new()
    }
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Table-driven oscillator.
///
/// The phase is an index into [`PhaseTable`] advanced by a fixed increment
/// of `round(freq * MAX_PHASE_COUNT / SAMPLE_RATE)` per sample, so the
/// produced frequency is quantised to `SAMPLE_RATE / MAX_PHASE_COUNT` Hz.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Vfo {
    freq_hz: i32,
    phase: usize,
    phase_increment: i32,
}

impl Vfo {
    pub fn new(freq_hz: i32, start_phase: i32) -> Self {
        let mut vfo = Self::default();
        vfo.start(freq_hz, start_phase);
        vfo
    }

    pub fn start(&mut self, freq_hz: i32, start_phase: i32) {
        self.retune(freq_hz);
        self.phase = i64::from(start_phase).rem_euclid(MAX_PHASE_COUNT as i64) as usize;
    }

    /// Change frequency without a phase discontinuity.
    pub fn retune(&mut self, freq_hz: i32) {
        self.freq_hz = freq_hz;
        self.phase_increment = (f64::from(freq_hz) * MAX_PHASE_COUNT as f64
            / f64::from(SAMPLE_RATE))
        .round() as i32;
    }

    pub fn freq_hz(&self) -> i32 {
        self.freq_hz
    }

    pub fn phase(&self) -> usize {
        self.phase
    }

    pub fn phase_increment(&self) -> i32 {
        self.phase_increment
    }

    /// Samples after which the output repeats exactly.
    pub fn period(&self) -> usize {
        let step = i64::from(self.phase_increment).rem_euclid(MAX_PHASE_COUNT as i64) as usize;
        MAX_PHASE_COUNT / gcd(MAX_PHASE_COUNT, step)
    }

    #[inline]
    fn advance(&mut self) {
        let next = self.phase as i64 + i64::from(self.phase_increment);
        self.phase = next.rem_euclid(MAX_PHASE_COUNT as i64) as usize;
    }

    /// Next real sample.
    #[inline]
    pub fn read(&mut self, table: &PhaseTable) -> f32 {
        let sample = table.sin(self.phase);
        self.advance();
        sample
    }

    /// Next analytic sample, `cos + j sin`.
    #[inline]
    pub fn read_complex(&mut self, table: &PhaseTable) -> Complex<f32> {
        let sample = Complex::new(table.cos(self.phase), table.sin(self.phase));
        self.advance();
        sample
    }
}
