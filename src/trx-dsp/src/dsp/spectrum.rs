// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::sync::{Arc, Mutex};

use num_complex::Complex;
use rustfft::Fft;

use super::window::make_hann_window;
use super::ZERO;
use crate::context::DspContext;
use crate::{BLOCK_SIZE, MAX_BINS};

/// Refresh the display spectrum every this many blocks (~12 Hz).
pub const SPECTRUM_UPDATE_BLOCKS: usize = 4;
/// Weight of the newest frame in the display average.
const SPECTRUM_SMOOTHING: f32 = 0.3;
const FLOOR_DB: f32 = -200.0;

/// Shared forward transform of the IF input plus the display spectrum.
///
/// Each block of `BLOCK_SIZE` samples is appended to the previous one and
/// the `MAX_BINS` window is transformed once; every receiver reads the
/// resulting [`SpectrumEngine::fft_bins`].
pub struct SpectrumEngine {
    fft: Arc<dyn Fft<f32>>,
    fft_bins: Vec<Complex<f32>>,
    previous: Vec<f32>,
    hann_window: Vec<f32>,
    display: Vec<Complex<f32>>,
    spectrum_plot: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    counter: usize,
    shared_plot: Arc<Mutex<Vec<f32>>>,
}

impl SpectrumEngine {
    pub fn new(ctx: &DspContext) -> Self {
        Self {
            fft: ctx.forward_fft(),
            fft_bins: vec![ZERO; MAX_BINS],
            previous: vec![0.0; BLOCK_SIZE],
            hann_window: make_hann_window(MAX_BINS),
            display: vec![ZERO; MAX_BINS],
            spectrum_plot: vec![FLOOR_DB; MAX_BINS / 2],
            scratch: vec![ZERO; ctx.scratch_len()],
            counter: 0,
            shared_plot: Arc::new(Mutex::new(vec![FLOOR_DB; MAX_BINS / 2])),
        }
    }

    /// Transform `[previous block | block]` and remember `block`.
    pub fn process(&mut self, block: &[f32]) {
        debug_assert_eq!(block.len(), BLOCK_SIZE);
        let samples = self.previous.iter().chain(block.iter());
        for (dst, &s) in self.fft_bins.iter_mut().zip(samples) {
            *dst = Complex::new(s, 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.fft_bins, &mut self.scratch);

        self.counter += 1;
        if self.counter >= SPECTRUM_UPDATE_BLOCKS {
            self.counter = 0;
            self.update_plot(block);
        }

        self.previous.copy_from_slice(block);
    }

    fn update_plot(&mut self, block: &[f32]) {
        let samples = self.previous.iter().chain(block.iter());
        for ((dst, &s), &w) in self
            .display
            .iter_mut()
            .zip(samples)
            .zip(self.hann_window.iter())
        {
            *dst = Complex::new(s * w, 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.display, &mut self.scratch);

        // A full-scale sine peaks at N/4 after the Hann window.
        let norm = 4.0 / MAX_BINS as f32;
        for (plot, bin) in self.spectrum_plot.iter_mut().zip(self.display.iter()) {
            let db = 20.0 * (bin.norm() * norm).max(1e-10).log10();
            *plot = if *plot <= FLOOR_DB {
                db
            } else {
                *plot + SPECTRUM_SMOOTHING * (db - *plot)
            };
        }

        // Never wait on a reader.
        if let Ok(mut guard) = self.shared_plot.try_lock() {
            guard.copy_from_slice(&self.spectrum_plot);
        }
    }

    pub fn fft_bins(&self) -> &[Complex<f32>] {
        &self.fft_bins
    }

    /// Smoothed dB magnitudes of bins `0..MAX_BINS / 2`.
    pub fn spectrum_plot(&self) -> &[f32] {
        &self.spectrum_plot
    }

    pub fn shared_plot(&self) -> Arc<Mutex<Vec<f32>>> {
        Arc::clone(&self.shared_plot)
    }

    pub fn reset(&mut self) {
        self.previous.fill(0.0);
        self.fft_bins.fill(ZERO);
        self.spectrum_plot.fill(FLOOR_DB);
        self.counter = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SAMPLE_RATE;
    use std::f32::consts::TAU;

    fn sine_block(bin: usize, block: usize, amplitude: f32) -> Vec<f32> {
        let freq = bin as f32 * SAMPLE_RATE as f32 / MAX_BINS as f32;
        (0..BLOCK_SIZE)
            .map(|i| {
                let n = (block * BLOCK_SIZE + i) as f32;
                amplitude * (TAU * freq * n / SAMPLE_RATE as f32).sin()
            })
            .collect()
    }

    fn argmax(values: impl Iterator<Item = f32>) -> usize {
        values
            .enumerate()
            .fold((0, f32::MIN), |best, (i, v)| if v > best.1 { (i, v) } else { best })
            .0
    }

    #[test]
    fn fft_bins_cover_two_blocks() {
        let ctx = DspContext::new();
        let mut engine = SpectrumEngine::new(&ctx);
        engine.process(&sine_block(100, 0, 0.5));
        engine.process(&sine_block(100, 1, 0.5));
        let bins = engine.fft_bins();
        let peak = argmax(bins[..MAX_BINS / 2].iter().map(|z| z.norm()));
        assert_eq!(peak, 100);
        // real input: the mirror bin carries the same energy
        assert!((bins[100].norm() - bins[MAX_BINS - 100].norm()).abs() < 1e-2);
        // amplitude A over N samples gives A * N / 2
        assert!((bins[100].norm() - 0.5 * MAX_BINS as f32 / 2.0).abs() < 1.0);
    }

    #[test]
    fn plot_updates_every_few_blocks() {
        let ctx = DspContext::new();
        let mut engine = SpectrumEngine::new(&ctx);
        let shared = engine.shared_plot();
        for block in 0..SPECTRUM_UPDATE_BLOCKS - 1 {
            engine.process(&sine_block(300, block, 1.0));
        }
        assert!(engine.spectrum_plot().iter().all(|v| *v <= FLOOR_DB));
        engine.process(&sine_block(300, SPECTRUM_UPDATE_BLOCKS - 1, 1.0));

        let plot = engine.spectrum_plot();
        assert_eq!(argmax(plot.iter().copied()), 300);
        assert!(plot[300].abs() < 1.0, "full scale peak at {} dB", plot[300]);
        assert_eq!(&shared.lock().unwrap()[..], plot);
    }

    #[test]
    fn reset_clears_history() {
        let ctx = DspContext::new();
        let mut engine = SpectrumEngine::new(&ctx);
        engine.process(&sine_block(10, 0, 1.0));
        engine.reset();
        assert!(engine.fft_bins().iter().all(|z| *z == ZERO));
    }
}
