// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;
use std::sync::Arc;

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use super::window::kaiser;
use super::{alloc_zeroed, bin_freq, ZERO};
use crate::error::DspError;
use crate::SAMPLE_RATE;

/// Default Kaiser shape, roughly 50 dB stopband.
pub const DEFAULT_KAISER_BETA: f32 = 5.0;

fn mul_freq_domain(buf: &mut [Complex<f32>], h_freq: &[Complex<f32>], scale: f32) {
    for (x, &h) in buf.iter_mut().zip(h_freq.iter()) {
        *x = Complex::new(
            (x.re * h.re - x.im * h.im) * scale,
            (x.re * h.im + x.im * h.re) * scale,
        );
    }
}

/// FFT-domain FIR filter.
///
/// `N` is the transform size, `M` the impulse length and `L = N - M + 1` the
/// number of new samples per overlap-save pass. The frequency response lives
/// in `fir_coeff`; receivers apply it directly to rotated FFT bins with
/// [`Filter::apply_mask`], while the transmitter streams time-domain blocks
/// through [`Filter::process_block`].
pub struct Filter {
    fir_coeff: Vec<Complex<f32>>,
    overlap: Vec<Complex<f32>>,
    n: usize,
    l: usize,
    m: usize,
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    work: Vec<Complex<f32>>,
    fft_scratch: Vec<Complex<f32>>,
    passband: (f32, f32),
    kaiser_beta: f32,
}

impl Filter {
    /// Size a filter for blocks of `input_length` samples and an impulse of
    /// `impulse_length` taps. The response starts as all-pass.
    pub fn new(input_length: usize, impulse_length: usize) -> Result<Self, DspError> {
        if input_length == 0 || impulse_length == 0 {
            return Err(DspError::InvalidFilterLength {
                input: input_length,
                impulse: impulse_length,
            });
        }
        let n = (input_length + impulse_length - 1).next_power_of_two();
        let m = impulse_length;
        let l = n - m + 1;

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n);
        let ifft = planner.plan_fft_inverse(n);
        let scratch_len = fft
            .get_inplace_scratch_len()
            .max(ifft.get_inplace_scratch_len());

        let mut fir_coeff = alloc_zeroed(n)?;
        fir_coeff.fill(Complex::new(1.0, 0.0));

        Ok(Self {
            fir_coeff,
            overlap: alloc_zeroed(m - 1)?,
            n,
            l,
            m,
            fft,
            ifft,
            work: alloc_zeroed(n)?,
            fft_scratch: alloc_zeroed(scratch_len)?,
            passband: (-(SAMPLE_RATE as f32) / 2.0, SAMPLE_RATE as f32 / 2.0),
            kaiser_beta: 0.0,
        })
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn l(&self) -> usize {
        self.l
    }

    pub fn m(&self) -> usize {
        self.m
    }

    pub fn passband(&self) -> (f32, f32) {
        self.passband
    }

    pub fn fir_coeff(&self) -> &[Complex<f32>] {
        &self.fir_coeff
    }

    pub fn overlap(&self) -> &[Complex<f32>] {
        &self.overlap
    }

    fn validate(&self, low: f32, high: f32, kaiser_beta: f32) -> Result<(), DspError> {
        let nyquist = SAMPLE_RATE as f32 / 2.0;
        let in_range = low.is_finite() && high.is_finite() && low > -nyquist && high < nyquist;
        if !in_range || high <= low {
            return Err(DspError::InvalidPassband { low, high });
        }
        if !kaiser_beta.is_finite() || kaiser_beta < 0.0 {
            return Err(DspError::invalid_value("kaiser_beta", kaiser_beta));
        }
        Ok(())
    }

    /// Complex band-pass keeping `low..=high` Hz, which may be negative.
    ///
    /// On error the previous response is left untouched.
    pub fn tune(&mut self, low: f32, high: f32, kaiser_beta: f32) -> Result<(), DspError> {
        self.validate(low, high, kaiser_beta)?;
        let coeff = self.design(|f| f >= low && f <= high, kaiser_beta)?;
        self.fir_coeff = coeff;
        self.passband = (low, high);
        self.kaiser_beta = kaiser_beta;
        Ok(())
    }

    /// Real band-pass keeping `low..=high` Hz and its mirror image.
    pub fn tune_real(&mut self, low: f32, high: f32, kaiser_beta: f32) -> Result<(), DspError> {
        self.validate(low, high, kaiser_beta)?;
        if low < 0.0 {
            return Err(DspError::InvalidPassband { low, high });
        }
        let coeff = self.design(|f| f.abs() >= low && f.abs() <= high, kaiser_beta)?;
        self.fir_coeff = coeff;
        self.passband = (low, high);
        self.kaiser_beta = kaiser_beta;
        Ok(())
    }

    /// Sample the ideal response on the `N` bins, window the impulse to `M`
    /// taps centred at `(M - 1) / 2`, and transform back.
    fn design(
        &self,
        in_band: impl Fn(f32) -> bool,
        kaiser_beta: f32,
    ) -> Result<Vec<Complex<f32>>, DspError> {
        let n = self.n;
        let mut ideal = alloc_zeroed(n)?;
        for (k, c) in ideal.iter_mut().enumerate() {
            if in_band(bin_freq(k, n)) {
                *c = Complex::new(1.0, 0.0);
            }
        }
        self.ifft.process(&mut ideal);

        let window = kaiser(self.m, kaiser_beta);
        let centre = (self.m - 1) / 2;
        let scale = 1.0 / n as f32;
        let mut taps = alloc_zeroed(n)?;
        for (i, (tap, w)) in taps.iter_mut().zip(window.iter()).enumerate() {
            *tap = ideal[(i + n - centre) % n] * (w * scale);
        }
        self.fft.process(&mut taps);
        Ok(taps)
    }

    /// Multiply `N` frequency-domain bins by the filter response.
    pub fn apply_mask(&self, bins: &mut [Complex<f32>]) {
        for (x, &h) in bins.iter_mut().zip(self.fir_coeff.iter()) {
            *x *= h;
        }
    }

    /// Time-domain taps of the current response.
    pub fn impulse_response(&self) -> Vec<Complex<f32>> {
        let mut taps = self.fir_coeff.clone();
        self.ifft.process(&mut taps);
        let scale = 1.0 / self.n as f32;
        taps.truncate(self.m);
        taps.iter_mut().for_each(|t| *t *= scale);
        taps
    }

    /// Overlap-save filtering of an arbitrary-length block.
    ///
    /// `output` receives one sample per input sample. Blocks longer than
    /// `L` are split internally; the result does not depend on how a stream
    /// is cut into blocks.
    pub fn process_block(&mut self, input: &[Complex<f32>], output: &mut [Complex<f32>]) {
        let step = self.l;
        for (chunk_in, chunk_out) in input.chunks(step).zip(output.chunks_mut(step)) {
            self.process_chunk(chunk_in, chunk_out);
        }
    }

    fn process_chunk(&mut self, input: &[Complex<f32>], output: &mut [Complex<f32>]) {
        let n_new = input.len().min(output.len());
        let n_overlap = self.m - 1;

        let buf = &mut self.work;
        buf[..n_overlap].copy_from_slice(&self.overlap);
        buf[n_overlap..n_overlap + n_new].copy_from_slice(&input[..n_new]);
        buf[n_overlap + n_new..].fill(ZERO);

        self.fft.process_with_scratch(buf, &mut self.fft_scratch);
        mul_freq_domain(buf, &self.fir_coeff, 1.0 / self.n as f32);
        self.ifft.process_with_scratch(buf, &mut self.fft_scratch);

        output[..n_new].copy_from_slice(&buf[n_overlap..n_overlap + n_new]);

        if n_overlap > 0 {
            if n_new >= n_overlap {
                self.overlap.copy_from_slice(&input[n_new - n_overlap..n_new]);
            } else {
                let keep_old = n_overlap - n_new;
                self.overlap.copy_within(n_new..n_overlap, 0);
                self.overlap[keep_old..].copy_from_slice(&input[..n_new]);
            }
        }
    }

    /// Forget the stream history.
    pub fn reset(&mut self) {
        self.overlap.fill(ZERO);
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "filter N={} L={} M={} passband {:.0}..{:.0} Hz beta {:.1}",
            self.n, self.l, self.m, self.passband.0, self.passband.1, self.kaiser_beta
        )
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::TAU;

    fn complex_tone(freq_hz: f32, len: usize) -> Vec<Complex<f32>> {
        (0..len)
            .map(|n| Complex::from_polar(1.0, TAU * freq_hz * n as f32 / SAMPLE_RATE as f32))
            .collect()
    }

    fn run(filter: &mut Filter, input: &[Complex<f32>]) -> Vec<Complex<f32>> {
        let mut out = vec![ZERO; input.len()];
        filter.process_block(input, &mut out);
        out
    }

    /// Deterministic pseudo-noise in -0.5..0.5.
    fn noise(len: usize, seed: u32) -> Vec<Complex<f32>> {
        let mut state = seed;
        let mut next = move || {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 8) as f32 / (1u32 << 24) as f32 - 0.5
        };
        (0..len).map(|_| Complex::new(next(), next())).collect()
    }

    #[test]
    fn sizes_follow_block_and_impulse() {
        let f = Filter::new(1024, 1025).unwrap();
        assert_eq!((f.n(), f.l(), f.m()), (2048, 1024, 1025));
        let f = Filter::new(100, 31).unwrap();
        assert_eq!((f.n(), f.l(), f.m()), (256, 226, 31));
        assert_eq!(f.overlap().len(), 30);
        // input plus impulse minus one exactly fills the transform
        let f = Filter::new(98, 31).unwrap();
        assert_eq!((f.n(), f.l(), f.m()), (128, 98, 31));
    }

    #[test]
    fn rejects_zero_lengths() {
        assert!(matches!(
            Filter::new(0, 10),
            Err(DspError::InvalidFilterLength { .. })
        ));
        assert!(Filter::new(10, 0).is_err());
    }

    #[test]
    fn bad_tuning_keeps_previous_response() {
        let mut f = Filter::new(256, 129).unwrap();
        f.tune(300.0, 2700.0, 5.0).unwrap();
        let before = f.fir_coeff().to_vec();
        assert!(f.tune(2700.0, 300.0, 5.0).is_err());
        assert!(f.tune(-30_000.0, 300.0, 5.0).is_err());
        assert!(f.tune(300.0, 2700.0, -1.0).is_err());
        assert!(f.tune_real(-100.0, 2700.0, 5.0).is_err());
        assert_eq!(f.fir_coeff(), &before[..]);
        assert_eq!(f.passband(), (300.0, 2700.0));
    }

    #[test]
    fn passband_is_unity_and_delayed() {
        let mut f = Filter::new(512, 513).unwrap();
        f.tune(300.0, 2700.0, DEFAULT_KAISER_BETA).unwrap();
        let delay = (f.m() - 1) / 2;
        let input = complex_tone(1500.0, 8 * f.l());
        let out = run(&mut f, &input);
        for n in 2 * f.l()..input.len() {
            let err = (out[n] - input[n - delay]).norm();
            assert!(err < 0.02, "sample {n}: error {err}");
        }
    }

    #[test]
    fn stopband_is_attenuated() {
        let mut f = Filter::new(512, 513).unwrap();
        f.tune(300.0, 2700.0, DEFAULT_KAISER_BETA).unwrap();
        for freq in [6000.0, -1500.0, 12_000.0] {
            f.reset();
            let input = complex_tone(freq, 8 * f.l());
            let out = run(&mut f, &input);
            let peak = out[2 * f.l()..]
                .iter()
                .fold(0.0_f32, |m, z| m.max(z.norm()));
            assert!(peak < 0.01, "{freq} Hz leaks at {peak}");
        }
    }

    #[test]
    fn real_filter_passes_both_images() {
        let mut f = Filter::new(512, 513).unwrap();
        f.tune_real(300.0, 2700.0, DEFAULT_KAISER_BETA).unwrap();
        let delay = (f.m() - 1) / 2;
        let len = 8 * f.l();
        let input: Vec<Complex<f32>> = (0..len)
            .map(|n| {
                let x = (TAU * 1500.0 * n as f32 / SAMPLE_RATE as f32).cos();
                Complex::new(x, 0.0)
            })
            .collect();
        let out = run(&mut f, &input);
        for n in 2 * f.l()..len {
            assert!((out[n].re - input[n - delay].re).abs() < 0.02);
            assert!(out[n].im.abs() < 0.02);
        }
    }

    #[test]
    fn blocked_output_matches_direct_convolution() {
        let mut f = Filter::new(64, 33).unwrap();
        f.tune(-4000.0, 9000.0, 6.0).unwrap();
        let h = f.impulse_response();
        assert_eq!(h.len(), 33);

        let input = noise(5 * f.l() + 17, 7);
        let mut out = vec![ZERO; input.len()];
        // irregular cuts, including ones shorter than M - 1
        let mut start = 0;
        for step in [5, 96, 13, 40, 96, 1, 77].iter().cycle() {
            if start >= input.len() {
                break;
            }
            let end = (start + step).min(input.len());
            f.process_block(&input[start..end], &mut out[start..end]);
            start = end;
        }

        for n in 0..input.len() {
            let direct: Complex<f32> = h
                .iter()
                .enumerate()
                .filter(|(k, _)| *k <= n)
                .map(|(k, tap)| tap * input[n - k])
                .sum();
            assert!(
                (direct - out[n]).norm() < 1e-4,
                "sample {n}: {direct} vs {}",
                out[n]
            );
        }
    }

    #[test]
    fn display_describes_filter() {
        let mut f = Filter::new(1024, 1025).unwrap();
        f.tune(-3000.0, -300.0, 5.0).unwrap();
        assert_eq!(
            f.to_string(),
            "filter N=2048 L=1024 M=1025 passband -3000..-300 Hz beta 5.0"
        );
    }
}
