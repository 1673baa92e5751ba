// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Building blocks: windows, the overlap-save filter, spectrum engine,
//! AGC and the conditioning stages that follow demodulation.

pub mod agc;
pub mod conditioning;
pub mod filter;
pub mod spectrum;
pub mod window;

use num_complex::Complex;

use crate::error::DspError;
use crate::SAMPLE_RATE;

pub(crate) const ZERO: Complex<f32> = Complex { re: 0.0, im: 0.0 };

/// Allocate a zeroed buffer, reporting failure instead of aborting.
pub(crate) fn alloc_zeroed<T: Clone + Default>(len: usize) -> Result<Vec<T>, DspError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| DspError::Allocation(len))?;
    buf.resize(len, T::default());
    Ok(buf)
}

/// Signed frequency of bin `k` in an `n`-point FFT at [`SAMPLE_RATE`].
#[inline]
pub fn bin_freq(k: usize, n: usize) -> f32 {
    let k = if k < n / 2 { k as f32 } else { k as f32 - n as f32 };
    k * SAMPLE_RATE as f32 / n as f32
}
