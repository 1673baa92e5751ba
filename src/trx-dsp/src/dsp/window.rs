// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::f32::consts::PI;

/// Symmetric Hann window of `len` points.
pub fn make_hann_window(len: usize) -> Vec<f32> {
    if len < 2 {
        return vec![1.0; len];
    }
    let m = (len - 1) as f32;
    (0..len)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / m).cos()))
        .collect()
}

/// Kaiser window of `len` points with shape parameter `beta`.
pub fn kaiser(len: usize, beta: f32) -> Vec<f32> {
    if len < 2 {
        return vec![1.0; len];
    }
    let m = (len - 1) as f64;
    let beta = f64::from(beta);
    let denom = bessel_i0(beta);
    (0..len)
        .map(|i| {
            let r = 2.0 * i as f64 / m - 1.0;
            (bessel_i0(beta * (1.0 - r * r).max(0.0).sqrt()) / denom) as f32
        })
        .collect()
}

/// Zeroth-order modified Bessel function of the first kind (power series).
pub fn bessel_i0(x: f64) -> f64 {
    let mut sum = 1.0;
    let mut term = 1.0;
    let half = x / 2.0;
    for k in 1..50 {
        term *= (half / k as f64) * (half / k as f64);
        sum += term;
        if term < 1e-12 * sum {
            break;
        }
    }
    sum
}
