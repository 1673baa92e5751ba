// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Block-based transceiver DSP core.
//!
//! A [`engine::Radio`] lives on the audio thread and turns blocks of 32-bit
//! PCM from the sound driver into speaker audio and transmit samples. Every
//! receiver shares one forward FFT of the IF input; each selects its channel
//! by rotating and masking the bins before its own inverse transform.
//! [`control::RadioControl`] is the cloneable handle used everywhere else.

pub mod context;
pub mod control;
pub mod demod;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod modem;
pub mod queue;
pub mod rx;
pub mod tx;
pub mod vfo;

use num_complex::Complex;

pub use context::DspContext;
pub use control::RadioControl;
pub use engine::{EngineStats, Radio, RadioConfig, MAX_RECEIVERS};
pub use error::DspError;
pub use rx::{PcmFrame, RxConfig, RxHandle};
pub use tx::TxConfig;

/// Sample rate of every stream handled by the engine.
pub const SAMPLE_RATE: u32 = 48_000;
/// Size of the shared forward FFT and of each receiver's inverse FFT.
pub const MAX_BINS: usize = 2048;
/// Samples consumed and produced per processing hop.
pub const BLOCK_SIZE: usize = MAX_BINS / 2;
/// Width of one FFT bin in Hz.
pub const BIN_HZ: f32 = SAMPLE_RATE as f32 / MAX_BINS as f32;
/// Full scale of signed 32-bit PCM.
pub const PCM_FULL_SCALE: f32 = 2_147_483_647.0;

/// Squared magnitude of a complex sample.
#[inline]
pub fn cnrmf(x: Complex<f32>) -> f32 {
    x.re * x.re + x.im * x.im
}

/// Power ratio to decibels.
#[inline]
pub fn power2db(x: f32) -> f32 {
    10.0 * x.max(1e-20).log10()
}

/// Convert a normalised sample to 32-bit PCM, saturating at full scale.
#[inline]
pub(crate) fn to_pcm(sample: f32) -> i32 {
    (sample.clamp(-1.0, 1.0) * PCM_FULL_SCALE) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_agree() {
        assert_eq!(BLOCK_SIZE, 1024);
        assert!((BIN_HZ - 23.4375).abs() < 1e-6);
    }

    #[test]
    fn power_helpers() {
        assert_eq!(cnrmf(Complex::new(3.0, 4.0)), 25.0);
        assert!((power2db(100.0) - 20.0).abs() < 1e-5);
        assert!(power2db(0.0).is_finite());
    }

    #[test]
    fn pcm_saturates() {
        assert_eq!(to_pcm(2.0), i32::MAX);
        assert_eq!(to_pcm(0.0), 0);
        assert!(to_pcm(-1.0) <= -i32::MAX);
    }
}
