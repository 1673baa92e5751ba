// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Seams to the collaborators that live outside the DSP core: the digital
//! modem, the CW keyer and the hardware local oscillator.

use trx_core::{CwInput, Ft8Mode, Freq, Mode};

use crate::error::DspError;

// Key state bits reported by a keyer.
pub const CW_IDLE: u8 = 0;
pub const CW_DASH: u8 = 1 << 0;
pub const CW_DOT: u8 = 1 << 1;
pub const CW_DOT_DELAY: u8 = 1 << 2;
pub const CW_DASH_DELAY: u8 = 1 << 3;
pub const CW_WORD_DELAY: u8 = 1 << 4;
pub const CW_DOWN: u8 = 1 << 5;

/// True when a key state means the transmitter should be keyed.
pub fn is_key_down(state: u8) -> bool {
    state & (CW_DOWN | CW_DOT | CW_DASH) != 0
}

/// Digital-mode modem fed from, and feeding, the audio thread.
///
/// All methods are called on the audio thread once per block and must not
/// block.
pub trait Modem: Send {
    /// Demodulated receive audio for a digital-mode receiver.
    fn modem_rx(&mut self, mode: &Mode, samples: &[i32]);

    /// Next transmit audio sample in -1.0..=1.0.
    fn modem_next_sample(&mut self, _mode: &Mode) -> f32 {
        0.0
    }

    fn modem_set_pitch(&mut self, _pitch_hz: u32, _mode: &Mode) {}

    /// Give the modem a chance to run its own state machine.
    fn modem_poll(&mut self, _mode: &Mode) {}

    fn modem_abort(&mut self) {}

    fn ft8_setmode(&mut self, _mode: Ft8Mode) {}
}

/// CW key input, polled once per block while transmitting.
pub trait Keyer: Send {
    fn key_poll(&mut self) -> u8;

    /// Secondary key input, e.g. a straight key next to the paddle.
    fn key_poll2(&mut self) -> u8 {
        CW_IDLE
    }

    fn set_input_method(&mut self, _input: CwInput) {}
}

/// Hardware oscillator that places the IF on the dial frequency.
pub trait LocalOscillator: Send {
    fn set_lo(&mut self, freq: Freq) -> Result<(), DspError>;
}

/// Modem that discards receive audio and transmits silence.
#[derive(Debug, Default)]
pub struct NullModem;

impl Modem for NullModem {
    fn modem_rx(&mut self, _mode: &Mode, _samples: &[i32]) {}
}

/// Keyer whose key is never pressed.
#[derive(Debug, Default)]
pub struct NullKeyer;

impl Keyer for NullKeyer {
    fn key_poll(&mut self) -> u8 {
        CW_IDLE
    }
}

/// Oscillator that only remembers the last frequency it was given.
#[derive(Debug, Default)]
pub struct NullOscillator {
    pub last: Option<Freq>,
}

impl LocalOscillator for NullOscillator {
    fn set_lo(&mut self, freq: Freq) -> Result<(), DspError> {
        self.last = Some(freq);
        Ok(())
    }
}
