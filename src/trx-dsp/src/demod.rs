// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

mod am;
mod fm;
mod ssb;

use num_complex::Complex;
use trx_core::Mode;

use crate::vfo::{PhaseTable, Vfo};

pub use am::AmDetector;
pub use fm::FmDiscriminator;

/// Peak deviation assumed for narrow FM.
pub const NBFM_DEVIATION_HZ: f32 = 5_000.0;
/// Peak deviation assumed for wide FM.
pub const FM_DEVIATION_HZ: f32 = 12_000.0;
/// Tones of the two-tone test pattern.
pub const TWO_TONE_HZ: (i32, i32) = (700, 1900);
/// Tone played in calibrate mode.
pub const CALIBRATE_TONE_HZ: i32 = 1000;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DcBlocker {
    r: f32,
    x1: f32,
    y1: f32,
}

impl DcBlocker {
    pub(crate) fn new(r: f32) -> Self {
        Self {
            r: r.clamp(0.9, 0.9999),
            x1: 0.0,
            y1: 0.0,
        }
    }

    pub(crate) fn process(&mut self, x: f32) -> f32 {
        let y = x - self.x1 + self.r * self.y1;
        self.x1 = x;
        self.y1 = y;
        y
    }
}

/// Locally generated audio for the 2TONE and CALIBRATE modes.
#[derive(Debug, Clone, PartialEq)]
pub struct TestPattern {
    a: Vfo,
    b: Option<Vfo>,
}

impl TestPattern {
    pub fn two_tone() -> Self {
        Self {
            a: Vfo::new(TWO_TONE_HZ.0, 0),
            b: Some(Vfo::new(TWO_TONE_HZ.1, 0)),
        }
    }

    pub fn calibrate() -> Self {
        Self {
            a: Vfo::new(CALIBRATE_TONE_HZ, 0),
            b: None,
        }
    }

    pub fn next(&mut self, table: &PhaseTable) -> f32 {
        match self.b.as_mut() {
            Some(b) => 0.5 * (self.a.read(table) + b.read(table)),
            None => 0.9 * self.a.read(table),
        }
    }
}

/// Turns a block of selected baseband into audio.
#[derive(Debug, Clone, PartialEq)]
pub enum Demodulator {
    /// USB, LSB, CW, CWR and the digital modes: the real part after the
    /// passband has already removed the other sideband.
    Sideband,
    Am(AmDetector),
    Fm(FmDiscriminator),
    TestPattern(TestPattern),
    /// Modes the engine does not know produce silence.
    Silent,
}

impl Demodulator {
    pub fn for_mode(mode: &Mode) -> Self {
        match mode {
            Mode::USB | Mode::LSB | Mode::CW | Mode::CWR => Self::Sideband,
            Mode::FT8 | Mode::PSK31 | Mode::RTTY | Mode::DIGITAL => Self::Sideband,
            Mode::AM => Self::Am(AmDetector::new()),
            Mode::NBFM => Self::Fm(FmDiscriminator::new(NBFM_DEVIATION_HZ)),
            Mode::FM => Self::Fm(FmDiscriminator::new(FM_DEVIATION_HZ)),
            Mode::TwoTone => Self::TestPattern(TestPattern::two_tone()),
            Mode::Calibrate => Self::TestPattern(TestPattern::calibrate()),
            Mode::Other(_) => Self::Silent,
        }
    }

    /// Demodulate `input` into `output` (same length).
    pub fn demodulate(
        &mut self,
        table: &PhaseTable,
        input: &[Complex<f32>],
        output: &mut [f32],
    ) {
        match self {
            Self::Sideband => ssb::demod_sideband(input, output),
            Self::Am(detector) => detector.demodulate(input, output),
            Self::Fm(discriminator) => discriminator.demodulate(input, output),
            Self::TestPattern(pattern) => {
                for out in output.iter_mut() {
                    *out = pattern.next(table);
                }
            }
            Self::Silent => output.fill(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_mapping() {
        assert_eq!(Demodulator::for_mode(&Mode::USB), Demodulator::Sideband);
        assert_eq!(Demodulator::for_mode(&Mode::CWR), Demodulator::Sideband);
        assert_eq!(Demodulator::for_mode(&Mode::FT8), Demodulator::Sideband);
        assert!(matches!(Demodulator::for_mode(&Mode::AM), Demodulator::Am(_)));
        assert!(matches!(Demodulator::for_mode(&Mode::NBFM), Demodulator::Fm(_)));
        assert!(matches!(
            Demodulator::for_mode(&Mode::TwoTone),
            Demodulator::TestPattern(_)
        ));
        assert_eq!(
            Demodulator::for_mode(&Mode::Other("SSTV".into())),
            Demodulator::Silent
        );
    }

    #[test]
    fn test_silent_clears_output() {
        let table = PhaseTable::new();
        let input = vec![Complex::new(1.0, 1.0); 8];
        let mut output = vec![0.7; 8];
        Demodulator::Silent.demodulate(&table, &input, &mut output);
        assert!(output.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_two_tone_ignores_input() {
        let table = PhaseTable::new();
        let mut demod = Demodulator::for_mode(&Mode::TwoTone);
        let input = vec![Complex::new(0.0, 0.0); 960];
        let mut output = vec![0.0; 960];
        demod.demodulate(&table, &input, &mut output);
        let peak = output.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.5 && peak <= 1.0, "peak {peak}");
    }

    #[test]
    fn test_dc_blocker_removes_offset() {
        let mut dc = DcBlocker::new(0.995);
        let mut last = 1.0;
        for _ in 0..5000 {
            last = dc.process(0.8);
        }
        assert!(last.abs() < 1e-3);
    }
}
