// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;

use serde::{Deserialize, Serialize};

/// Dial frequency wrapper (Hz).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Freq {
    pub hz: u64,
}

impl Freq {
    #[must_use]
    pub fn new(hz: u64) -> Self {
        Self { hz }
    }

    /// Shift the frequency by a signed offset, refusing to go below 0 Hz.
    #[must_use]
    pub fn checked_offset(self, offset_hz: i64) -> Option<Freq> {
        let hz = i128::from(self.hz) + i128::from(offset_hz);
        u64::try_from(hz).ok().map(Freq::new)
    }
}

impl Default for Freq {
    fn default() -> Self {
        // 40m FT8 calling frequency
        Self { hz: 7_074_000 }
    }
}

/// Formats as `MHz.kHz.Hz` groups, e.g. `7.074.000`.
impl fmt::Display for Freq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mhz = self.hz / 1_000_000;
        let khz = (self.hz / 1_000) % 1_000;
        let hz = self.hz % 1_000;
        write!(f, "{}.{:03}.{:03}", mhz, khz, hz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_groups_digits() {
        assert_eq!(Freq::new(7_074_000).to_string(), "7.074.000");
        assert_eq!(Freq::new(14_200_050).to_string(), "14.200.050");
        assert_eq!(Freq::new(999).to_string(), "0.000.999");
    }

    #[test]
    fn checked_offset_rejects_negative() {
        assert_eq!(Freq::new(1000).checked_offset(-1000), Some(Freq::new(0)));
        assert_eq!(Freq::new(1000).checked_offset(-1001), None);
        assert_eq!(Freq::new(1000).checked_offset(24_000), Some(Freq::new(25_000)));
    }
}
