// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;
use std::sync::Arc;

use rustfft::{Fft, FftPlanner};
use tracing::debug;

use crate::vfo::PhaseTable;
use crate::MAX_BINS;

/// Process-wide tables built once at startup: oscillator lookup tables and
/// the `MAX_BINS` FFT plans every receiver, filter and the spectrum engine
/// share.
pub struct DspContext {
    phase_table: PhaseTable,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    planner_len: usize,
}

impl DspContext {
    pub fn new() -> Arc<Self> {
        let mut planner = FftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(MAX_BINS);
        let inverse = planner.plan_fft_inverse(MAX_BINS);
        debug!("DSP context ready ({} bins)", MAX_BINS);
        Arc::new(Self {
            phase_table: PhaseTable::new(),
            forward,
            inverse,
            planner_len: MAX_BINS,
        })
    }

    pub fn phase_table(&self) -> &PhaseTable {
        &self.phase_table
    }

    pub fn forward_fft(&self) -> Arc<dyn Fft<f32>> {
        Arc::clone(&self.forward)
    }

    pub fn inverse_fft(&self) -> Arc<dyn Fft<f32>> {
        Arc::clone(&self.inverse)
    }

    /// Scratch length needed by either shared plan.
    pub fn scratch_len(&self) -> usize {
        self.forward
            .get_inplace_scratch_len()
            .max(self.inverse.get_inplace_scratch_len())
    }
}

impl fmt::Debug for DspContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DspContext")
            .field("fft_len", &self.planner_len)
            .finish_non_exhaustive()
    }
}

impl Drop for DspContext {
    fn drop(&mut self) {
        debug!("DSP context released");
    }
}
