// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use thiserror::Error;
use trx_core::RigError;

/// Errors reported by DSP construction and control operations.
///
/// Nothing on the audio thread returns these; they are raised on the
/// control side before a change is handed over.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DspError {
    #[error("failed to allocate {0} samples")]
    Allocation(usize),

    #[error("invalid filter length: input {input}, impulse {impulse}")]
    InvalidFilterLength { input: usize, impulse: usize },

    #[error("invalid passband {low}..{high} Hz")]
    InvalidPassband { low: f32, high: f32 },

    #[error("invalid tuning: {0} Hz is outside the IF range")]
    InvalidTuning(f64),

    #[error("unknown receiver {0}")]
    UnknownReceiver(u32),

    #[error("receiver limit of {0} reached")]
    TooManyReceivers(usize),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("audio engine is not running")]
    Disconnected,
}

impl DspError {
    pub(crate) fn invalid_value(key: &str, value: impl ToString) -> Self {
        DspError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

impl From<DspError> for RigError {
    fn from(value: DspError) -> Self {
        RigError(value.to_string())
    }
}
