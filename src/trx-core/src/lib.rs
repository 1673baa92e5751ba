// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod radio;
pub mod rig;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use radio::freq::Freq;
pub use rig::command::RigCommand;
pub use rig::response::RigError;
pub use rig::state::{
    AgcSpeed, CwInput, DspSettings, Ft8Mode, Mode, RadioSnapshot, ReceiverStatus, RxOutput,
    TxTrigger,
};
