// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;

use serde::Serialize;

/// Error type returned by control requests.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RigError(pub String);

impl fmt::Display for RigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for RigError {}

impl From<String> for RigError {
    fn from(value: String) -> Self {
        RigError(value)
    }
}

impl From<&str> for RigError {
    fn from(value: &str) -> Self {
        RigError(value.to_string())
    }
}
