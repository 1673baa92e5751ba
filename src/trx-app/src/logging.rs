// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Configured level, falling back to INFO if missing or invalid.
fn resolve_level(log_level: Option<&str>) -> Level {
    log_level
        .and_then(|s| s.parse::<Level>().ok())
        .unwrap_or(Level::INFO)
}

/// `RUST_LOG` wins over the configured level.
fn filter_for(log_level: Option<&str>) -> EnvFilter {
    let level = resolve_level(log_level);
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Initialize logging with optional level from config.
///
/// Thread names are included so audio-thread warnings can be told apart
/// from the control side.
pub fn init_logging(log_level: Option<&str>) {
    let subscriber = FmtSubscriber::builder()
        .with_target(false)
        .with_thread_names(true)
        .with_env_filter(filter_for(log_level))
        .finish();
    // A subscriber may already be installed, e.g. by a test harness.
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_falls_back_to_info() {
        assert_eq!(resolve_level(None), Level::INFO);
        assert_eq!(resolve_level(Some("bogus")), Level::INFO);
        assert_eq!(resolve_level(Some("debug")), Level::DEBUG);
        assert_eq!(resolve_level(Some("WARN")), Level::WARN);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_logging(Some("warn"));
        init_logging(Some("debug"));
    }
}
