// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

mod audio;
mod config;
mod listener;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

use trx_app::{init_logging, ConfigFile};
use trx_core::{DynResult, Freq};
use trx_dsp::modem::{LocalOscillator, NullKeyer, NullModem};
use trx_dsp::{DspContext, DspError, Radio};

use config::{AudioSource, ServerConfig};

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - SDR transceiver DSP daemon");

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// IP address for the control listener
    #[arg(short = 'l', long = "listen")]
    listen: Option<IpAddr>,
    /// Port for the control listener
    #[arg(short = 'p', long = "port")]
    port: Option<u16>,
    /// Receive input fed by the simulated sound driver
    #[arg(short = 's', long = "source", value_enum)]
    source: Option<AudioSource>,
}

/// Oscillator without hardware behind it; reports each new setting.
#[derive(Debug, Default)]
struct LoggingOscillator;

impl LocalOscillator for LoggingOscillator {
    fn set_lo(&mut self, freq: Freq) -> Result<(), DspError> {
        info!("LO set to {} Hz", freq.hz);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", ServerConfig::example_toml());
        return Ok(());
    }

    let (mut cfg, config_path) = if let Some(ref path) = cli.config {
        let cfg = ServerConfig::load_from_file(path)?;
        (cfg, Some(path.clone()))
    } else {
        ServerConfig::load_from_default_paths()?
    };
    if let Some(source) = cli.source {
        cfg.audio.source = source;
    }
    cfg.validate()
        .map_err(|e| format!("Invalid server configuration: {}", e))?;

    init_logging(cfg.general.log_level.as_deref());

    if let Some(ref path) = config_path {
        info!("Loaded configuration from {}", path.display());
    }
    if let Some(ref cs) = cfg.general.callsign {
        info!("Callsign: {}", cs);
    }

    let ctx = DspContext::new();
    let (radio, control) = Radio::new(
        ctx,
        cfg.radio_config(),
        Box::new(NullModem),
        Box::new(NullKeyer),
        Box::new(LoggingOscillator),
    )?;

    for rx in &cfg.receivers {
        let handle = control.add_receiver(rx.clone())?;
        info!(
            "Receiver {} at {} Hz, {} ({}..{} Hz)",
            handle.0,
            rx.freq_hz,
            rx.mode,
            rx.passband().0,
            rx.passband().1
        );
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let audio_thread =
        audio::spawn_sound_driver(radio, control.clone(), cfg.audio.clone(), shutdown_rx.clone())?;

    let listener_task = if cfg.listen.enabled {
        let listen_ip = cli.listen.unwrap_or(cfg.listen.listen);
        let listen_port = cli.port.unwrap_or(cfg.listen.port);
        let listen_addr = SocketAddr::from((listen_ip, listen_port));
        let listener_control = control.clone();
        let listener_shutdown_rx = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            if let Err(e) =
                listener::run_listener(listen_addr, listener_control, listener_shutdown_rx).await
            {
                error!("Listener error: {:?}", e);
            }
        }))
    } else {
        None
    };

    signal::ctrl_c().await?;
    info!("Ctrl+C received, shutting down");
    let _ = shutdown_tx.send(true);

    if let Some(handle) = listener_task {
        if tokio::time::timeout(Duration::from_millis(400), handle)
            .await
            .is_err()
        {
            error!("Listener did not stop in time");
        }
    }
    let joined = tokio::task::spawn_blocking(move || audio_thread.join()).await?;
    if joined.is_err() {
        error!("Sound driver thread panicked");
    }
    Ok(())
}
