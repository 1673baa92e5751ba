// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Simulated sound driver.
//!
//! Stands in for the hardware callback: every `block_size` samples' worth of
//! wall-clock time it hands the radio one block of receive input and an
//! empty microphone, then collects the speaker and transmit output.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{error, info, warn};

use trx_dsp::{Radio, RadioControl, PCM_FULL_SCALE, SAMPLE_RATE};

use crate::config::{AudioConfig, AudioSource};

/// Receive input generator.
#[derive(Debug)]
pub enum InputSource {
    Silence,
    Tone { phase: f64, step: f64, level: f32 },
    File { samples: Vec<i32>, pos: usize },
}

impl InputSource {
    pub fn from_config(cfg: &AudioConfig) -> io::Result<Self> {
        match cfg.source {
            AudioSource::Silence => Ok(InputSource::Silence),
            AudioSource::Tone => Ok(InputSource::Tone {
                phase: 0.0,
                step: std::f64::consts::TAU * cfg.tone_hz / f64::from(SAMPLE_RATE),
                level: cfg.tone_level,
            }),
            AudioSource::File => {
                let path = cfg.input_file.as_deref().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "no input file configured")
                })?;
                Self::from_file(path)
            }
        }
    }

    /// Load raw signed 32-bit little-endian PCM. A trailing partial sample
    /// is ignored.
    pub fn from_file(path: &Path) -> io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let samples: Vec<i32> = bytes
            .chunks_exact(4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        if samples.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} holds no samples", path.display()),
            ));
        }
        Ok(InputSource::File { samples, pos: 0 })
    }

    pub fn fill(&mut self, out: &mut [i32]) {
        match self {
            InputSource::Silence => out.fill(0),
            InputSource::Tone { phase, step, level } => {
                let amplitude = f64::from(*level * PCM_FULL_SCALE);
                for sample in out.iter_mut() {
                    *sample = (amplitude * phase.cos()) as i32;
                    *phase = (*phase + *step) % std::f64::consts::TAU;
                }
            }
            InputSource::File { samples, pos } => {
                for sample in out.iter_mut() {
                    *sample = samples[*pos];
                    *pos = (*pos + 1) % samples.len();
                }
            }
        }
    }
}

/// One driver instance: buffers, source and optional recording.
pub struct SoundDriver {
    source: InputSource,
    rx: Vec<i32>,
    mic: Vec<i32>,
    speaker: Vec<i32>,
    tx: Vec<i32>,
    recording: Option<BufWriter<File>>,
    callbacks: u64,
}

impl SoundDriver {
    pub fn new(cfg: &AudioConfig) -> io::Result<Self> {
        let source = InputSource::from_config(cfg)?;
        let recording = match cfg.output_file.as_deref() {
            Some(path) => Some(BufWriter::new(File::create(path)?)),
            None => None,
        };
        Ok(Self {
            source,
            rx: vec![0; cfg.block_size],
            mic: vec![0; cfg.block_size],
            speaker: vec![0; cfg.block_size],
            tx: vec![0; cfg.block_size],
            recording,
            callbacks: 0,
        })
    }

    /// Run a single driver callback.
    pub fn callback(&mut self, radio: &mut Radio) -> io::Result<()> {
        self.source.fill(&mut self.rx);
        radio.sound_process(&self.rx, &self.mic, &mut self.speaker, &mut self.tx);
        self.callbacks += 1;
        if let Some(writer) = self.recording.as_mut() {
            for sample in &self.speaker {
                writer.write_all(&sample.to_le_bytes())?;
            }
        }
        Ok(())
    }

    pub fn speaker(&self) -> &[i32] {
        &self.speaker
    }

    pub fn tx(&self) -> &[i32] {
        &self.tx
    }

    pub fn callbacks(&self) -> u64 {
        self.callbacks
    }

    fn finish(&mut self) {
        if let Some(writer) = self.recording.as_mut() {
            if let Err(e) = writer.flush() {
                warn!("Failed to flush speaker recording: {}", e);
            }
        }
    }
}

fn block_period(block_size: usize) -> Duration {
    Duration::from_secs_f64(block_size as f64 / f64::from(SAMPLE_RATE))
}

fn log_stats(control: &RadioControl) {
    let stats = control.queue_stats();
    info!(
        "audio: {} blocks, rx queue {}/{} (underflow {}, overflow {}), speaker underflow {}, S {:.1} dB",
        stats.blocks,
        stats.rx_input.len,
        stats.rx_input.capacity,
        stats.rx_input.underflow,
        stats.rx_input.overflow,
        stats.speaker_output.underflow,
        stats.rx_gain_db()
    );
}

/// Spawn the `trx-audio` thread that owns the radio and paces callbacks in
/// real time until shutdown is signalled.
pub fn spawn_sound_driver(
    mut radio: Radio,
    control: RadioControl,
    cfg: AudioConfig,
    shutdown_rx: watch::Receiver<bool>,
) -> io::Result<JoinHandle<()>> {
    let mut driver = SoundDriver::new(&cfg)?;
    let period = block_period(cfg.block_size);
    let stats_every = Duration::from_secs(cfg.stats_interval_secs);

    thread::Builder::new()
        .name("trx-audio".to_string())
        .spawn(move || {
            info!(
                "Sound driver started ({:?} source, {} samples per callback)",
                cfg.source, cfg.block_size
            );
            let mut deadline = Instant::now();
            let mut last_stats = Instant::now();
            while !*shutdown_rx.borrow() {
                if let Err(e) = driver.callback(&mut radio) {
                    error!("Speaker recording failed: {}", e);
                    break;
                }

                if !stats_every.is_zero() && last_stats.elapsed() >= stats_every {
                    log_stats(&control);
                    last_stats = Instant::now();
                }

                deadline += period;
                let now = Instant::now();
                if deadline > now {
                    thread::sleep(deadline - now);
                } else if now - deadline > period * 8 {
                    // Fell far behind; resynchronise instead of bursting.
                    warn!("Sound driver running late by {:?}", now - deadline);
                    deadline = now;
                }
            }
            driver.finish();
            info!("Sound driver stopped after {} callbacks", driver.callbacks());
        })
}
