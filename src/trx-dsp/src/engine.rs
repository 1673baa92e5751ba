// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! The audio-thread half of the radio.
//!
//! [`Radio`] owns every piece of state the real-time path touches. The
//! control half ([`RadioControl`]) validates and builds changes, then posts
//! them as [`Command`]s; they are applied at the start of the next
//! [`Radio::sound_process`] call so a block is never processed with a half
//! applied change.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;
use trx_core::{AgcSpeed, CwInput, DspSettings, Freq, Ft8Mode, Mode, RxOutput, TxTrigger};

use crate::context::DspContext;
use crate::control::RadioControl;
use crate::dsp::alloc_zeroed;
use crate::dsp::filter::Filter;
use crate::dsp::spectrum::SpectrumEngine;
use crate::error::DspError;
use crate::modem::{is_key_down, Keyer, LocalOscillator, Modem};
use crate::queue::{Queue, QueueStats};
use crate::rx::{Receiver, RxHandle, DEFAULT_IF_HZ};
use crate::tx::{Transmitter, TxConfig};
use crate::{power2db, to_pcm, BLOCK_SIZE, PCM_FULL_SCALE};

/// Staging depth of each audio queue.
pub const QUEUE_CAPACITY: usize = 8 * BLOCK_SIZE;
/// At most one overflow warning per this many blocks (~5 s).
const OVERFLOW_WARN_BLOCKS: u64 = 250;
/// Receivers the audio thread has room for.
pub const MAX_RECEIVERS: usize = 16;

/// A change handed from the control side to the audio thread.
pub(crate) enum Command {
    AddReceiver(Box<Receiver>),
    RemoveReceiver(RxHandle),
    Retune {
        id: RxHandle,
        freq_hz: f64,
        tuned_bin: usize,
    },
    SetFilter {
        id: RxHandle,
        filter: Box<Filter>,
        low_hz: i32,
        high_hz: i32,
    },
    SetMode {
        id: RxHandle,
        mode: Mode,
        filter: Box<Filter>,
        low_hz: i32,
        high_hz: i32,
    },
    SetAgc {
        id: RxHandle,
        speed: AgcSpeed,
    },
    SetOutput {
        id: RxHandle,
        output: RxOutput,
    },
    SetSettings(DspSettings),
    SetVolume(f32),
    SetTransmitter(Box<Transmitter>),
    SetCwInput(CwInput),
    SetFt8Mode(Ft8Mode),
    SetModemPitch { pitch_hz: u32, mode: Mode },
    Reset { force: bool },
}

/// Something the audio thread replaced. It goes back to the control side
/// to be freed there.
pub(crate) enum Retired {
    Receiver(Box<Receiver>),
    Filter(Box<Filter>),
    Transmitter(Box<Transmitter>),
    Mode(Mode),
}

/// Queue counters mirrored into atomics.
#[derive(Debug, Default)]
pub(crate) struct QueueTelemetry {
    len: AtomicU32,
    underflow: AtomicU32,
    overflow: AtomicU32,
    max_q: AtomicU32,
    stall: AtomicU8,
}

impl QueueTelemetry {
    fn store(&self, queue: &Queue) {
        self.len.store(queue.len() as u32, Ordering::Relaxed);
        self.underflow.store(queue.underflow(), Ordering::Relaxed);
        self.overflow.store(queue.overflow(), Ordering::Relaxed);
        self.max_q.store(queue.max_q() as u32, Ordering::Relaxed);
        self.stall
            .store(u8::from(queue.is_stalled()), Ordering::Relaxed);
    }

    fn load(&self) -> QueueStats {
        QueueStats {
            len: self.len.load(Ordering::Relaxed) as usize,
            capacity: QUEUE_CAPACITY,
            underflow: self.underflow.load(Ordering::Relaxed),
            overflow: self.overflow.load(Ordering::Relaxed),
            max_q: self.max_q.load(Ordering::Relaxed) as usize,
            stall: self.stall.load(Ordering::Relaxed) != 0,
        }
    }
}

/// Values the audio thread publishes for the control side.
#[derive(Debug, Default)]
pub(crate) struct Telemetry {
    pub(crate) blocks: AtomicU64,
    signal_strength: AtomicU32,
    modulation_peak: AtomicU32,
    pub(crate) tx_trigger: AtomicU8,
    rx_input: QueueTelemetry,
    mic_input: QueueTelemetry,
    speaker_output: QueueTelemetry,
    tx_output: QueueTelemetry,
}

impl Telemetry {
    pub(crate) fn tx_trigger(&self) -> TxTrigger {
        TxTrigger::from_u8(self.tx_trigger.load(Ordering::Acquire))
    }

    pub(crate) fn stats(&self) -> EngineStats {
        EngineStats {
            blocks: self.blocks.load(Ordering::Relaxed),
            signal_strength: f32::from_bits(self.signal_strength.load(Ordering::Relaxed)),
            modulation_peak: f32::from_bits(self.modulation_peak.load(Ordering::Relaxed)),
            rx_input: self.rx_input.load(),
            mic_input: self.mic_input.load(),
            speaker_output: self.speaker_output.load(),
            tx_output: self.tx_output.load(),
        }
    }
}

/// Snapshot of the audio thread's counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineStats {
    /// Blocks of `BLOCK_SIZE` samples processed.
    pub blocks: u64,
    /// Held peak of the first receiver before AGC, linear.
    pub signal_strength: f32,
    pub modulation_peak: f32,
    pub rx_input: QueueStats,
    pub mic_input: QueueStats,
    pub speaker_output: QueueStats,
    pub tx_output: QueueStats,
}

impl EngineStats {
    /// S-meter reading in dBFS.
    pub fn rx_gain_db(&self) -> f32 {
        power2db(self.signal_strength * self.signal_strength)
    }
}

/// Initial radio setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    pub settings: DspSettings,
    /// Speaker volume, 0..=100.
    pub volume: u8,
    pub tx: TxConfig,
    /// Dial frequency the IF slot corresponds to.
    pub dial: Freq,
    /// Fixed offset between the oscillator and the dial, Hz.
    pub bfo_hz: i64,
    /// Operator adjustable calibration offset, Hz.
    pub bfo_offset_hz: i32,
    /// Position of the dial frequency within the IF band, Hz.
    pub if_slot_hz: i64,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            settings: DspSettings::default(),
            volume: 100,
            tx: TxConfig::default(),
            dial: Freq::default(),
            bfo_hz: 0,
            bfo_offset_hz: 0,
            if_slot_hz: DEFAULT_IF_HZ as i64,
        }
    }
}

/// Real-time half of the transceiver. Lives on the audio thread.
pub struct Radio {
    ctx: Arc<DspContext>,
    commands: mpsc::UnboundedReceiver<Command>,
    retired: mpsc::UnboundedSender<Retired>,
    telemetry: Arc<Telemetry>,
    spectrum: SpectrumEngine,
    receivers: Vec<Box<Receiver>>,
    transmitter: Box<Transmitter>,
    modem: Box<dyn Modem>,
    keyer: Box<dyn Keyer>,
    settings: DspSettings,
    volume: f32,
    rx_input: Queue,
    mic_input: Queue,
    speaker_output: Queue,
    tx_output: Queue,
    rx_block: Vec<f32>,
    mic_block: Vec<f32>,
    speaker_block: Vec<f32>,
    pcm_block: Vec<i32>,
    blocks: u64,
    overflow_seen: u32,
    last_overflow_warn: Option<u64>,
}

impl Radio {
    /// Build both halves of the radio. The oscillator is programmed once
    /// for the configured dial frequency.
    pub fn new(
        ctx: Arc<DspContext>,
        config: RadioConfig,
        modem: Box<dyn Modem>,
        keyer: Box<dyn Keyer>,
        lo: Box<dyn LocalOscillator>,
    ) -> Result<(Radio, RadioControl), DspError> {
        if config.volume > 100 {
            return Err(DspError::invalid_value("volume", config.volume));
        }
        let transmitter = Box::new(Transmitter::new(&config.tx)?);
        let spectrum = SpectrumEngine::new(&ctx);
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (retired, retired_rx) = mpsc::unbounded_channel();
        let telemetry = Arc::new(Telemetry::default());
        let mut receivers = Vec::new();
        receivers
            .try_reserve_exact(MAX_RECEIVERS)
            .map_err(|_| DspError::Allocation(MAX_RECEIVERS))?;

        let control = RadioControl::new(
            Arc::clone(&ctx),
            &config,
            command_tx,
            retired_rx,
            Arc::clone(&telemetry),
            spectrum.shared_plot(),
            lo,
        )?;

        let radio = Radio {
            ctx,
            commands,
            retired,
            telemetry,
            spectrum,
            receivers,
            transmitter,
            modem,
            keyer,
            settings: config.settings,
            volume: f32::from(config.volume) / 100.0,
            rx_input: Queue::new(QUEUE_CAPACITY),
            mic_input: Queue::new(QUEUE_CAPACITY),
            speaker_output: Queue::new(QUEUE_CAPACITY),
            tx_output: Queue::new(QUEUE_CAPACITY),
            rx_block: alloc_zeroed(BLOCK_SIZE)?,
            mic_block: alloc_zeroed(BLOCK_SIZE)?,
            speaker_block: alloc_zeroed(BLOCK_SIZE)?,
            pcm_block: alloc_zeroed(BLOCK_SIZE)?,
            blocks: 0,
            overflow_seen: 0,
            last_overflow_warn: None,
        };
        Ok((radio, control))
    }

    pub fn receivers(&self) -> &[Box<Receiver>] {
        &self.receivers
    }

    pub fn spectrum(&self) -> &SpectrumEngine {
        &self.spectrum
    }

    pub fn settings(&self) -> &DspSettings {
        &self.settings
    }

    pub fn transmitter(&self) -> &Transmitter {
        &self.transmitter
    }

    /// Run the radio for one driver callback.
    ///
    /// All slices carry signed 32-bit PCM at `SAMPLE_RATE`. `input_rx`
    /// drives the block count; a short `input_mic` is padded with silence.
    /// The outputs are always filled, with zeros while the pipeline is
    /// still priming.
    ///
    /// Input is staged at most one block ahead of processing, so callbacks
    /// of any length leave the queues within their capacity.
    pub fn sound_process(
        &mut self,
        input_rx: &[i32],
        input_mic: &[i32],
        output_speaker: &mut [i32],
        output_tx: &mut [i32],
    ) {
        self.apply_commands();

        let mut start = 0;
        while start < input_rx.len() {
            let room = BLOCK_SIZE.saturating_sub(self.rx_input.len()).max(1);
            let end = (start + room).min(input_rx.len());
            for (i, &sample) in input_rx[start..end].iter().enumerate() {
                self.rx_input.write(sample);
                self.mic_input
                    .write(input_mic.get(start + i).copied().unwrap_or(0));
            }
            while self.rx_input.len() >= BLOCK_SIZE {
                self.process_hop();
            }
            drain(&mut self.speaker_output, span(output_speaker, start, end));
            drain(&mut self.tx_output, span(output_tx, start, end));
            start = end;
        }

        // outputs longer than the input
        drain(&mut self.speaker_output, span(output_speaker, start, usize::MAX));
        drain(&mut self.tx_output, span(output_tx, start, usize::MAX));

        self.publish_telemetry();
    }

    fn apply_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            self.apply(command);
        }
    }

    fn receiver_mut(&mut self, id: RxHandle) -> Option<&mut Receiver> {
        self.receivers
            .iter_mut()
            .find(|rx| rx.handle() == id)
            .map(|rx| &mut **rx)
    }

    // If the control side is gone the item is simply dropped here.
    fn retire(&self, item: Retired) {
        let _ = self.retired.send(item);
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::AddReceiver(mut rx) => {
                rx.update_notch(&self.settings);
                if self.receivers.len() < MAX_RECEIVERS {
                    self.receivers.push(rx);
                } else {
                    warn!("No room for receiver {}", rx.handle().0);
                    self.retire(Retired::Receiver(rx));
                }
            }
            Command::RemoveReceiver(id) => {
                if let Some(index) = self.receivers.iter().position(|rx| rx.handle() == id) {
                    let rx = self.receivers.remove(index);
                    self.retire(Retired::Receiver(rx));
                }
            }
            Command::Retune {
                id,
                freq_hz,
                tuned_bin,
            } => {
                if let Some(rx) = self.receiver_mut(id) {
                    rx.retune(freq_hz, tuned_bin);
                }
            }
            Command::SetFilter {
                id,
                filter,
                low_hz,
                high_hz,
            } => {
                if let Some(rx) = self.receiver_mut(id) {
                    let old = rx.set_filter(filter, low_hz, high_hz);
                    self.retire(Retired::Filter(old));
                } else {
                    self.retire(Retired::Filter(filter));
                }
            }
            Command::SetMode {
                id,
                mode,
                filter,
                low_hz,
                high_hz,
            } => {
                let settings = self.settings;
                if let Some(rx) = self.receiver_mut(id) {
                    let (old_mode, old_filter) = rx.set_mode(mode, filter, low_hz, high_hz);
                    rx.update_notch(&settings);
                    self.retire(Retired::Mode(old_mode));
                    self.retire(Retired::Filter(old_filter));
                } else {
                    self.retire(Retired::Mode(mode));
                    self.retire(Retired::Filter(filter));
                }
            }
            Command::SetAgc { id, speed } => {
                if let Some(rx) = self.receiver_mut(id) {
                    rx.set_agc(speed);
                }
            }
            Command::SetOutput { id, output } => {
                if let Some(rx) = self.receiver_mut(id) {
                    rx.set_output(output);
                }
            }
            Command::SetSettings(settings) => {
                self.settings = settings;
                for rx in self.receivers.iter_mut() {
                    rx.update_notch(&settings);
                }
            }
            Command::SetVolume(volume) => self.volume = volume.clamp(0.0, 1.0),
            Command::SetTransmitter(tx) => {
                let old = std::mem::replace(&mut self.transmitter, tx);
                self.retire(Retired::Transmitter(old));
            }
            Command::SetCwInput(input) => self.keyer.set_input_method(input),
            Command::SetFt8Mode(mode) => self.modem.ft8_setmode(mode),
            Command::SetModemPitch { pitch_hz, mode } => {
                self.modem.modem_set_pitch(pitch_hz, &mode);
                self.retire(Retired::Mode(mode));
            }
            Command::Reset { force } => self.reset(force),
        }
    }

    /// Flush the staging queues and their counters. A forced reset also
    /// clears spectrum, filter and AGC history.
    fn reset(&mut self, force: bool) {
        self.rx_input.empty();
        self.mic_input.empty();
        self.speaker_output.empty();
        self.tx_output.empty();
        self.overflow_seen = 0;
        if force {
            self.spectrum.reset();
            self.transmitter.reset();
            for rx in self.receivers.iter_mut() {
                rx.reset();
            }
        }
    }

    fn process_hop(&mut self) {
        for s in self.rx_block.iter_mut() {
            *s = self.rx_input.read().unwrap_or(0) as f32 / PCM_FULL_SCALE;
        }
        for s in self.mic_block.iter_mut() {
            *s = self.mic_input.read().unwrap_or(0) as f32 / PCM_FULL_SCALE;
        }

        self.spectrum.process(&self.rx_block);
        self.modem.modem_poll(self.transmitter.mode());

        if self.telemetry.tx_trigger() != TxTrigger::Off {
            self.transmit_hop();
        } else {
            self.receive_hop();
        }

        for &s in self.speaker_block.iter() {
            self.speaker_output.write(to_pcm(s * self.volume));
        }
        self.blocks += 1;
        self.check_overflow();
    }

    fn transmit_hop(&mut self) {
        let key = self.keyer.key_poll() | self.keyer.key_poll2();
        let tx = self.transmitter.process(
            self.ctx.phase_table(),
            &self.mic_block,
            is_key_down(key),
            self.modem.as_mut(),
            &self.settings,
        );
        for &s in tx.iter() {
            self.tx_output.write(to_pcm(s));
        }
        self.speaker_block.copy_from_slice(self.transmitter.monitor());
    }

    fn receive_hop(&mut self) {
        self.speaker_block.fill(0.0);
        for rx in self.receivers.iter_mut() {
            rx.process(
                self.ctx.phase_table(),
                self.spectrum.fft_bins(),
                &self.settings,
            );
            match rx.output() {
                RxOutput::Speaker => {
                    for (out, s) in self.speaker_block.iter_mut().zip(rx.audio().iter()) {
                        *out += s;
                    }
                }
                RxOutput::Network => rx.publish(),
                RxOutput::None => {}
            }
            if rx.mode().is_digital() {
                for (pcm, &s) in self.pcm_block.iter_mut().zip(rx.audio().iter()) {
                    *pcm = to_pcm(s);
                }
                self.modem.modem_rx(rx.mode(), &self.pcm_block);
            }
        }
        // keep the transmit stream running at the same cadence
        for _ in 0..BLOCK_SIZE {
            self.tx_output.write(0);
        }
    }

    fn check_overflow(&mut self) {
        let overflow = self.rx_input.overflow()
            + self.mic_input.overflow()
            + self.speaker_output.overflow()
            + self.tx_output.overflow();
        if overflow == self.overflow_seen {
            return;
        }
        let due = self
            .last_overflow_warn
            .map_or(true, |last| self.blocks - last >= OVERFLOW_WARN_BLOCKS);
        if due {
            warn!(
                "Audio queue overflow: {} samples dropped since last report",
                overflow.saturating_sub(self.overflow_seen)
            );
            self.overflow_seen = overflow;
            self.last_overflow_warn = Some(self.blocks);
        }
    }

    fn publish_telemetry(&self) {
        let t = &self.telemetry;
        t.blocks.store(self.blocks, Ordering::Relaxed);
        let strength = self
            .receivers
            .first()
            .map(|rx| rx.agc().signal_strength)
            .unwrap_or(0.0);
        t.signal_strength
            .store(strength.to_bits(), Ordering::Relaxed);
        t.modulation_peak
            .store(self.transmitter.modulation_peak().to_bits(), Ordering::Relaxed);
        t.rx_input.store(&self.rx_input);
        t.mic_input.store(&self.mic_input);
        t.speaker_output.store(&self.speaker_output);
        t.tx_output.store(&self.tx_output);
    }
}

/// `out[start..end]`, clamped to the slice.
fn span(out: &mut [i32], start: usize, end: usize) -> &mut [i32] {
    let len = out.len();
    &mut out[start.min(len)..end.min(len)]
}

/// Fill `out` from `queue`, with silence once it runs dry.
fn drain(queue: &mut Queue, out: &mut [i32]) {
    for sample in out.iter_mut() {
        *sample = queue.read().unwrap_or(0);
    }
}

impl std::fmt::Debug for Radio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Radio")
            .field("receivers", &self.receivers)
            .field("transmitter", &self.transmitter)
            .field("settings", &self.settings)
            .field("blocks", &self.blocks)
            .finish_non_exhaustive()
    }
}
