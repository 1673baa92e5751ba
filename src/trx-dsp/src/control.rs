// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Control half of the radio.
//!
//! Every request is validated and every filter or receiver is fully built
//! here before it is posted to the audio thread; a rejected request leaves
//! the running configuration untouched.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace, warn};
use trx_core::{
    AgcSpeed, CwInput, DspSettings, Freq, Ft8Mode, Mode, RadioSnapshot, ReceiverStatus,
    RigCommand, RigError, RxOutput, TxTrigger,
};

use crate::context::DspContext;
use crate::dsp::conditioning::MAX_NOISE_THRESHOLD;
use crate::engine::{Command, EngineStats, RadioConfig, Retired, Telemetry, MAX_RECEIVERS};
use crate::error::DspError;
use crate::modem::LocalOscillator;
use crate::rx::{bin_for_freq, design_filter, PcmFrame, Receiver, RxConfig, RxHandle};
use crate::tx::{Transmitter, TxConfig};

const MAX_COMPRESSION_LEVEL: u8 = 10;
const PITCH_RANGE_HZ: std::ops::RangeInclusive<u32> = 300..=3000;

/// Control-side view of a receiver on the audio thread.
struct RxEntry {
    handle: RxHandle,
    config: RxConfig,
    tuned_bin: usize,
    low_hz: i32,
    high_hz: i32,
    pcm: broadcast::Sender<PcmFrame>,
}

impl RxEntry {
    fn status(&self) -> ReceiverStatus {
        ReceiverStatus {
            id: self.handle.0,
            freq_hz: self.config.freq_hz,
            tuned_bin: self.tuned_bin,
            mode: self.config.mode.clone(),
            low_hz: self.low_hz,
            high_hz: self.high_hz,
            agc: self.config.agc,
            output: self.config.output,
        }
    }
}

struct ControlState {
    next_id: u32,
    receivers: Vec<RxEntry>,
    settings: DspSettings,
    volume: u8,
    tx: TxConfig,
    dial: Freq,
    lo: Freq,
    bfo_hz: i64,
    bfo_offset_hz: i32,
    if_slot_hz: i64,
}

impl ControlState {
    fn position(&self, handle: RxHandle) -> Result<usize, DspError> {
        self.receivers
            .iter()
            .position(|rx| rx.handle == handle)
            .ok_or(DspError::UnknownReceiver(handle.0))
    }

    fn lo_for(&self, dial: Freq, bfo_offset_hz: i32) -> Result<Freq, DspError> {
        let offset = self.bfo_hz + i64::from(bfo_offset_hz) - self.if_slot_hz;
        dial.checked_offset(offset)
            .ok_or(DspError::InvalidTuning(dial.hz as f64))
    }
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

fn validate_settings(settings: &DspSettings) -> Result<(), DspError> {
    if !(0..=MAX_NOISE_THRESHOLD).contains(&settings.noise_threshold) {
        return Err(DspError::invalid_value(
            "noise_threshold",
            settings.noise_threshold,
        ));
    }
    if settings.noise_update_interval == 0 {
        return Err(DspError::invalid_value(
            "noise_interval",
            settings.noise_update_interval,
        ));
    }
    if settings.compression_control_level > MAX_COMPRESSION_LEVEL {
        return Err(DspError::invalid_value(
            "comp",
            settings.compression_control_level,
        ));
    }
    if settings.input_volume > 100 {
        return Err(DspError::invalid_value("input_volume", settings.input_volume));
    }
    if settings.txmon_control_level > 100 {
        return Err(DspError::invalid_value(
            "txmon",
            settings.txmon_control_level,
        ));
    }
    if !settings.notch_freq.is_finite() || settings.notch_freq <= 0.0 {
        return Err(DspError::invalid_value("notch_freq", settings.notch_freq));
    }
    if !settings.notch_bandwidth.is_finite() || settings.notch_bandwidth <= 0.0 {
        return Err(DspError::invalid_value(
            "notch_bw",
            settings.notch_bandwidth,
        ));
    }
    Ok(())
}

/// Cloneable handle used by control threads to drive a [`crate::Radio`].
#[derive(Clone)]
pub struct RadioControl {
    ctx: Arc<DspContext>,
    commands: mpsc::UnboundedSender<Command>,
    retired: Arc<Mutex<mpsc::UnboundedReceiver<Retired>>>,
    telemetry: Arc<Telemetry>,
    state: Arc<Mutex<ControlState>>,
    lo: Arc<Mutex<Box<dyn LocalOscillator>>>,
    spectrum_plot: Arc<Mutex<Vec<f32>>>,
}

impl RadioControl {
    pub(crate) fn new(
        ctx: Arc<DspContext>,
        config: &RadioConfig,
        commands: mpsc::UnboundedSender<Command>,
        retired: mpsc::UnboundedReceiver<Retired>,
        telemetry: Arc<Telemetry>,
        spectrum_plot: Arc<Mutex<Vec<f32>>>,
        lo: Box<dyn LocalOscillator>,
    ) -> Result<Self, DspError> {
        validate_settings(&config.settings)?;
        let mut state = ControlState {
            next_id: 1,
            receivers: Vec::new(),
            settings: config.settings,
            volume: config.volume,
            tx: config.tx.clone(),
            dial: config.dial,
            lo: config.dial,
            bfo_hz: config.bfo_hz,
            bfo_offset_hz: config.bfo_offset_hz,
            if_slot_hz: config.if_slot_hz,
        };
        state.lo = state.lo_for(config.dial, config.bfo_offset_hz)?;

        let control = Self {
            ctx,
            commands,
            retired: Arc::new(Mutex::new(retired)),
            telemetry,
            state: Arc::new(Mutex::new(state)),
            lo: Arc::new(Mutex::new(lo)),
            spectrum_plot,
        };
        control.resetup_oscillators()?;
        Ok(control)
    }

    // The audio thread never takes this lock, so a poisoned state is still
    // consistent: every change is validated before it is written.
    fn state(&self) -> MutexGuard<'_, ControlState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, command: Command) -> Result<(), DspError> {
        self.collect_retired();
        self.commands
            .send(command)
            .map_err(|_| DspError::Disconnected)
    }

    /// Free whatever the audio thread has replaced since the last call.
    /// Runs on every change; returns the number of items released.
    pub fn collect_retired(&self) -> usize {
        let mut retired = self.retired.lock().unwrap_or_else(PoisonError::into_inner);
        let mut count = 0;
        while let Ok(item) = retired.try_recv() {
            match &item {
                Retired::Receiver(rx) => debug!("Receiver {} released", rx.handle().0),
                Retired::Filter(filter) => trace!("Filter of {} taps released", filter.m()),
                Retired::Transmitter(tx) => trace!("{} transmitter released", tx.mode()),
                Retired::Mode(mode) => trace!("Mode {} released", mode),
            }
            drop(item);
            count += 1;
        }
        count
    }

    fn program_lo(&self, freq: Freq) -> Result<(), DspError> {
        let mut lo = self.lo.lock().unwrap_or_else(PoisonError::into_inner);
        lo.set_lo(freq)
    }

    // ---- receivers ----

    pub fn add_receiver(&self, config: RxConfig) -> Result<RxHandle, DspError> {
        let mut state = self.state();
        if state.receivers.len() >= MAX_RECEIVERS {
            return Err(DspError::TooManyReceivers(MAX_RECEIVERS));
        }
        let handle = RxHandle(state.next_id);
        let rx = Receiver::new(&self.ctx, handle, &config)?;
        let (low_hz, high_hz) = rx.passband();
        let entry = RxEntry {
            handle,
            tuned_bin: rx.tuned_bin(),
            low_hz,
            high_hz,
            pcm: rx.pcm_sender(),
            config,
        };
        self.send(Command::AddReceiver(Box::new(rx)))?;
        state.next_id += 1;
        info!(
            "Receiver {} added: {} at {:.1} Hz IF, passband {}..{} Hz",
            handle.0, entry.config.mode, entry.config.freq_hz, low_hz, high_hz
        );
        state.receivers.push(entry);
        Ok(handle)
    }

    pub fn remove_receiver(&self, handle: RxHandle) -> Result<(), DspError> {
        let mut state = self.state();
        let index = state.position(handle)?;
        self.send(Command::RemoveReceiver(handle))?;
        state.receivers.remove(index);
        info!("Receiver {} removed", handle.0);
        Ok(())
    }

    /// Move a receiver's carrier to `freq_hz` within the IF.
    pub fn tune(&self, handle: RxHandle, freq_hz: f64) -> Result<(), DspError> {
        let mut state = self.state();
        let index = state.position(handle)?;
        let tuned_bin = bin_for_freq(freq_hz)?;
        self.send(Command::Retune {
            id: handle,
            freq_hz,
            tuned_bin,
        })?;
        let entry = &mut state.receivers[index];
        entry.config.freq_hz = freq_hz;
        entry.tuned_bin = tuned_bin;
        debug!("Receiver {} tuned to {:.1} Hz (bin {})", handle.0, freq_hz, tuned_bin);
        Ok(())
    }

    /// Switch demodulator; the passband returns to the mode's default.
    pub fn set_mode(&self, handle: RxHandle, mode: Mode) -> Result<(), DspError> {
        let mut state = self.state();
        let index = state.position(handle)?;
        let mut config = state.receivers[index].config.clone();
        config.mode = mode.clone();
        config.low_hz = None;
        config.high_hz = None;
        let (low_hz, high_hz) = config.passband();
        let filter = design_filter(low_hz, high_hz)?;
        self.send(Command::SetMode {
            id: handle,
            mode,
            filter,
            low_hz,
            high_hz,
        })?;
        let entry = &mut state.receivers[index];
        debug!("Receiver {} mode {}", handle.0, config.mode);
        entry.config = config;
        entry.low_hz = low_hz;
        entry.high_hz = high_hz;
        Ok(())
    }

    pub fn set_passband(&self, handle: RxHandle, low_hz: i32, high_hz: i32) -> Result<(), DspError> {
        let mut state = self.state();
        let index = state.position(handle)?;
        self.apply_passband(&mut state, index, low_hz, high_hz)
    }

    /// Move one edge of the passband of the receiver at `index`, keeping
    /// the other where it is.
    pub fn set_passband_edge(
        &self,
        index: usize,
        low_hz: Option<i32>,
        high_hz: Option<i32>,
    ) -> Result<(), DspError> {
        let mut state = self.state();
        let entry = state
            .receivers
            .get(index)
            .ok_or(DspError::UnknownReceiver(index as u32 + 1))?;
        let low_hz = low_hz.unwrap_or(entry.low_hz);
        let high_hz = high_hz.unwrap_or(entry.high_hz);
        self.apply_passband(&mut state, index, low_hz, high_hz)
    }

    fn apply_passband(
        &self,
        state: &mut ControlState,
        index: usize,
        low_hz: i32,
        high_hz: i32,
    ) -> Result<(), DspError> {
        let handle = state.receivers[index].handle;
        let filter = design_filter(low_hz, high_hz)?;
        self.send(Command::SetFilter {
            id: handle,
            filter,
            low_hz,
            high_hz,
        })?;
        let entry = &mut state.receivers[index];
        entry.config.low_hz = Some(low_hz);
        entry.config.high_hz = Some(high_hz);
        entry.low_hz = low_hz;
        entry.high_hz = high_hz;
        debug!("Receiver {} passband {}..{} Hz", handle.0, low_hz, high_hz);
        Ok(())
    }

    pub fn set_agc(&self, handle: RxHandle, speed: AgcSpeed) -> Result<(), DspError> {
        let mut state = self.state();
        let index = state.position(handle)?;
        self.send(Command::SetAgc { id: handle, speed })?;
        state.receivers[index].config.agc = speed;
        Ok(())
    }

    pub fn set_output(&self, handle: RxHandle, output: RxOutput) -> Result<(), DspError> {
        let mut state = self.state();
        let index = state.position(handle)?;
        self.send(Command::SetOutput { id: handle, output })?;
        state.receivers[index].config.output = output;
        Ok(())
    }

    /// Audio frames of a receiver whose output is `network`.
    pub fn subscribe(&self, handle: RxHandle) -> Result<broadcast::Receiver<PcmFrame>, DspError> {
        let state = self.state();
        let index = state.position(handle)?;
        Ok(state.receivers[index].pcm.subscribe())
    }

    /// Handle of the receiver at `index` in creation order.
    pub fn receiver_handle(&self, index: usize) -> Result<RxHandle, DspError> {
        self.state()
            .receivers
            .get(index)
            .map(|rx| rx.handle)
            .ok_or(DspError::UnknownReceiver(index as u32 + 1))
    }

    pub fn receivers(&self) -> Vec<ReceiverStatus> {
        self.state().receivers.iter().map(RxEntry::status).collect()
    }

    // ---- settings ----

    fn apply_settings(
        &self,
        state: &mut ControlState,
        settings: DspSettings,
    ) -> Result<(), DspError> {
        validate_settings(&settings)?;
        self.send(Command::SetSettings(settings))?;
        state.settings = settings;
        debug!("DSP settings {:?}", settings);
        Ok(())
    }

    pub fn set_settings(&self, settings: DspSettings) -> Result<(), DspError> {
        let mut state = self.state();
        self.apply_settings(&mut state, settings)
    }

    fn update_settings(&self, f: impl FnOnce(&mut DspSettings)) -> Result<(), DspError> {
        let mut state = self.state();
        let mut settings = state.settings;
        f(&mut settings);
        self.apply_settings(&mut state, settings)
    }

    pub fn settings(&self) -> DspSettings {
        self.state().settings
    }

    /// Speaker volume, 0..=100.
    pub fn set_volume(&self, volume: u8) -> Result<(), DspError> {
        if volume > 100 {
            return Err(DspError::invalid_value("volume", volume));
        }
        let mut state = self.state();
        self.send(Command::SetVolume(f32::from(volume) / 100.0))?;
        state.volume = volume;
        Ok(())
    }

    /// Microphone gain, 0..=100.
    pub fn set_input_volume(&self, volume: u8) -> Result<(), DspError> {
        self.update_settings(|s| s.input_volume = volume)
    }

    // ---- oscillator ----

    /// Program the oscillator so that `dial` lands on the IF slot.
    pub fn set_lo(&self, dial: Freq) -> Result<Freq, DspError> {
        let mut state = self.state();
        let lo = state.lo_for(dial, state.bfo_offset_hz)?;
        self.program_lo(lo)?;
        state.dial = dial;
        state.lo = lo;
        info!("Dial {} Hz, LO {} Hz", dial, lo.hz);
        Ok(lo)
    }

    /// Change the calibration offset and re-program the oscillator for
    /// `dial`.
    pub fn set_bfo_offset(&self, offset_hz: i32, dial: Freq) -> Result<Freq, DspError> {
        let mut state = self.state();
        let lo = state.lo_for(dial, offset_hz)?;
        self.program_lo(lo)?;
        state.bfo_offset_hz = offset_hz;
        state.dial = dial;
        state.lo = lo;
        info!("BFO offset {} Hz, LO {} Hz", offset_hz, lo.hz);
        Ok(lo)
    }

    pub fn get_bfo_offset(&self) -> i32 {
        self.state().bfo_offset_hz
    }

    /// Program the oscillator again from the stored dial and offsets.
    pub fn resetup_oscillators(&self) -> Result<Freq, DspError> {
        let mut state = self.state();
        let lo = state.lo_for(state.dial, state.bfo_offset_hz)?;
        self.program_lo(lo)?;
        state.lo = lo;
        info!("LO set to {} Hz for dial {}", lo.hz, state.dial);
        Ok(lo)
    }

    // ---- transmit ----

    pub fn tx_on(&self, trigger: TxTrigger) {
        if trigger == TxTrigger::Off {
            self.tx_off();
            return;
        }
        let previous = self
            .telemetry
            .tx_trigger
            .swap(trigger.as_u8(), Ordering::AcqRel);
        if previous == TxTrigger::Off.as_u8() {
            info!("TX on ({:?})", trigger);
        }
    }

    pub fn tx_off(&self) {
        let previous = self
            .telemetry
            .tx_trigger
            .swap(TxTrigger::Off.as_u8(), Ordering::AcqRel);
        if previous != TxTrigger::Off.as_u8() {
            info!("TX off");
        }
    }

    pub fn is_in_tx(&self) -> bool {
        self.telemetry.tx_trigger() != TxTrigger::Off
    }

    fn rebuild_transmitter(&self, state: &mut ControlState, config: TxConfig) -> Result<(), DspError> {
        let tx = Transmitter::new(&config)?;
        self.send(Command::SetTransmitter(Box::new(tx)))?;
        if config.mode.is_digital() {
            self.send(Command::SetModemPitch {
                pitch_hz: config.pitch_hz,
                mode: config.mode.clone(),
            })?;
        }
        debug!(
            "Transmitter {} at {:.1} Hz IF, pitch {} Hz",
            config.mode, config.freq_hz, config.pitch_hz
        );
        state.tx = config;
        Ok(())
    }

    pub fn set_tx_mode(&self, mode: Mode) -> Result<(), DspError> {
        let mut state = self.state();
        let config = TxConfig {
            mode,
            ..state.tx.clone()
        };
        self.rebuild_transmitter(&mut state, config)
    }

    pub fn set_tx_freq(&self, freq_hz: f64) -> Result<(), DspError> {
        let mut state = self.state();
        let config = TxConfig {
            freq_hz,
            ..state.tx.clone()
        };
        self.rebuild_transmitter(&mut state, config)
    }

    /// CW and digital pitch. CW receivers on their default passband follow.
    pub fn set_pitch(&self, pitch_hz: u32) -> Result<(), DspError> {
        if !PITCH_RANGE_HZ.contains(&pitch_hz) {
            return Err(DspError::invalid_value("pitch", pitch_hz));
        }
        let mut state = self.state();
        let config = TxConfig {
            pitch_hz,
            ..state.tx.clone()
        };
        self.rebuild_transmitter(&mut state, config)?;

        for entry in state.receivers.iter_mut() {
            entry.config.pitch_hz = pitch_hz;
            let follows = entry.config.mode.is_cw()
                && entry.config.low_hz.is_none()
                && entry.config.high_hz.is_none();
            if !follows {
                continue;
            }
            let (low_hz, high_hz) = entry.config.passband();
            let filter = design_filter(low_hz, high_hz)?;
            self.send(Command::SetFilter {
                id: entry.handle,
                filter,
                low_hz,
                high_hz,
            })?;
            entry.low_hz = low_hz;
            entry.high_hz = high_hz;
        }
        Ok(())
    }

    pub fn set_cw_input(&self, input: CwInput) -> Result<(), DspError> {
        self.send(Command::SetCwInput(input))
    }

    pub fn set_ft8_mode(&self, mode: Ft8Mode) -> Result<(), DspError> {
        self.send(Command::SetFt8Mode(mode))
    }

    // ---- telemetry ----

    /// S-meter of the first receiver, dBFS.
    pub fn get_rx_gain(&self) -> f32 {
        self.telemetry.stats().rx_gain_db()
    }

    /// Latest display spectrum, dB per bin up to Nyquist.
    pub fn spectrum_plot(&self) -> Vec<f32> {
        self.spectrum_plot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn queue_stats(&self) -> EngineStats {
        self.telemetry.stats()
    }

    pub fn snapshot(&self) -> RadioSnapshot {
        let stats = self.telemetry.stats();
        let trigger = self.telemetry.tx_trigger();
        let state = self.state();
        RadioSnapshot {
            freq: state.dial,
            lo_hz: state.lo.hz as i64,
            bfo_offset_hz: state.bfo_offset_hz,
            tx: trigger != TxTrigger::Off,
            tx_trigger: trigger,
            tx_mode: state.tx.mode.clone(),
            pitch_hz: state.tx.pitch_hz,
            volume: state.volume,
            rx_gain_db: stats.rx_gain_db(),
            modulation_peak: stats.modulation_peak,
            settings: state.settings,
            receivers: state.receivers.iter().map(RxEntry::status).collect(),
        }
    }

    /// Flush the audio queues at the next block boundary.
    pub fn sound_reset(&self, force: bool) -> Result<(), DspError> {
        self.send(Command::Reset { force })?;
        debug!("Sound reset requested (force: {})", force);
        Ok(())
    }

    // ---- text protocol ----

    /// Execute one protocol line, discarding any reply.
    pub fn cmd_exec(&self, line: &str) -> Result<(), RigError> {
        let command: RigCommand = line.parse()?;
        self.execute(command).map(|_| ())
    }

    /// Execute one protocol line and format the reply: `ok`, `key=value`,
    /// a JSON snapshot for `status?` or `error <message>`.
    pub fn sdr_request(&self, line: &str) -> String {
        let result = line
            .parse::<RigCommand>()
            .and_then(|command| self.execute(command));
        match result {
            Ok(Some(reply)) => reply,
            Ok(None) => "ok".to_string(),
            Err(err) => {
                warn!("Rejected request {:?}: {}", line.trim(), err);
                format!("error {err}")
            }
        }
    }

    fn execute(&self, command: RigCommand) -> Result<Option<String>, RigError> {
        match command {
            RigCommand::Status => {
                let json = serde_json::to_string(&self.snapshot())
                    .map_err(|e| RigError(e.to_string()))?;
                return Ok(Some(json));
            }
            RigCommand::Get { rx, key } => return self.query(rx, &key).map(Some),
            RigCommand::SetFreq(freq) => {
                self.set_lo(freq)?;
            }
            RigCommand::SetMode(mode) => {
                if let Ok(primary) = self.receiver_handle(0) {
                    self.set_mode(primary, mode.clone())?;
                }
                self.set_tx_mode(mode)?;
            }
            RigCommand::SetPtt(true) => self.tx_on(TxTrigger::Soft),
            RigCommand::SetPtt(false) => self.tx_off(),
            RigCommand::SetBfoOffset(offset) => {
                let dial = self.state().dial;
                self.set_bfo_offset(offset, dial)?;
            }
            RigCommand::SetVolume(volume) => self.set_volume(volume)?,
            RigCommand::SetInputVolume(volume) => self.set_input_volume(volume)?,
            RigCommand::SetNotch(on) => self.update_settings(|s| s.notch_enabled = on)?,
            RigCommand::SetNotchFreq(hz) => self.update_settings(|s| s.notch_freq = hz)?,
            RigCommand::SetNotchBandwidth(hz) => {
                self.update_settings(|s| s.notch_bandwidth = hz)?
            }
            RigCommand::SetAnr(on) => self.update_settings(|s| s.anr_enabled = on)?,
            RigCommand::SetDsp(on) => self.update_settings(|s| s.dsp_enabled = on)?,
            RigCommand::SetNoiseThreshold(level) => {
                self.update_settings(|s| s.noise_threshold = level)?
            }
            RigCommand::SetNoiseInterval(blocks) => {
                self.update_settings(|s| s.noise_update_interval = blocks)?
            }
            RigCommand::SetCompression(level) => {
                self.update_settings(|s| s.compression_control_level = level)?
            }
            RigCommand::SetTxMonitor(level) => {
                self.update_settings(|s| s.txmon_control_level = level)?
            }
            RigCommand::SetPitch(pitch) => self.set_pitch(pitch)?,
            RigCommand::SetTxMode(mode) => self.set_tx_mode(mode)?,
            RigCommand::SetTxFreq(hz) => self.set_tx_freq(hz)?,
            RigCommand::SetCwInput(input) => self.set_cw_input(input)?,
            RigCommand::SetFt8Mode(mode) => self.set_ft8_mode(mode)?,
            RigCommand::Reset => self.sound_reset(true)?,
            RigCommand::SetRxFreq { rx, hz } => self.tune(self.receiver_handle(rx)?, hz)?,
            RigCommand::SetRxMode { rx, mode } => self.set_mode(self.receiver_handle(rx)?, mode)?,
            RigCommand::SetRxLow { rx, hz } => self.set_passband_edge(rx, Some(hz), None)?,
            RigCommand::SetRxHigh { rx, hz } => self.set_passband_edge(rx, None, Some(hz))?,
            RigCommand::SetRxAgc { rx, speed } => self.set_agc(self.receiver_handle(rx)?, speed)?,
            RigCommand::SetRxOutput { rx, output } => {
                self.set_output(self.receiver_handle(rx)?, output)?
            }
        }
        Ok(None)
    }

    fn query(&self, rx: Option<usize>, key: &str) -> Result<String, RigError> {
        if let Some(index) = rx {
            let status = self
                .receivers()
                .into_iter()
                .nth(index)
                .ok_or(DspError::UnknownReceiver(index as u32 + 1))?;
            let value = match key {
                "freq" => status.freq_hz.to_string(),
                "mode" => status.mode.to_string(),
                "low" => status.low_hz.to_string(),
                "high" => status.high_hz.to_string(),
                "agc" => status.agc.as_str().to_string(),
                "output" => status.output.as_str().to_string(),
                _ => return Err(DspError::UnknownCommand(key.to_string()).into()),
            };
            return Ok(format!("r{}:{}={}", index + 1, key, value));
        }

        let snapshot = self.snapshot();
        let settings = &snapshot.settings;
        let value = match key {
            "freq" => snapshot.freq.hz.to_string(),
            "mode" => snapshot
                .receivers
                .first()
                .map(|rx| rx.mode.clone())
                .unwrap_or(snapshot.tx_mode.clone())
                .to_string(),
            "tx" | "ptt" => on_off(snapshot.tx).to_string(),
            "bfo" => snapshot.bfo_offset_hz.to_string(),
            "lo" => snapshot.lo_hz.to_string(),
            "volume" => snapshot.volume.to_string(),
            "input_volume" => settings.input_volume.to_string(),
            "notch" => on_off(settings.notch_enabled).to_string(),
            "notch_freq" => settings.notch_freq.to_string(),
            "notch_bw" => settings.notch_bandwidth.to_string(),
            "anr" => on_off(settings.anr_enabled).to_string(),
            "dsp" => on_off(settings.dsp_enabled).to_string(),
            "noise_threshold" => settings.noise_threshold.to_string(),
            "noise_interval" => settings.noise_update_interval.to_string(),
            "comp" => settings.compression_control_level.to_string(),
            "txmon" => settings.txmon_control_level.to_string(),
            "pitch" => snapshot.pitch_hz.to_string(),
            "tx_mode" => snapshot.tx_mode.to_string(),
            "tx_freq" => self.state().tx.freq_hz.to_string(),
            "gain" => format!("{:.1}", snapshot.rx_gain_db),
            "peak" => format!("{:.3}", snapshot.modulation_peak),
            _ => return Err(DspError::UnknownCommand(key.to_string()).into()),
        };
        Ok(format!("{key}={value}"))
    }
}

impl std::fmt::Debug for RadioControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("RadioControl")
            .field("dial", &state.dial)
            .field("lo", &state.lo)
            .field("receivers", &state.receivers.len())
            .finish_non_exhaustive()
    }
}
