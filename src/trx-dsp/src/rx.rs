// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::sync::Arc;

use num_complex::Complex;
use rustfft::Fft;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use trx_core::{AgcSpeed, DspSettings, Mode, ReceiverStatus, RxOutput};

use crate::context::DspContext;
use crate::demod::Demodulator;
use crate::dsp::agc::Agc;
use crate::dsp::alloc_zeroed;
use crate::dsp::conditioning::{
    apply_fixed_compression, build_notch_mask, scale_noise_threshold, Anr, NoiseGate,
};
use crate::dsp::filter::{Filter, DEFAULT_KAISER_BETA};
use crate::error::DspError;
use crate::vfo::PhaseTable;
use crate::{BIN_HZ, BLOCK_SIZE, MAX_BINS, SAMPLE_RATE};

/// IF frequency a receiver listens on when none is configured.
pub const DEFAULT_IF_HZ: f64 = 12_000.0;
pub const DEFAULT_PITCH_HZ: u32 = 700;
/// Half width of the CW passband around the pitch.
const CW_HALF_WIDTH_HZ: i32 = 250;
/// Network frames buffered per subscriber.
const PCM_CHANNEL_CAPACITY: usize = 32;
/// Frames preallocated for network output. A frame is reused once every
/// subscriber has let go of it.
pub const PCM_FRAME_POOL: usize = PCM_CHANNEL_CAPACITY + 8;

/// One block of demodulated audio shared with network subscribers.
pub type PcmFrame = Arc<[f32]>;

/// Stable identifier of a receiver, independent of its position in the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RxHandle(pub u32);

/// Passband relative to the carrier used when none is given.
pub fn default_passband(mode: &Mode, pitch_hz: u32) -> (i32, i32) {
    let pitch = pitch_hz as i32;
    match mode {
        Mode::USB | Mode::TwoTone | Mode::Calibrate | Mode::Other(_) => (300, 3000),
        Mode::LSB => (-3000, -300),
        Mode::CW => (pitch - CW_HALF_WIDTH_HZ, pitch + CW_HALF_WIDTH_HZ),
        Mode::CWR => (-pitch - CW_HALF_WIDTH_HZ, -pitch + CW_HALF_WIDTH_HZ),
        Mode::AM => (-4500, 4500),
        Mode::NBFM => (-7500, 7500),
        Mode::FM => (-16_000, 16_000),
        Mode::FT8 | Mode::PSK31 | Mode::RTTY | Mode::DIGITAL => (50, 3000),
    }
}

/// Spectrum bin nearest to an IF frequency; anything outside 0 Hz..Nyquist
/// is refused.
pub fn bin_for_freq(freq_hz: f64) -> Result<usize, DspError> {
    let nyquist = f64::from(SAMPLE_RATE) / 2.0;
    if !freq_hz.is_finite() || !(0.0..nyquist).contains(&freq_hz) {
        return Err(DspError::InvalidTuning(freq_hz));
    }
    let bin = (freq_hz / f64::from(BIN_HZ)).round() as usize;
    if bin >= MAX_BINS / 2 {
        return Err(DspError::InvalidTuning(freq_hz));
    }
    Ok(bin)
}

/// Build the channel filter for a passband. Runs on the control thread.
pub fn design_filter(low_hz: i32, high_hz: i32) -> Result<Box<Filter>, DspError> {
    let mut filter = Filter::new(BLOCK_SIZE, BLOCK_SIZE + 1)?;
    filter.tune(low_hz as f32, high_hz as f32, DEFAULT_KAISER_BETA)?;
    Ok(Box::new(filter))
}

/// How a receiver is set up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RxConfig {
    /// Carrier position within the IF, Hz.
    pub freq_hz: f64,
    pub mode: Mode,
    pub low_hz: Option<i32>,
    pub high_hz: Option<i32>,
    pub agc: AgcSpeed,
    pub output: RxOutput,
    pub pitch_hz: u32,
}

impl Default for RxConfig {
    fn default() -> Self {
        Self {
            freq_hz: DEFAULT_IF_HZ,
            mode: Mode::USB,
            low_hz: None,
            high_hz: None,
            agc: AgcSpeed::Medium,
            output: RxOutput::Speaker,
            pitch_hz: DEFAULT_PITCH_HZ,
        }
    }
}

impl RxConfig {
    pub fn passband(&self) -> (i32, i32) {
        let (low, high) = default_passband(&self.mode, self.pitch_hz);
        (self.low_hz.unwrap_or(low), self.high_hz.unwrap_or(high))
    }
}

/// One demodulation chain reading the shared spectrum.
///
/// Built on the control thread with every buffer allocated, then moved to
/// the audio thread; [`Receiver::process`] itself never allocates.
pub struct Receiver {
    handle: RxHandle,
    freq_hz: f64,
    tuned_bin: usize,
    mode: Mode,
    low_hz: i32,
    high_hz: i32,
    output: RxOutput,
    agc: Agc,
    filter: Box<Filter>,
    notch_mask: Vec<f32>,
    noise_gate: NoiseGate,
    anr: Anr,
    demodulator: Demodulator,
    ifft: Arc<dyn Fft<f32>>,
    fft_freq: Vec<Complex<f32>>,
    fft_scratch: Vec<Complex<f32>>,
    audio: Vec<f32>,
    hops: u64,
    pcm_tx: broadcast::Sender<PcmFrame>,
    frames: Vec<PcmFrame>,
    next_frame: usize,
    frames_skipped: u64,
}

impl Receiver {
    pub fn new(ctx: &DspContext, handle: RxHandle, config: &RxConfig) -> Result<Self, DspError> {
        let tuned_bin = bin_for_freq(config.freq_hz)?;
        let (low_hz, high_hz) = config.passband();
        let filter = design_filter(low_hz, high_hz)?;
        let (pcm_tx, _) = broadcast::channel(PCM_CHANNEL_CAPACITY);
        let mut notch_mask = alloc_zeroed(MAX_BINS)?;
        notch_mask.fill(1.0);
        let frames = (0..PCM_FRAME_POOL)
            .map(|_| alloc_zeroed::<f32>(BLOCK_SIZE).map(PcmFrame::from))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            handle,
            freq_hz: config.freq_hz,
            tuned_bin,
            mode: config.mode.clone(),
            low_hz,
            high_hz,
            output: config.output,
            agc: Agc::new(config.agc),
            filter,
            notch_mask,
            noise_gate: NoiseGate::new(MAX_BINS)?,
            anr: Anr::default(),
            demodulator: Demodulator::for_mode(&config.mode),
            ifft: ctx.inverse_fft(),
            fft_freq: alloc_zeroed(MAX_BINS)?,
            fft_scratch: alloc_zeroed(ctx.scratch_len())?,
            audio: alloc_zeroed(BLOCK_SIZE)?,
            hops: 0,
            pcm_tx,
            frames,
            next_frame: 0,
            frames_skipped: 0,
        })
    }

    pub fn handle(&self) -> RxHandle {
        self.handle
    }

    pub fn tuned_bin(&self) -> usize {
        self.tuned_bin
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn passband(&self) -> (i32, i32) {
        (self.low_hz, self.high_hz)
    }

    pub fn output(&self) -> RxOutput {
        self.output
    }

    pub fn agc(&self) -> &Agc {
        &self.agc
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Most recent block of demodulated audio.
    pub fn audio(&self) -> &[f32] {
        &self.audio
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PcmFrame> {
        self.pcm_tx.subscribe()
    }

    pub(crate) fn pcm_sender(&self) -> broadcast::Sender<PcmFrame> {
        self.pcm_tx.clone()
    }

    /// Network frames dropped because every pooled frame was still held.
    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped
    }

    pub fn status(&self) -> ReceiverStatus {
        ReceiverStatus {
            id: self.handle.0,
            freq_hz: self.freq_hz,
            tuned_bin: self.tuned_bin,
            mode: self.mode.clone(),
            low_hz: self.low_hz,
            high_hz: self.high_hz,
            agc: self.agc.agc_speed,
            output: self.output,
        }
    }

    pub(crate) fn retune(&mut self, freq_hz: f64, tuned_bin: usize) {
        self.freq_hz = freq_hz;
        self.tuned_bin = tuned_bin;
        self.noise_gate.reset();
    }

    /// Swap in a new channel filter and hand back the old one.
    pub(crate) fn set_filter(
        &mut self,
        filter: Box<Filter>,
        low_hz: i32,
        high_hz: i32,
    ) -> Box<Filter> {
        self.low_hz = low_hz;
        self.high_hz = high_hz;
        self.noise_gate.reset();
        std::mem::replace(&mut self.filter, filter)
    }

    /// Switch demodulator. The previous mode and filter are handed back.
    pub(crate) fn set_mode(
        &mut self,
        mode: Mode,
        filter: Box<Filter>,
        low_hz: i32,
        high_hz: i32,
    ) -> (Mode, Box<Filter>) {
        self.demodulator = Demodulator::for_mode(&mode);
        let old_mode = std::mem::replace(&mut self.mode, mode);
        let old_filter = self.set_filter(filter, low_hz, high_hz);
        self.anr.reset();
        (old_mode, old_filter)
    }

    pub(crate) fn set_agc(&mut self, speed: AgcSpeed) {
        self.agc.set_speed(speed);
    }

    pub(crate) fn set_output(&mut self, output: RxOutput) {
        self.output = output;
    }

    pub(crate) fn reset(&mut self) {
        self.agc.reset();
        self.anr.reset();
        self.noise_gate.reset();
        self.hops = 0;
    }

    /// Rebuild the notch mask for the current mode. The notch follows the
    /// audio, so it sits below the carrier for lower-sideband modes and on
    /// both sides for symmetric ones.
    pub(crate) fn update_notch(&mut self, settings: &DspSettings) {
        let centre = if self.mode.is_lower_sideband() {
            -settings.notch_freq
        } else {
            settings.notch_freq
        };
        build_notch_mask(
            &mut self.notch_mask,
            centre,
            settings.notch_bandwidth,
            self.mode.is_double_sideband(),
        );
    }

    /// Produce one block of audio from the shared forward transform.
    pub fn process(
        &mut self,
        table: &PhaseTable,
        bins: &[Complex<f32>],
        settings: &DspSettings,
    ) -> &[f32] {
        let n = MAX_BINS;
        let shift = self.tuned_bin % n;

        // bring the carrier to bin 0
        self.fft_freq[..n - shift].copy_from_slice(&bins[shift..n]);
        self.fft_freq[n - shift..].copy_from_slice(&bins[..shift]);

        if settings.notch_enabled {
            for (x, &m) in self.fft_freq.iter_mut().zip(self.notch_mask.iter()) {
                *x *= m;
            }
        }
        self.filter.apply_mask(&mut self.fft_freq);
        if settings.dsp_enabled {
            self.noise_gate.process(
                &mut self.fft_freq,
                self.filter.fir_coeff(),
                scale_noise_threshold(settings.noise_threshold),
                settings.noise_update_interval,
            );
        }

        self.ifft
            .process_with_scratch(&mut self.fft_freq, &mut self.fft_scratch);

        // Each hop advances the window by half its length, so bin k picks up
        // a phase step of k * pi per hop. Undo it for odd bins.
        let flip = shift % 2 == 1 && self.hops % 2 == 1;
        let scale = if flip { -1.0 } else { 1.0 } / n as f32;
        let baseband = &mut self.fft_freq[n - BLOCK_SIZE..];
        for z in baseband.iter_mut() {
            *z *= scale;
        }
        self.hops = self.hops.wrapping_add(1);

        self.demodulator.demodulate(table, baseband, &mut self.audio);
        self.agc.process_block(&mut self.audio);
        if settings.anr_enabled {
            self.anr.process_block(&mut self.audio);
        }
        apply_fixed_compression(&mut self.audio, settings.compression_control_level);

        &self.audio
    }

    /// Hand the last block to network subscribers, if any.
    ///
    /// Frames come from the preallocated pool; one still held by the
    /// channel or a subscriber is passed over, and the block is skipped
    /// when none is free.
    pub(crate) fn publish(&mut self) {
        if self.pcm_tx.receiver_count() == 0 {
            return;
        }
        let pool = self.frames.len();
        for _ in 0..pool {
            let slot = self.next_frame;
            self.next_frame = (slot + 1) % pool;
            if let Some(frame) = Arc::get_mut(&mut self.frames[slot]) {
                frame.copy_from_slice(&self.audio);
                let _ = self.pcm_tx.send(Arc::clone(&self.frames[slot]));
                return;
            }
        }
        self.frames_skipped += 1;
    }
}

impl std::fmt::Debug for Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver")
            .field("handle", &self.handle)
            .field("tuned_bin", &self.tuned_bin)
            .field("mode", &self.mode)
            .field("passband", &(self.low_hz, self.high_hz))
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::spectrum::SpectrumEngine;
    use std::f32::consts::TAU;

    fn tone_block(freq_hz: f64, amplitude: f32, block: usize) -> Vec<f32> {
        (0..BLOCK_SIZE)
            .map(|i| {
                let n = (block * BLOCK_SIZE + i) as f64;
                let phase = std::f64::consts::TAU * freq_hz * n / f64::from(SAMPLE_RATE);
                amplitude * phase.cos() as f32
            })
            .collect()
    }

    #[test]
    fn bin_for_freq_limits() {
        assert_eq!(bin_for_freq(0.0).unwrap(), 0);
        assert_eq!(bin_for_freq(1000.0).unwrap(), 43);
        assert!(matches!(
            bin_for_freq(24_000.0),
            Err(DspError::InvalidTuning(_))
        ));
        assert!(bin_for_freq(-1.0).is_err());
        assert!(bin_for_freq(23_999.0).is_err());
        assert!(bin_for_freq(f64::NAN).is_err());
    }

    #[test]
    fn default_passbands_follow_sideband() {
        assert_eq!(default_passband(&Mode::USB, 700), (300, 3000));
        assert_eq!(default_passband(&Mode::LSB, 700), (-3000, -300));
        assert_eq!(default_passband(&Mode::CW, 700), (450, 950));
        assert_eq!(default_passband(&Mode::CWR, 700), (-950, -450));
        let cfg = RxConfig {
            mode: Mode::AM,
            high_hz: Some(3000),
            ..RxConfig::default()
        };
        assert_eq!(cfg.passband(), (-4500, 3000));
    }

    #[test]
    fn new_rejects_bad_tuning() {
        let ctx = DspContext::new();
        let cfg = RxConfig {
            freq_hz: 30_000.0,
            ..RxConfig::default()
        };
        assert!(Receiver::new(&ctx, RxHandle(1), &cfg).is_err());
        let cfg = RxConfig {
            low_hz: Some(3000),
            high_hz: Some(300),
            ..RxConfig::default()
        };
        assert!(matches!(
            Receiver::new(&ctx, RxHandle(1), &cfg),
            Err(DspError::InvalidPassband { .. })
        ));
    }

    fn run_receiver(cfg: &RxConfig, input_hz: f64, blocks: usize) -> (Receiver, Vec<f32>) {
        let ctx = DspContext::new();
        let mut spectrum = SpectrumEngine::new(&ctx);
        let mut rx = Receiver::new(&ctx, RxHandle(1), cfg).unwrap();
        let settings = DspSettings::default();
        let mut audio = Vec::new();
        for block in 0..blocks {
            spectrum.process(&tone_block(input_hz, 0.25, block));
            audio.extend_from_slice(rx.process(ctx.phase_table(), spectrum.fft_bins(), &settings));
        }
        (rx, audio)
    }

    #[test]
    fn usb_output_is_continuous_across_hops() {
        // odd tuned bin exercises the parity correction
        let cfg = RxConfig {
            freq_hz: 1000.0,
            agc: AgcSpeed::Off,
            ..RxConfig::default()
        };
        let (rx, audio) = run_receiver(&cfg, 1500.0, 12);
        assert_eq!(rx.tuned_bin() % 2, 1);
        let tail = &audio[4 * BLOCK_SIZE..];
        let peak = tail.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!((peak - 0.25).abs() < 0.02, "peak {peak}");
        // a phase jump between blocks shows up as a large sample step
        let max_step = tail
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .fold(0.0_f32, f32::max);
        let expected_step = TAU * 492.2 / SAMPLE_RATE as f32 * 0.25;
        assert!(max_step < 1.5 * expected_step, "step {max_step}");
    }

    #[test]
    fn unsupported_mode_is_silent() {
        let cfg = RxConfig {
            mode: Mode::Other("SSTV".into()),
            ..RxConfig::default()
        };
        let (_, audio) = run_receiver(&cfg, 12_500.0, 4);
        assert!(audio.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn lsb_rejects_upper_sideband() {
        let cfg = RxConfig {
            freq_hz: 12_000.0,
            mode: Mode::LSB,
            agc: AgcSpeed::Off,
            ..RxConfig::default()
        };
        let (_, upper) = run_receiver(&cfg, 13_500.0, 8);
        let (_, lower) = run_receiver(&cfg, 10_500.0, 8);
        let peak = |a: &[f32]| a[4 * BLOCK_SIZE..].iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!(peak(&lower) > 0.2);
        assert!(peak(&upper) < 0.01 * peak(&lower));
    }

    #[test]
    fn network_frames_come_from_the_pool() {
        let cfg = RxConfig {
            freq_hz: 12_000.0,
            output: RxOutput::Network,
            ..RxConfig::default()
        };
        let (mut rx, _) = run_receiver(&cfg, 13_000.0, 2);
        let mut frames = rx.subscribe();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..3 * PCM_FRAME_POOL {
            rx.publish();
            let frame = frames.try_recv().unwrap();
            assert_eq!(&frame[..], rx.audio());
            seen.insert(Arc::as_ptr(&frame) as *const f32 as usize);
        }
        assert!(seen.len() <= PCM_FRAME_POOL, "{} distinct frames", seen.len());
        assert_eq!(rx.frames_skipped(), 0);
    }

    #[test]
    fn held_frames_are_not_overwritten() {
        let (mut rx, _) = run_receiver(&RxConfig::default(), 13_000.0, 1);
        let mut frames = rx.subscribe();
        let mut held = Vec::new();
        for _ in 0..PCM_FRAME_POOL {
            rx.publish();
            held.push(frames.try_recv().unwrap());
        }
        rx.publish();
        assert_eq!(rx.frames_skipped(), 1);
        assert!(frames.try_recv().is_err());

        held.clear();
        rx.publish();
        assert!(frames.try_recv().is_ok());
        assert_eq!(rx.frames_skipped(), 1);
    }

    #[test]
    fn replaced_filter_is_handed_back() {
        let ctx = DspContext::new();
        let mut rx = Receiver::new(&ctx, RxHandle(1), &RxConfig::default()).unwrap();
        let old = rx.set_filter(design_filter(200, 2500).unwrap(), 200, 2500);
        assert_eq!(old.n(), rx.filter().n());
        assert_eq!(rx.passband(), (200, 2500));

        let (mode, _) = rx.set_mode(Mode::LSB, design_filter(-3000, -300).unwrap(), -3000, -300);
        assert_eq!(mode, Mode::USB);
        assert_eq!(rx.mode(), &Mode::LSB);
    }

    #[test]
    fn notch_removes_tone() {
        let ctx = DspContext::new();
        let cfg = RxConfig {
            freq_hz: 12_000.0,
            agc: AgcSpeed::Off,
            ..RxConfig::default()
        };
        let mut rx = Receiver::new(&ctx, RxHandle(1), &cfg).unwrap();
        // bin-centred tone so the notch removes it completely
        let settings = DspSettings {
            notch_enabled: true,
            notch_freq: 43.0 * BIN_HZ,
            notch_bandwidth: 200.0,
            ..DspSettings::default()
        };
        rx.update_notch(&settings);
        let mut spectrum = SpectrumEngine::new(&ctx);
        let mut peak = 0.0_f32;
        for block in 0..8 {
            spectrum.process(&tone_block(f64::from(555.0 * BIN_HZ), 0.25, block));
            let audio = rx.process(ctx.phase_table(), spectrum.fft_bins(), &settings);
            if block >= 4 {
                peak = audio.iter().fold(peak, |m, s| m.max(s.abs()));
            }
        }
        assert!(peak < 0.01, "notched tone at {peak}");
    }
}
