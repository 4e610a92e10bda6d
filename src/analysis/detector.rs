// StrikeDetector - frame-synchronous impact detection state machine
//
// Per frame:
// 1. Filter into the click (high) and thump (low) bands, take the RMS and
//    smooth it into each band's envelope.
// 2. While idle, feed the baseline with the envelope clamped to the previous
//    threshold so a strike cannot raise its own noise floor.
// 3. Evaluate the gate; a closed gate blocks new onsets only.
// 4. Idle + gate open: spectral candidate check (when profiles exist), then
//    the energy onset test (above threshold and rising by the onset slope).
// 5. Event open: track peaks; close on release, decay or max duration and
//    evaluate the closed event. The low band corroborates once its envelope
//    clears both its threshold and `low_band_min_rise` times its median.
//
// The stream clock counts every accepted sample since construction and is
// measured at the start of each frame. `reset()` never rewinds it, so strike
// timestamps keep increasing and stay aligned with an external metronome; the
// settle window is measured from the last reset instead.

use std::collections::VecDeque;
use std::sync::Arc;

use super::filter::FilterChain;
use super::gate::{DetectionGate, GateReasons};
use super::spectral::{ProfileKind, ProfileMatch, SpectralProfileMatcher};
use super::threshold::MultiBandThreshold;
use super::{
    BandPair, DetectorStats, GateCounts, RejectionCounts, StrikeEvent, StrikeListener,
};
use crate::audio::frame::{i16_into_f32, rms, FrameChunker};
use crate::audio::metronome::BeatSource;
use crate::config::{ConfigPatch, ConfigWarning, DetectorConfig, IgnorePolicy, QualityWeights};
use crate::profiles::ProfileStore;

/// How a closed event is treated
#[derive(Debug, Clone, PartialEq)]
enum Disposition {
    /// Energy-only rules decide
    Energy,
    /// A target profile matched; skips the low-band and duration checks
    ForceAccept(ProfileMatch),
    /// An ignore profile matched; never emitted
    Discard(ProfileMatch),
}

#[derive(Debug, Clone)]
struct OpenEvent {
    start_ms: f64,
    peak_high: f32,
    peak_low: f32,
    low_crossed: bool,
    disposition: Disposition,
}

#[derive(Debug, Clone)]
enum EventState {
    Idle,
    Open(OpenEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    IgnoredProfile,
    Debounced,
    TooLong,
    NoLowBand,
    NearTick,
}

/// Quality score of an accepted event, clamped to [0, 1]
pub fn strike_quality(
    weights: &QualityWeights,
    duration_ms: f32,
    max_duration_ms: f32,
    peak_high: f32,
    peak_low: f32,
) -> f32 {
    let duration_term = 1.0 - duration_ms / max_duration_ms.max(f32::EPSILON);
    let ratio = if peak_low > f32::EPSILON {
        peak_high / peak_low
    } else {
        weights.ratio_scale
    };
    let ratio_term = (ratio / weights.ratio_scale).min(1.0);
    (weights.duration_weight * duration_term + weights.ratio_weight * ratio_term).clamp(0.0, 1.0)
}

fn lookback_frames(config: &DetectorConfig) -> usize {
    let frames = (config.onset_time_ms as f64 / config.frame_ms()).round() as usize;
    frames.max(1)
}

/// Real-time putter strike detector
///
/// Owns all filter, threshold and event state. Independent instances never
/// share state.
pub struct StrikeDetector {
    config: DetectorConfig,
    high_chain: FilterChain,
    low_chain: FilterChain,
    filtered: Vec<f32>,
    thresholds: MultiBandThreshold,
    gate: DetectionGate,
    matcher: SpectralProfileMatcher,
    beat_source: Option<Arc<dyn BeatSource>>,
    profile_store: Option<Arc<dyn ProfileStore>>,
    listeners: Vec<Box<dyn StrikeListener>>,
    chunker: FrameChunker,
    pcm_scratch: Vec<f32>,

    envelope: BandPair<f32>,
    // Most recent high envelopes, oldest first, for the onset slope test.
    recent_high: VecDeque<f32>,
    lookback: usize,
    last_thresholds: BandPair<Option<f32>>,
    state: EventState,
    last_strike_ms: Option<f64>,
    // Frames since the last reset
    frame_index: u64,
    // Stream clock: ms at the last rate change plus samples since then
    clock_base_ms: f64,
    clock_samples: u64,
    reset_at_ms: f64,

    skipped_frames: u64,
    strike_count: u64,
    rejections: RejectionCounts,
    gate_blocked: GateCounts,
    config_warnings: u64,
}

impl StrikeDetector {
    /// Build a detector; out-of-range values are clamped and logged
    pub fn new(mut config: DetectorConfig) -> Self {
        let warnings = config.sanitize();
        let (high_chain, low_chain) = FilterChain::bands_for(&config);
        let lookback = lookback_frames(&config);

        tracing::info!(
            "[StrikeDetector] Created: {} Hz, {} samples/frame, high band {}-{} Hz, low band {}-{} Hz",
            config.sample_rate,
            config.frame_length,
            config.high_band.low_hz,
            config.high_band.high_hz,
            config.low_band.low_hz,
            config.low_band.high_hz
        );

        Self {
            high_chain,
            low_chain,
            filtered: vec![0.0; config.frame_length],
            thresholds: MultiBandThreshold::new(
                config.baseline_window_size,
                config.high_multiplier,
                config.low_multiplier,
            ),
            gate: DetectionGate::new(),
            matcher: SpectralProfileMatcher::new(
                config.sample_rate,
                config.frame_length,
                config.spectral.history_frames,
            ),
            beat_source: None,
            profile_store: None,
            listeners: Vec::new(),
            chunker: FrameChunker::new(config.frame_length),
            pcm_scratch: Vec::new(),
            envelope: BandPair::default(),
            recent_high: VecDeque::with_capacity(lookback + 1),
            lookback,
            last_thresholds: BandPair::default(),
            state: EventState::Idle,
            last_strike_ms: None,
            frame_index: 0,
            clock_base_ms: 0.0,
            clock_samples: 0,
            reset_at_ms: 0.0,
            skipped_frames: 0,
            strike_count: 0,
            rejections: RejectionCounts::default(),
            gate_blocked: GateCounts::default(),
            config_warnings: warnings.len() as u64,
            config,
        }
    }

    pub fn with_beat_source(mut self, beats: Arc<dyn BeatSource>) -> Self {
        self.beat_source = Some(beats);
        self
    }

    pub fn with_profile_store(mut self, store: Arc<dyn ProfileStore>) -> Self {
        self.profile_store = Some(store);
        self
    }

    pub fn set_beat_source(&mut self, beats: Option<Arc<dyn BeatSource>>) {
        self.beat_source = beats;
    }

    pub fn set_profile_store(&mut self, store: Option<Arc<dyn ProfileStore>>) {
        self.profile_store = store;
    }

    /// Register an observer; listeners fire in registration order
    pub fn subscribe<L: StrikeListener + 'static>(&mut self, listener: L) {
        self.listeners.push(Box::new(listener));
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Current stream time in ms (start of the next frame)
    pub fn now_ms(&self) -> f64 {
        self.clock_base_ms
            + self.clock_samples as f64 * 1000.0 / self.config.sample_rate.max(1) as f64
    }

    /// Feed arbitrary-length f32 input; returns strikes in arrival order
    pub fn process_samples(&mut self, samples: &[f32]) -> Vec<StrikeEvent> {
        let mut chunker = std::mem::take(&mut self.chunker);
        let mut strikes = Vec::new();
        chunker.push(samples, |frame| {
            if let Some(strike) = self.process_frame(frame) {
                strikes.push(strike);
            }
        });
        self.chunker = chunker;
        strikes
    }

    /// Feed arbitrary-length Int16 PCM
    pub fn process_pcm_i16(&mut self, samples: &[i16]) -> Vec<StrikeEvent> {
        let mut scratch = std::mem::take(&mut self.pcm_scratch);
        i16_into_f32(samples, &mut scratch);
        let strikes = self.process_samples(&scratch);
        self.pcm_scratch = scratch;
        strikes
    }

    /// Process exactly one analysis frame
    ///
    /// Frames of the wrong length or containing non-finite samples are counted
    /// and skipped without touching any state or advancing the clock.
    pub fn process_frame(&mut self, frame: &[f32]) -> Option<StrikeEvent> {
        if frame.len() != self.config.frame_length || frame.iter().any(|s| !s.is_finite()) {
            self.skipped_frames += 1;
            tracing::debug!(
                "[StrikeDetector] Skipping malformed frame ({} samples, expected {})",
                frame.len(),
                self.config.frame_length
            );
            return None;
        }

        let now_ms = self.now_ms();
        self.frame_index += 1;
        self.clock_samples += frame.len() as u64;

        // 1. Band envelopes
        let smoothing = self.config.envelope_smoothing;
        self.high_chain.process_into(frame, &mut self.filtered);
        let high_rms = rms(&self.filtered);
        self.low_chain.process_into(frame, &mut self.filtered);
        let low_rms = rms(&self.filtered);
        self.envelope.high = smoothing * self.envelope.high + (1.0 - smoothing) * high_rms;
        self.envelope.low = smoothing * self.envelope.low + (1.0 - smoothing) * low_rms;
        let env_high = self.envelope.high;
        let env_low = self.envelope.low;

        // Thresholds as of the previous frame
        let (high_levels, low_levels) = self.thresholds.levels();
        let floor = self.config.min_threshold;
        let thr_high = high_levels.threshold.map(|t| t.max(floor));
        let thr_low = low_levels.threshold.map(|t| t.max(floor));
        self.last_thresholds = BandPair {
            high: thr_high,
            low: thr_low,
        };
        // Level the low band must exceed to corroborate an event
        let low_corroboration =
            thr_low.map(|t| t.max(self.config.low_band_min_rise * low_levels.median));

        let was_idle = matches!(self.state, EventState::Idle);

        // 2. Spike-clamped baseline
        if was_idle {
            let clamp = |env: f32, thr: Option<f32>| thr.map_or(env, |t| env.min(t));
            self.thresholds
                .update(clamp(env_high, thr_high), clamp(env_low, thr_low));
        }

        let reference = self.recent_high.front().copied();
        let previous = self.recent_high.back().copied().unwrap_or(0.0);
        let rising = reference.map_or(false, |r| env_high > self.config.onset_slope * r);
        self.recent_high.push_back(env_high);
        while self.recent_high.len() > self.lookback {
            self.recent_high.pop_front();
        }

        self.matcher.push_frame(frame);

        for listener in self.listeners.iter_mut() {
            listener.on_audio_level(env_high);
        }

        // 3. Gate
        let reasons = self
            .gate
            .evaluate(now_ms, self.reset_at_ms, &self.config, self.beat_source.as_deref());

        if was_idle {
            if reasons.is_open() {
                self.try_open(
                    now_ms,
                    env_high,
                    env_low,
                    thr_high,
                    low_corroboration,
                    previous,
                    rising,
                );
            } else {
                self.count_gate(reasons);
            }
            return None;
        }

        // 5. Track the open event
        let max_duration_ms = self.config.max_duration_ms as f64;
        let release_ratio = self.config.release_ratio;
        let decay_ratio = self.config.decay_ratio;
        let median = high_levels.median;
        let closing = match &mut self.state {
            EventState::Open(event) => {
                event.peak_high = event.peak_high.max(env_high);
                event.peak_low = event.peak_low.max(env_low);
                if low_corroboration.map_or(false, |t| env_low > t) {
                    event.low_crossed = true;
                }
                let too_long = now_ms - event.start_ms > max_duration_ms;
                let released = thr_high.map_or(false, |t| env_high < release_ratio * t);
                let decayed = env_high - median < decay_ratio * (event.peak_high - median);
                (too_long || released || decayed).then_some(too_long)
            }
            EventState::Idle => None,
        };

        let too_long = closing?;
        match std::mem::replace(&mut self.state, EventState::Idle) {
            EventState::Open(event) => self.close_event(event, now_ms, too_long),
            EventState::Idle => None,
        }
    }

    fn count_gate(&mut self, reasons: GateReasons) {
        if reasons.settling {
            self.gate_blocked.settling += 1;
        }
        if reasons.awaiting_beats {
            self.gate_blocked.awaiting_beats += 1;
        }
        if reasons.outside_zone {
            self.gate_blocked.outside_zone += 1;
        }
    }

    // 4. Onset: spectral candidate first, then the energy test
    #[allow(clippy::too_many_arguments)]
    fn try_open(
        &mut self,
        now_ms: f64,
        env_high: f32,
        env_low: f32,
        thr_high: Option<f32>,
        low_corroboration: Option<f32>,
        previous: f32,
        rising: bool,
    ) {
        // No onset until the baseline is ready
        let Some(threshold) = thr_high else {
            return;
        };

        let disposition = match self.spectral_disposition(env_high, threshold, previous, rising) {
            Some(disposition) => disposition,
            None if env_high > threshold && rising => Disposition::Energy,
            None => return,
        };

        tracing::debug!(
            "[StrikeDetector] Onset at {:.1} ms (env {:.5}, threshold {:.5}, {:?})",
            now_ms,
            env_high,
            threshold,
            disposition
        );

        self.state = EventState::Open(OpenEvent {
            start_ms: now_ms,
            peak_high: env_high,
            peak_low: env_low,
            low_crossed: low_corroboration.map_or(false, |t| env_low > t),
            disposition,
        });
    }

    fn spectral_disposition(
        &mut self,
        env_high: f32,
        threshold: f32,
        previous: f32,
        rising: bool,
    ) -> Option<Disposition> {
        if !self.config.spectral.enabled {
            return None;
        }
        let store = self.profile_store.as_ref()?;

        let level = self.config.spectral.candidate_ratio * threshold;
        let crossed = env_high >= level && previous < level;
        if !(env_high >= level && (crossed || rising)) {
            return None;
        }

        let profiles = store.enabled_profiles();
        let matched = self.matcher.match_profiles(&profiles)?;
        match matched.kind {
            ProfileKind::Target => Some(Disposition::ForceAccept(matched)),
            ProfileKind::Ignore => match self.config.spectral.ignore_policy {
                IgnorePolicy::UnlessEnergyAbove { ratio } if env_high >= ratio * threshold => {
                    tracing::debug!(
                        "[StrikeDetector] Ignore profile '{}' overridden by energy ({:.5} >= {} x {:.5})",
                        matched.name,
                        env_high,
                        ratio,
                        threshold
                    );
                    None
                }
                _ => Some(Disposition::Discard(matched)),
            },
        }
    }

    fn near_tick(&self, start_ms: f64) -> bool {
        let Some(beats) = self.beat_source.as_ref() else {
            return false;
        };
        let guard = self.config.tick_guard_ms as f64;
        beats
            .upcoming_ticks(start_ms)
            .iter()
            .any(|tick| (start_ms - tick).abs() <= guard)
    }

    fn evaluate(&self, event: &OpenEvent, too_long: bool) -> Result<(), Rejection> {
        let forced = matches!(event.disposition, Disposition::ForceAccept(_));
        if matches!(event.disposition, Disposition::Discard(_)) {
            return Err(Rejection::IgnoredProfile);
        }
        if let Some(last) = self.last_strike_ms {
            if event.start_ms - last < self.config.debounce_ms as f64 {
                return Err(Rejection::Debounced);
            }
        }
        if !forced && too_long {
            return Err(Rejection::TooLong);
        }
        if !forced && self.config.require_low_band && !event.low_crossed {
            return Err(Rejection::NoLowBand);
        }
        if self.near_tick(event.start_ms) {
            return Err(Rejection::NearTick);
        }
        Ok(())
    }

    fn close_event(&mut self, event: OpenEvent, now_ms: f64, too_long: bool) -> Option<StrikeEvent> {
        let duration_ms = (now_ms - event.start_ms) as f32;

        if let Err(reason) = self.evaluate(&event, too_long) {
            let counter = match reason {
                Rejection::IgnoredProfile => &mut self.rejections.ignored_profile,
                Rejection::Debounced => &mut self.rejections.debounced,
                Rejection::TooLong => &mut self.rejections.too_long,
                Rejection::NoLowBand => &mut self.rejections.no_low_band,
                Rejection::NearTick => &mut self.rejections.near_tick,
            };
            *counter += 1;
            tracing::debug!(
                "[StrikeDetector] Event at {:.1} ms rejected: {:?} (duration {:.1} ms)",
                event.start_ms,
                reason,
                duration_ms
            );
            return None;
        }

        let quality = strike_quality(
            &self.config.quality,
            duration_ms,
            self.config.max_duration_ms,
            event.peak_high,
            event.peak_low,
        );
        let profile_match = match event.disposition {
            Disposition::ForceAccept(m) => Some(m),
            _ => None,
        };
        let strike = StrikeEvent {
            timestamp_ms: event.start_ms,
            energy: event.peak_high,
            duration_ms,
            quality,
            profile_match,
        };

        self.last_strike_ms = Some(event.start_ms);
        self.strike_count += 1;
        tracing::info!(
            "[StrikeDetector] Strike at {:.1} ms (energy {:.5}, duration {:.1} ms, quality {:.2})",
            strike.timestamp_ms,
            strike.energy,
            strike.duration_ms,
            strike.quality
        );
        for listener in self.listeners.iter_mut() {
            listener.on_strike(&strike);
        }
        Some(strike)
    }

    /// Apply a partial configuration update between frames
    ///
    /// Changes to the sample rate, frame length, baseline window or bands
    /// rebuild the filters and reset all adaptive state. A new spectral
    /// history length only rebuilds the profile matcher. The stream clock
    /// carries on across either.
    pub fn update_params(&mut self, patch: &ConfigPatch) -> Vec<ConfigWarning> {
        let mut next = self.config.clone();
        let warnings = next.apply_patch(patch);
        self.config_warnings += warnings.len() as u64;

        let rebuild = self.config.needs_rebuild(&next);
        let rebuild_matcher =
            rebuild || self.config.spectral.history_frames != next.spectral.history_frames;
        let now_ms = self.now_ms();
        self.thresholds
            .set_multipliers(next.high_multiplier, next.low_multiplier);
        self.config = next;
        self.clock_base_ms = now_ms;
        self.clock_samples = 0;
        self.lookback = lookback_frames(&self.config);
        while self.recent_high.len() > self.lookback {
            self.recent_high.pop_front();
        }

        if rebuild_matcher {
            self.matcher = SpectralProfileMatcher::new(
                self.config.sample_rate,
                self.config.frame_length,
                self.config.spectral.history_frames,
            );
        }
        if rebuild {
            tracing::info!("[StrikeDetector] Rebuilding filters for new configuration");
            let (high_chain, low_chain) = FilterChain::bands_for(&self.config);
            self.high_chain = high_chain;
            self.low_chain = low_chain;
            self.filtered = vec![0.0; self.config.frame_length];
            self.thresholds = MultiBandThreshold::new(
                self.config.baseline_window_size,
                self.config.high_multiplier,
                self.config.low_multiplier,
            );
            self.chunker = FrameChunker::new(self.config.frame_length);
            self.reset();
        }
        warnings
    }

    /// Map sensitivity in [0, 1] to both band multipliers. Returns (high, low).
    pub fn set_sensitivity(&mut self, sensitivity: f32) -> (f32, f32) {
        self.update_params(&ConfigPatch {
            sensitivity: Some(sensitivity),
            ..ConfigPatch::default()
        });
        (self.config.high_multiplier, self.config.low_multiplier)
    }

    /// Clear all adaptive state and counters and restart the settle window
    ///
    /// Configuration, listeners, collaborators and the stream clock are kept.
    pub fn reset(&mut self) {
        self.high_chain.reset();
        self.low_chain.reset();
        self.thresholds.reset();
        self.gate.reset();
        self.matcher.clear();
        self.chunker.clear();
        self.envelope = BandPair::default();
        self.recent_high.clear();
        self.last_thresholds = BandPair::default();
        self.state = EventState::Idle;
        self.last_strike_ms = None;
        self.frame_index = 0;
        self.reset_at_ms = self.now_ms();
        self.skipped_frames = 0;
        self.strike_count = 0;
        self.rejections = RejectionCounts::default();
        self.gate_blocked = GateCounts::default();
        tracing::debug!("[StrikeDetector] Reset");
    }

    pub fn stats(&self) -> DetectorStats {
        DetectorStats {
            frame_count: self.frame_index,
            skipped_frames: self.skipped_frames,
            strike_count: self.strike_count,
            envelopes: self.envelope,
            thresholds: self.last_thresholds,
            event_open: matches!(self.state, EventState::Open(_)),
            rejections: self.rejections,
            gate_blocked: self.gate_blocked,
            config_warnings: self.config_warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn noise_frames(count: usize, amplitude: f32, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count * 441)
            .map(|_| rng.gen_range(-amplitude..amplitude))
            .collect()
    }

    #[test]
    fn test_quality_formula() {
        let weights = QualityWeights::default();
        // 0.6 * (1 - 30/150) + 0.4 * min(1, 10/5)
        let q = strike_quality(&weights, 30.0, 150.0, 1.0, 0.1);
        assert!((q - 0.88).abs() < 1e-5);
        // 0.6 * 0.5 + 0.4 * (2/5)
        let q = strike_quality(&weights, 75.0, 150.0, 0.2, 0.1);
        assert!((q - 0.46).abs() < 1e-5);
        assert_eq!(strike_quality(&weights, 300.0, 150.0, 0.0, 1.0), 0.0);
        assert!((strike_quality(&weights, 0.0, 150.0, 1.0, 0.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_lookback_frames() {
        let config = DetectorConfig::default();
        assert_eq!(lookback_frames(&config), 1);
        let config = DetectorConfig {
            onset_time_ms: 30.0,
            ..DetectorConfig::default()
        };
        assert_eq!(lookback_frames(&config), 3);
        let config = DetectorConfig {
            onset_time_ms: 0.0,
            ..DetectorConfig::default()
        };
        assert_eq!(lookback_frames(&config), 1);
    }

    #[test]
    fn test_malformed_frames_are_skipped() {
        let mut detector = StrikeDetector::new(DetectorConfig::default());
        assert!(detector.process_frame(&[]).is_none());
        assert!(detector.process_frame(&[0.0; 100]).is_none());
        let mut bad = vec![0.0; 441];
        bad[10] = f32::NAN;
        assert!(detector.process_frame(&bad).is_none());

        let stats = detector.stats();
        assert_eq!(stats.skipped_frames, 3);
        assert_eq!(stats.frame_count, 0);
        assert_eq!(detector.now_ms(), 0.0);
    }

    #[test]
    fn test_thresholds_not_ready_during_warmup() {
        let mut detector = StrikeDetector::new(DetectorConfig::default());
        let audio = noise_frames(5, 0.01, 1);
        detector.process_samples(&audio);
        let stats = detector.stats();
        assert_eq!(stats.frame_count, 5);
        assert_eq!(stats.thresholds.high, None);
        assert_eq!(stats.gate_blocked.settling, 5);
    }

    #[test]
    fn test_process_samples_rechunks() {
        let mut detector = StrikeDetector::new(DetectorConfig::default());
        let audio = noise_frames(3, 0.01, 2);
        detector.process_samples(&audio[..500]);
        assert_eq!(detector.stats().frame_count, 1);
        detector.process_samples(&audio[500..]);
        assert_eq!(detector.stats().frame_count, 3);
    }

    #[test]
    fn test_pcm_i16_input() {
        let mut detector = StrikeDetector::new(DetectorConfig::default());
        detector.process_pcm_i16(&[100i16; 882]);
        assert_eq!(detector.stats().frame_count, 2);
    }

    #[test]
    fn test_update_params_without_rebuild_keeps_state() {
        let mut detector = StrikeDetector::new(DetectorConfig::default());
        detector.process_samples(&noise_frames(20, 0.01, 3));
        let warnings = detector.update_params(&ConfigPatch {
            debounce_ms: Some(300.0),
            high_multiplier: Some(50.0),
            ..ConfigPatch::default()
        });
        assert_eq!(warnings.len(), 1);
        assert_eq!(detector.config().debounce_ms, 300.0);
        assert_eq!(detector.config().high_multiplier, 10.0);
        assert_eq!(detector.stats().frame_count, 20);
        assert_eq!(detector.stats().config_warnings, 1);
    }

    #[test]
    fn test_update_params_rebuild_resets() {
        let mut detector = StrikeDetector::new(DetectorConfig::default());
        detector.process_samples(&noise_frames(20, 0.01, 4));
        detector.update_params(&ConfigPatch {
            sample_rate: Some(48_000),
            frame_length: Some(480),
            ..ConfigPatch::default()
        });
        assert_eq!(detector.stats().frame_count, 0);
        assert!(detector.process_frame(&[0.0; 441]).is_none());
        assert_eq!(detector.stats().skipped_frames, 1);
        detector.process_frame(&[0.0; 480]);
        assert_eq!(detector.stats().frame_count, 1);
    }

    #[test]
    fn test_set_sensitivity() {
        let mut detector = StrikeDetector::new(DetectorConfig::default());
        let (high, low) = detector.set_sensitivity(1.0);
        assert_eq!((high, low), (1.0, 1.0));
        let (high, _) = detector.set_sensitivity(0.0);
        assert_eq!(high, 10.0);
    }

    #[test]
    fn test_reset_keeps_stream_clock() {
        let mut detector = StrikeDetector::new(DetectorConfig::default());
        detector.process_samples(&noise_frames(30, 0.01, 5));
        assert!(detector.stats().thresholds.high.is_some());
        detector.reset();
        let stats = detector.stats();
        assert_eq!(stats.frame_count, 0);
        assert_eq!(stats.thresholds.high, None);
        assert!(!stats.event_open);
        assert!((detector.now_ms() - 300.0).abs() < 1e-9);

        // Settle window restarts from the reset instant
        detector.process_samples(&noise_frames(5, 0.01, 6));
        assert_eq!(detector.stats().gate_blocked.settling, 5);
    }

    #[test]
    fn test_rate_change_continues_clock() {
        let mut detector = StrikeDetector::new(DetectorConfig::default());
        detector.process_samples(&noise_frames(20, 0.01, 7));
        detector.update_params(&ConfigPatch {
            sample_rate: Some(48_000),
            frame_length: Some(480),
            ..ConfigPatch::default()
        });
        assert!((detector.now_ms() - 200.0).abs() < 1e-9);
        detector.process_frame(&[0.0; 480]);
        assert!((detector.now_ms() - 210.0).abs() < 1e-9);
    }

    #[test]
    fn test_history_change_keeps_baseline() {
        let mut detector = StrikeDetector::new(DetectorConfig::default());
        detector.process_samples(&noise_frames(20, 0.01, 8));
        let mut spectral = detector.config().spectral;
        spectral.history_frames += 2;
        let history = spectral.history_frames;
        detector.update_params(&ConfigPatch {
            spectral: Some(spectral),
            ..ConfigPatch::default()
        });

        assert_eq!(detector.matcher.history_frames(), history);
        let stats = detector.stats();
        assert_eq!(stats.frame_count, 20);
        assert!(stats.thresholds.high.is_some());
    }
}
