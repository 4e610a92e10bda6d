// DetectionGate - independent reasons to suppress new onsets
//
// Each reason is evaluated every frame and reported separately so the caller
// can count them. A closed gate only blocks new onsets; an open event always
// runs to completion.

use crate::audio::metronome::BeatSource;
use crate::config::DetectorConfig;

/// Which suppression conditions hold for the current frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GateReasons {
    /// Still inside the settle window after (re)start
    pub settling: bool,
    /// Fewer than `min_beat_count` metronome beats have sounded
    pub awaiting_beats: bool,
    /// Beat phase is outside the listening zone
    pub outside_zone: bool,
}

impl GateReasons {
    pub fn is_open(&self) -> bool {
        !(self.settling || self.awaiting_beats || self.outside_zone)
    }
}

/// Fractional beat phase in [0, 1) of `now_ms`
///
/// Measured from the most recent tick at or before `now_ms`. When every known
/// tick lies in the future, the previous tick is extrapolated one period
/// before the first. Returns `None` without a tempo or ticks.
pub fn beat_phase(now_ms: f64, ticks: &[f64], bpm: f64) -> Option<f64> {
    if bpm <= 0.0 || !bpm.is_finite() {
        return None;
    }
    let period = 60_000.0 / bpm;
    let last_tick = ticks
        .iter()
        .copied()
        .filter(|&t| t <= now_ms)
        .fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |a| a.max(t))))
        .or_else(|| {
            ticks
                .iter()
                .copied()
                .fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |a| a.min(t))))
                .map(|first| first - period)
        })?;
    Some((now_ms - last_tick).rem_euclid(period) / period)
}

/// Whether `phase` lies in `[start, start + width]`, wrapping past 1.0
pub fn phase_in_zone(phase: f64, start: f64, width: f64) -> bool {
    let end = start + width;
    if end <= 1.0 {
        phase >= start && phase <= end
    } else {
        phase >= start || phase <= end - 1.0
    }
}

#[derive(Debug, Default)]
pub struct DetectionGate {
    warned_missing_metronome: bool,
}

impl DetectionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate every reason at `now_ms` on the stream clock
    ///
    /// `reset_at_ms` is the stream time of the last reset; the settle window
    /// runs from there.
    pub fn evaluate(
        &mut self,
        now_ms: f64,
        reset_at_ms: f64,
        config: &DetectorConfig,
        beats: Option<&dyn BeatSource>,
    ) -> GateReasons {
        let mut reasons = GateReasons {
            settling: now_ms - reset_at_ms < config.baseline_settle_ms as f64,
            ..GateReasons::default()
        };

        let needs_metronome = config.min_beat_count > 0 || config.use_listening_zone;
        let Some(beats) = beats else {
            if needs_metronome && !self.warned_missing_metronome {
                tracing::warn!(
                    "[DetectionGate] Beat gating configured without a metronome; ignoring"
                );
                self.warned_missing_metronome = true;
            }
            return reasons;
        };

        if config.min_beat_count > 0 {
            reasons.awaiting_beats = beats.beat_count(now_ms) < config.min_beat_count;
        }

        if config.use_listening_zone {
            let ticks = beats.upcoming_ticks(now_ms);
            if let Some(phase) = beat_phase(now_ms, &ticks, beats.bpm()) {
                reasons.outside_zone =
                    !phase_in_zone(phase, config.zone_start as f64, config.zone_width as f64);
            }
        }

        reasons
    }

    pub fn reset(&mut self) {
        self.warned_missing_metronome = false;
    }
}
