//! Metronome collaborator
//!
//! The detector never drives the metronome; it polls a [`BeatSource`] for the
//! tick grid so it can gate detection on beat phase and reject events that
//! coincide with the metronome's own click. Times are milliseconds on the
//! detector's stream clock (0 at construction, never rewound by a reset).
//!
//! [`GridMetronome`] is a deterministic implementation computing ticks from a
//! BPM and an origin.

use std::sync::atomic::{AtomicU32, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Duration of metronome click in milliseconds
const CLICK_DURATION_MS: f32 = 20.0;

/// Ticks returned after the most recent one
const DEFAULT_LOOKAHEAD: usize = 4;

/// Read-only view of a running metronome
pub trait BeatSource: Send + Sync {
    /// The most recent tick at or before `now_ms` (when one exists) followed by
    /// the next upcoming ticks, in ascending order.
    fn upcoming_ticks(&self, now_ms: f64) -> Vec<f64>;

    /// Current tempo; 0 when stopped.
    fn bpm(&self) -> f64;

    /// Number of ticks that have sounded at or before `now_ms`.
    fn beat_count(&self, now_ms: f64) -> u64;
}

/// Metronome with evenly spaced ticks starting at `origin_ms`
#[derive(Debug)]
pub struct GridMetronome {
    bpm: AtomicU32,
    origin_ms: f64,
    lookahead: usize,
}

impl GridMetronome {
    pub fn new(bpm: u32, origin_ms: f64) -> Self {
        Self {
            bpm: AtomicU32::new(bpm),
            origin_ms,
            lookahead: DEFAULT_LOOKAHEAD,
        }
    }

    pub fn with_lookahead(mut self, lookahead: usize) -> Self {
        self.lookahead = lookahead.max(1);
        self
    }

    /// Change tempo; takes effect on the next poll
    pub fn set_bpm(&self, bpm: u32) {
        self.bpm.store(bpm, Ordering::Relaxed);
    }

    pub fn origin_ms(&self) -> f64 {
        self.origin_ms
    }

    fn period_ms(&self) -> Option<f64> {
        let bpm = self.bpm.load(Ordering::Relaxed);
        (bpm > 0).then(|| 60_000.0 / bpm as f64)
    }
}

impl BeatSource for GridMetronome {
    fn upcoming_ticks(&self, now_ms: f64) -> Vec<f64> {
        let Some(period) = self.period_ms() else {
            return Vec::new();
        };
        let first_index = if now_ms < self.origin_ms {
            0
        } else {
            ((now_ms - self.origin_ms) / period).floor() as u64
        };
        let count = if now_ms < self.origin_ms {
            self.lookahead
        } else {
            self.lookahead + 1
        };
        (0..count as u64)
            .map(|k| self.origin_ms + (first_index + k) as f64 * period)
            .collect()
    }

    fn bpm(&self) -> f64 {
        self.bpm.load(Ordering::Relaxed) as f64
    }

    fn beat_count(&self, now_ms: f64) -> u64 {
        match self.period_ms() {
            Some(period) if now_ms >= self.origin_ms => {
                ((now_ms - self.origin_ms) / period).floor() as u64 + 1
            }
            _ => 0,
        }
    }
}

/// Generates a metronome click sample (20ms white noise burst).
///
/// The noise uses a fixed seed so output is identical across calls. Mix it
/// into test audio to reproduce metronome bleed into the microphone.
pub fn generate_click_sample(sample_rate: u32) -> Vec<f32> {
    let num_samples = (sample_rate as f32 * CLICK_DURATION_MS / 1000.0) as usize;
    let mut rng = StdRng::seed_from_u64(42);
    (0..num_samples).map(|_| rng.gen_range(-1.0..1.0)).collect()
}
