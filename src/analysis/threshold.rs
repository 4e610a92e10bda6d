// Adaptive thresholds from a rolling noise floor
//
// Each band keeps a fixed-capacity ring buffer of recent envelope values and
// derives its detection threshold as `median + k * MAD`. Median and MAD are
// used instead of mean/stddev because they are not dragged upward by the very
// impacts being detected. The valid prefix is sorted on demand, which at
// ~100 values per second is cheap.

/// Minimum number of samples before a threshold is reported
pub const MIN_SAMPLES: usize = 10;

pub const MIN_MULTIPLIER: f32 = 1.0;
pub const MAX_MULTIPLIER: f32 = 10.0;

/// Low band multiplier relative to the high band
pub const LOW_BAND_SENSITIVITY_SCALE: f32 = 0.875;

/// Map a sensitivity in [0, 1] (higher = more sensitive) to (high, low) multipliers
pub fn sensitivity_to_multipliers(sensitivity: f32) -> (f32, f32) {
    let sensitivity = if sensitivity.is_finite() {
        sensitivity.clamp(0.0, 1.0)
    } else {
        0.5
    };
    let high = MIN_MULTIPLIER + (MAX_MULTIPLIER - MIN_MULTIPLIER) * (1.0 - sensitivity);
    let low = (high * LOW_BAND_SENSITIVITY_SCALE).clamp(MIN_MULTIPLIER, MAX_MULTIPLIER);
    (high, low)
}

fn median_of_sorted(sorted: &[f32]) -> f32 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn sort_values(values: &mut [f32]) {
    values.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
}

/// Rolling median + k·MAD threshold for one band
#[derive(Debug, Clone)]
pub struct AdaptiveThreshold {
    buf: Vec<f32>,
    write: usize,
    count: usize,
    multiplier: f32,
    // Reused sort buffer so statistics never allocate after construction.
    scratch: Vec<f32>,
}

impl AdaptiveThreshold {
    pub fn new(capacity: usize, multiplier: f32) -> Self {
        let capacity = capacity.max(MIN_SAMPLES);
        Self {
            buf: vec![0.0; capacity],
            write: 0,
            count: 0,
            multiplier: multiplier.clamp(MIN_MULTIPLIER, MAX_MULTIPLIER),
            scratch: Vec::with_capacity(capacity),
        }
    }

    /// Push a value, overwriting the oldest once full. Non-finite values are dropped.
    pub fn update(&mut self, value: f32) {
        if !value.is_finite() {
            return;
        }
        self.buf[self.write] = value;
        self.write = (self.write + 1) % self.buf.len();
        if self.count < self.buf.len() {
            self.count += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn is_ready(&self) -> bool {
        self.count >= MIN_SAMPLES
    }

    pub fn multiplier(&self) -> f32 {
        self.multiplier
    }

    /// Set the MAD multiplier, clamped to [1, 10]. Returns the applied value.
    pub fn set_multiplier(&mut self, multiplier: f32) -> f32 {
        let applied = if multiplier.is_finite() {
            multiplier.clamp(MIN_MULTIPLIER, MAX_MULTIPLIER)
        } else {
            self.multiplier
        };
        if applied != multiplier {
            tracing::debug!(
                "[AdaptiveThreshold] multiplier {} clamped to {}",
                multiplier,
                applied
            );
        }
        self.multiplier = applied;
        applied
    }

    fn load_sorted(&mut self) {
        self.scratch.clear();
        // Only the first `count` slots are ever written before the buffer wraps.
        self.scratch.extend_from_slice(&self.buf[..self.count]);
        sort_values(&mut self.scratch);
    }

    /// Exact median of the window (0.0 when empty)
    pub fn median(&mut self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }
        self.load_sorted();
        median_of_sorted(&self.scratch)
    }

    /// Median absolute deviation of the window (0.0 when empty)
    pub fn mad(&mut self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }
        self.load_sorted();
        let median = median_of_sorted(&self.scratch);
        for value in self.scratch.iter_mut() {
            *value = (*value - median).abs();
        }
        sort_values(&mut self.scratch);
        median_of_sorted(&self.scratch)
    }

    /// `median + k·MAD`, or `None` until [`MIN_SAMPLES`] values have arrived
    pub fn threshold(&mut self) -> Option<f32> {
        if !self.is_ready() {
            return None;
        }
        let median = self.median();
        let mad = self.mad();
        Some(median + self.multiplier * mad)
    }

    pub fn reset(&mut self) {
        self.write = 0;
        self.count = 0;
        self.buf.iter_mut().for_each(|v| *v = 0.0);
    }
}

/// Snapshot of one band's statistics for the current frame
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BandLevels {
    pub median: f32,
    pub threshold: Option<f32>,
}

/// One [`AdaptiveThreshold`] per band
#[derive(Debug, Clone)]
pub struct MultiBandThreshold {
    pub high: AdaptiveThreshold,
    pub low: AdaptiveThreshold,
}

impl MultiBandThreshold {
    pub fn new(capacity: usize, high_multiplier: f32, low_multiplier: f32) -> Self {
        Self {
            high: AdaptiveThreshold::new(capacity, high_multiplier),
            low: AdaptiveThreshold::new(capacity, low_multiplier),
        }
    }

    pub fn update(&mut self, high: f32, low: f32) {
        self.high.update(high);
        self.low.update(low);
    }

    /// Both bands above their thresholds (false while either is warming up)
    pub fn both_above_threshold(&mut self, high: f32, low: f32) -> bool {
        match (self.high.threshold(), self.low.threshold()) {
            (Some(th), Some(tl)) => high > th && low > tl,
            _ => false,
        }
    }

    /// High band above its threshold (false while warming up)
    pub fn high_band_above_threshold(&mut self, high: f32) -> bool {
        self.high.threshold().map(|t| high > t).unwrap_or(false)
    }

    /// Map sensitivity in [0, 1] to both multipliers. Returns (high, low).
    pub fn set_sensitivity(&mut self, sensitivity: f32) -> (f32, f32) {
        let (high, low) = sensitivity_to_multipliers(sensitivity);
        (self.high.set_multiplier(high), self.low.set_multiplier(low))
    }

    pub fn set_multipliers(&mut self, high: f32, low: f32) {
        self.high.set_multiplier(high);
        self.low.set_multiplier(low);
    }

    pub fn levels(&mut self) -> (BandLevels, BandLevels) {
        (
            BandLevels {
                median: self.high.median(),
                threshold: self.high.threshold(),
            },
            BandLevels {
                median: self.low.median(),
                threshold: self.low.threshold(),
            },
        )
    }

    pub fn reset(&mut self) {
        self.high.reset();
        self.low.reset();
    }
}
