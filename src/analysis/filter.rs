// Biquad filters and filter chains
//
// Each stage is a two-pole IIR section with RBJ "Audio EQ Cookbook"
// coefficients, run in Direct Form II against a two-tap delay line:
//
//   w[n] = x[n] - a1*w[n-1] - a2*w[n-2]
//   y[n] = b0*w[n] + b1*w[n-1] + b2*w[n-2]
//
// State lives inside each filter instance, so independent streams never
// share history. Processing never allocates.

use std::f32::consts::PI;

use crate::config::{BandConfig, DetectorConfig};

/// Butterworth Q for single-stage high/low-pass sections
pub const BUTTERWORTH_Q: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Response shape of one biquad stage
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterKind {
    Highpass,
    Lowpass,
    /// Constant 0 dB peak gain band-pass
    Bandpass,
    Notch,
    Peaking { gain_db: f32 },
    HighShelf { gain_db: f32 },
}

/// Normalised biquad coefficients (a0 == 1)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl Coefficients {
    /// Compute cookbook coefficients.
    ///
    /// `freq_hz` is clamped below Nyquist and `q` to a small positive minimum
    /// so degenerate parameters still yield a stable filter.
    pub fn new(kind: FilterKind, sample_rate: f32, freq_hz: f32, q: f32) -> Self {
        let nyquist = sample_rate * 0.5;
        let freq = freq_hz.clamp(1.0, nyquist * 0.99);
        let q = q.max(0.01);

        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        let (b0, b1, b2, a0, a1, a2) = match kind {
            FilterKind::Highpass => (
                (1.0 + cos_w0) / 2.0,
                -(1.0 + cos_w0),
                (1.0 + cos_w0) / 2.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            FilterKind::Lowpass => (
                (1.0 - cos_w0) / 2.0,
                1.0 - cos_w0,
                (1.0 - cos_w0) / 2.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            FilterKind::Bandpass => (
                alpha,
                0.0,
                -alpha,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            FilterKind::Notch => (
                1.0,
                -2.0 * cos_w0,
                1.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            FilterKind::Peaking { gain_db } => {
                let a = 10f32.powf(gain_db / 40.0);
                (
                    1.0 + alpha * a,
                    -2.0 * cos_w0,
                    1.0 - alpha * a,
                    1.0 + alpha / a,
                    -2.0 * cos_w0,
                    1.0 - alpha / a,
                )
            }
            FilterKind::HighShelf { gain_db } => {
                let a = 10f32.powf(gain_db / 40.0);
                let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                    -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                    (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                    2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
                    (a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
                )
            }
        };

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }
}

/// One biquad stage with its own delay line
#[derive(Debug, Clone)]
pub struct Biquad {
    kind: FilterKind,
    coefficients: Coefficients,
    w1: f32,
    w2: f32,
}

impl Biquad {
    pub fn new(kind: FilterKind, sample_rate: f32, freq_hz: f32, q: f32) -> Self {
        Self {
            kind,
            coefficients: Coefficients::new(kind, sample_rate, freq_hz, q),
            w1: 0.0,
            w2: 0.0,
        }
    }

    pub fn highpass(sample_rate: f32, cutoff_hz: f32, q: f32) -> Self {
        Self::new(FilterKind::Highpass, sample_rate, cutoff_hz, q)
    }

    pub fn lowpass(sample_rate: f32, cutoff_hz: f32, q: f32) -> Self {
        Self::new(FilterKind::Lowpass, sample_rate, cutoff_hz, q)
    }

    pub fn bandpass(sample_rate: f32, center_hz: f32, q: f32) -> Self {
        Self::new(FilterKind::Bandpass, sample_rate, center_hz, q)
    }

    pub fn notch(sample_rate: f32, center_hz: f32, q: f32) -> Self {
        Self::new(FilterKind::Notch, sample_rate, center_hz, q)
    }

    pub fn peaking(sample_rate: f32, center_hz: f32, q: f32, gain_db: f32) -> Self {
        Self::new(FilterKind::Peaking { gain_db }, sample_rate, center_hz, q)
    }

    pub fn high_shelf(sample_rate: f32, corner_hz: f32, q: f32, gain_db: f32) -> Self {
        Self::new(FilterKind::HighShelf { gain_db }, sample_rate, corner_hz, q)
    }

    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    pub fn coefficients(&self) -> Coefficients {
        self.coefficients
    }

    /// One Direct Form II step
    #[inline]
    pub fn process(&mut self, sample: f32) -> f32 {
        let c = &self.coefficients;
        let w = sample - c.a1 * self.w1 - c.a2 * self.w2;
        let out = c.b0 * w + c.b1 * self.w1 + c.b2 * self.w2;
        self.w2 = self.w1;
        self.w1 = w;
        out
    }

    /// Zero the delay line
    pub fn reset(&mut self) {
        self.w1 = 0.0;
        self.w2 = 0.0;
    }
}

/// Biquad stages applied in series
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    stages: Vec<Biquad>,
}

impl FilterChain {
    pub fn new(stages: Vec<Biquad>) -> Self {
        Self { stages }
    }

    /// Append a stage (builder style)
    pub fn with(mut self, stage: Biquad) -> Self {
        self.stages.push(stage);
        self
    }

    /// Click band: high-pass pre-stage followed by a band-pass over `band`
    pub fn click_band(sample_rate: f32, highpass_hz: f32, band: BandConfig) -> Self {
        Self::default()
            .with(Biquad::highpass(sample_rate, highpass_hz, BUTTERWORTH_Q))
            .with(Biquad::bandpass(sample_rate, band.center_hz(), band.q()))
    }

    /// Thump band: two cascaded band-pass stages for a steeper roll-off
    pub fn thump_band(sample_rate: f32, band: BandConfig) -> Self {
        Self::default()
            .with(Biquad::bandpass(sample_rate, band.center_hz(), band.q()))
            .with(Biquad::bandpass(sample_rate, band.center_hz(), band.q()))
    }

    /// Build the (high, low) band chains described by a config
    pub fn bands_for(config: &DetectorConfig) -> (Self, Self) {
        let sample_rate = config.sample_rate as f32;
        (
            Self::click_band(sample_rate, config.highpass_hz, config.high_band),
            Self::thump_band(sample_rate, config.low_band),
        )
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    #[inline]
    pub fn process(&mut self, sample: f32) -> f32 {
        self.stages
            .iter_mut()
            .fold(sample, |acc, stage| stage.process(acc))
    }

    /// Filter `input` into `output` (lengths must match; extra output is left untouched)
    pub fn process_into(&mut self, input: &[f32], output: &mut [f32]) {
        for (out, &sample) in output.iter_mut().zip(input.iter()) {
            *out = self.process(sample);
        }
    }

    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 44_100.0;

    /// Steady-state RMS gain of `chain` for a sine at `freq_hz`
    fn sine_gain(chain: &mut FilterChain, freq_hz: f32) -> f32 {
        let total = 8_820;
        let settle = 4_410;
        let mut in_sq = 0.0f64;
        let mut out_sq = 0.0f64;
        for n in 0..total {
            let x = (2.0 * PI * freq_hz * n as f32 / SR).sin();
            let y = chain.process(x);
            if n >= settle {
                in_sq += (x as f64) * (x as f64);
                out_sq += (y as f64) * (y as f64);
            }
        }
        (out_sq / in_sq).sqrt() as f32
    }

    #[test]
    fn test_lowpass_passes_low_and_blocks_high() {
        let mut chain = FilterChain::new(vec![Biquad::lowpass(SR, 1_000.0, BUTTERWORTH_Q)]);
        assert!(sine_gain(&mut chain, 100.0) > 0.95);
        chain.reset();
        assert!(sine_gain(&mut chain, 10_000.0) < 0.05);
    }

    #[test]
    fn test_highpass_blocks_dc() {
        let mut filter = Biquad::highpass(SR, 300.0, BUTTERWORTH_Q);
        let mut last = 1.0;
        for _ in 0..10_000 {
            last = filter.process(1.0);
        }
        assert!(last.abs() < 1e-3, "DC should be removed, got {}", last);
    }

    #[test]
    fn test_bandpass_unity_at_center() {
        let mut chain = FilterChain::new(vec![Biquad::bandpass(SR, 5_000.0, 1.0)]);
        let gain = sine_gain(&mut chain, 5_000.0);
        assert!((gain - 1.0).abs() < 0.05, "center gain was {}", gain);
    }

    #[test]
    fn test_notch_removes_center() {
        let mut chain = FilterChain::new(vec![Biquad::notch(SR, 1_000.0, 2.0)]);
        assert!(sine_gain(&mut chain, 1_000.0) < 0.05);
    }

    #[test]
    fn test_peaking_boosts_center() {
        let mut chain = FilterChain::new(vec![Biquad::peaking(SR, 2_000.0, 1.0, 6.0)]);
        let gain = sine_gain(&mut chain, 2_000.0);
        assert!((gain - 2.0).abs() < 0.1, "expected ~+6 dB, got {}", gain);
    }

    #[test]
    fn test_high_shelf_boosts_treble_only() {
        let mut chain =
            FilterChain::new(vec![Biquad::high_shelf(SR, 3_000.0, BUTTERWORTH_Q, 12.0)]);
        assert!(sine_gain(&mut chain, 15_000.0) > 3.5);
        chain.reset();
        assert!((sine_gain(&mut chain, 100.0) - 1.0).abs() < 0.1);
    }

    #[test]
    fn test_click_band_separates_from_thump_band() {
        let config = DetectorConfig::default();
        let (mut high, mut low) = FilterChain::bands_for(&config);

        assert!(sine_gain(&mut high, 5_000.0) > 0.8);
        high.reset();
        assert!(sine_gain(&mut high, 200.0) < 0.1);

        assert!(sine_gain(&mut low, 200.0) > 0.8);
        low.reset();
        assert!(sine_gain(&mut low, 5_000.0) < 0.01);
    }

    #[test]
    fn test_reset_zeroes_state() {
        let mut filter = Biquad::bandpass(SR, 1_000.0, 1.0);
        let fresh = filter.clone();
        for n in 0..100 {
            filter.process((n as f32).sin());
        }
        filter.reset();
        let mut fresh = fresh;
        assert_eq!(filter.process(0.5), fresh.process(0.5));
    }

    #[test]
    fn test_independent_instances_do_not_interfere() {
        let mut a = FilterChain::click_band(SR, 300.0, DetectorConfig::default().high_band);
        let mut b = a.clone();
        for n in 0..500 {
            a.process((n as f32 * 0.3).sin());
        }
        let mut c = FilterChain::click_band(SR, 300.0, DetectorConfig::default().high_band);
        assert_eq!(b.process(0.25), c.process(0.25));
    }
}
