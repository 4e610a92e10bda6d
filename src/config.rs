//! Configuration management for the strike detector
//!
//! Every knob is optional in JSON and falls back to a tuned default. Values
//! that land outside their usable range are clamped rather than rejected:
//! they are sensitivity controls, not correctness-critical inputs. Each clamp
//! is reported as a [`ConfigWarning`] so callers can surface it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::analysis::threshold::{sensitivity_to_multipliers, MAX_MULTIPLIER, MIN_MULTIPLIER};

/// Lowest sample rate accepted before falling back to the default
pub const MIN_SAMPLE_RATE: u32 = 8_000;
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// Frequency band isolated by one filter chain
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandConfig {
    /// Lower band edge in Hz
    pub low_hz: f32,
    /// Upper band edge in Hz
    pub high_hz: f32,
}

impl BandConfig {
    /// Geometric centre of the band
    pub fn center_hz(&self) -> f32 {
        (self.low_hz * self.high_hz).sqrt()
    }

    /// Q giving the band's -3 dB width around its centre
    pub fn q(&self) -> f32 {
        self.center_hz() / (self.high_hz - self.low_hz).max(1.0)
    }
}

/// Weights of the quality score
///
/// `quality = duration_weight * (1 - duration / max_duration)
///          + ratio_weight * min(1, (peak_high / peak_low) / ratio_scale)`
///
/// The defaults are empirical and should be recalibrated against real
/// recordings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
    pub duration_weight: f32,
    pub ratio_weight: f32,
    pub ratio_scale: f32,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            duration_weight: 0.6,
            ratio_weight: 0.4,
            ratio_scale: 5.0,
        }
    }
}

/// What an `ignore` profile match does to an energy-qualified candidate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum IgnorePolicy {
    /// An ignore match always discards the candidate.
    Always,
    /// An ignore match is disregarded once the candidate's high-band peak
    /// reaches `ratio` times the detection threshold.
    UnlessEnergyAbove { ratio: f32 },
}

impl Default for IgnorePolicy {
    fn default() -> Self {
        IgnorePolicy::Always
    }
}

/// Spectral profile matching parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralConfig {
    /// Run the matcher when profiles are available
    pub enabled: bool,
    /// Fraction of the high-band threshold at which a frame becomes a candidate
    pub candidate_ratio: f32,
    /// Number of recent frames fingerprinted for a candidate
    pub history_frames: usize,
    pub ignore_policy: IgnorePolicy,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            candidate_ratio: 0.5,
            history_frames: 4,
            ignore_policy: IgnorePolicy::Always,
        }
    }
}

/// Complete detector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Input sample rate in Hz
    pub sample_rate: u32,
    /// Analysis frame length in samples
    pub frame_length: usize,
    /// Look-back window for the onset slope test
    pub onset_time_ms: f32,
    pub max_duration_ms: f32,
    pub debounce_ms: f32,
    /// Capacity of each band's baseline ring buffer
    pub baseline_window_size: usize,
    /// MAD multiplier for the high ("click") band
    pub high_multiplier: f32,
    /// MAD multiplier for the low ("thump") band
    pub low_multiplier: f32,
    /// Require the low band to corroborate an event
    pub require_low_band: bool,
    /// Corroboration also needs the low envelope above this multiple of its median
    pub low_band_min_rise: f32,
    /// Reject events starting this close to a metronome tick
    pub tick_guard_ms: f32,
    pub use_listening_zone: bool,
    /// Start of the listening zone as a fraction of the beat period
    pub zone_start: f32,
    /// Width of the listening zone as a fraction of the beat period
    pub zone_width: f32,
    /// Metronome beats that must elapse before detection arms
    pub min_beat_count: u64,
    /// Delay after (re)start before thresholds are trusted
    pub baseline_settle_ms: f32,
    /// Weight of the previous envelope value in the exponential smoother
    pub envelope_smoothing: f32,
    /// Minimum rise factor of the high envelope over the look-back window
    pub onset_slope: f32,
    /// Event closes when the high envelope drops below `release_ratio * threshold`
    pub release_ratio: f32,
    /// Event closes when the envelope excess has decayed to this fraction of its peak excess
    pub decay_ratio: f32,
    /// Absolute floor applied to both band thresholds
    pub min_threshold: f32,
    /// Corner of the high-pass stage ahead of the click band
    pub highpass_hz: f32,
    pub high_band: BandConfig,
    pub low_band: BandConfig,
    pub quality: QualityWeights,
    pub spectral: SpectralConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            frame_length: 441,
            onset_time_ms: 10.0,
            max_duration_ms: 150.0,
            debounce_ms: 150.0,
            baseline_window_size: 100,
            high_multiplier: 4.0,
            low_multiplier: 3.5,
            require_low_band: false,
            low_band_min_rise: 3.0,
            tick_guard_ms: 50.0,
            use_listening_zone: false,
            zone_start: 0.3,
            zone_width: 0.4,
            min_beat_count: 0,
            baseline_settle_ms: 100.0,
            envelope_smoothing: 0.3,
            onset_slope: 2.0,
            release_ratio: 0.5,
            decay_ratio: 0.25,
            min_threshold: 1e-4,
            highpass_hz: 300.0,
            high_band: BandConfig {
                low_hz: 2_500.0,
                high_hz: 8_000.0,
            },
            low_band: BandConfig {
                low_hz: 120.0,
                high_hz: 300.0,
            },
            quality: QualityWeights::default(),
            spectral: SpectralConfig::default(),
        }
    }
}

/// Record of a knob that was clamped into range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub field: String,
    pub requested: f64,
    pub applied: f64,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} = {} out of range; using {}",
            self.field, self.requested, self.applied
        )
    }
}

fn clamp_f32(
    warnings: &mut Vec<ConfigWarning>,
    field: &str,
    value: &mut f32,
    min: f32,
    max: f32,
) {
    let applied = if value.is_finite() {
        value.clamp(min, max)
    } else {
        min
    };
    if applied != *value {
        warnings.push(ConfigWarning {
            field: field.to_string(),
            requested: *value as f64,
            applied: applied as f64,
        });
        *value = applied;
    }
}

fn clamp_usize(
    warnings: &mut Vec<ConfigWarning>,
    field: &str,
    value: &mut usize,
    min: usize,
    max: usize,
) {
    let applied = (*value).clamp(min, max);
    if applied != *value {
        warnings.push(ConfigWarning {
            field: field.to_string(),
            requested: *value as f64,
            applied: applied as f64,
        });
        *value = applied;
    }
}

impl DetectorConfig {
    /// Milliseconds covered by one analysis frame
    pub fn frame_ms(&self) -> f64 {
        self.frame_length as f64 * 1000.0 / self.sample_rate.max(1) as f64
    }

    /// Clamp every knob into its usable range.
    ///
    /// Returns one warning per adjusted field; the config is always usable
    /// afterwards.
    pub fn sanitize(&mut self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let defaults = DetectorConfig::default();

        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            warnings.push(ConfigWarning {
                field: "sample_rate".to_string(),
                requested: self.sample_rate as f64,
                applied: defaults.sample_rate as f64,
            });
            self.sample_rate = defaults.sample_rate;
        }
        clamp_usize(&mut warnings, "frame_length", &mut self.frame_length, 16, 16_384);
        clamp_f32(&mut warnings, "onset_time_ms", &mut self.onset_time_ms, 0.0, 100.0);
        clamp_f32(
            &mut warnings,
            "max_duration_ms",
            &mut self.max_duration_ms,
            10.0,
            2_000.0,
        );
        clamp_f32(&mut warnings, "debounce_ms", &mut self.debounce_ms, 0.0, 5_000.0);
        clamp_usize(
            &mut warnings,
            "baseline_window_size",
            &mut self.baseline_window_size,
            crate::analysis::threshold::MIN_SAMPLES,
            1_000,
        );
        clamp_f32(
            &mut warnings,
            "high_multiplier",
            &mut self.high_multiplier,
            MIN_MULTIPLIER,
            MAX_MULTIPLIER,
        );
        clamp_f32(
            &mut warnings,
            "low_band_min_rise",
            &mut self.low_band_min_rise,
            1.0,
            20.0,
        );
        clamp_f32(
            &mut warnings,
            "low_multiplier",
            &mut self.low_multiplier,
            MIN_MULTIPLIER,
            MAX_MULTIPLIER,
        );
        clamp_f32(&mut warnings, "tick_guard_ms", &mut self.tick_guard_ms, 30.0, 80.0);
        clamp_f32(&mut warnings, "zone_start", &mut self.zone_start, 0.0, 1.0);
        clamp_f32(&mut warnings, "zone_width", &mut self.zone_width, 0.0, 1.0);
        clamp_f32(
            &mut warnings,
            "baseline_settle_ms",
            &mut self.baseline_settle_ms,
            0.0,
            5_000.0,
        );
        clamp_f32(
            &mut warnings,
            "envelope_smoothing",
            &mut self.envelope_smoothing,
            0.0,
            0.99,
        );
        clamp_f32(&mut warnings, "onset_slope", &mut self.onset_slope, 1.0, 20.0);
        clamp_f32(&mut warnings, "release_ratio", &mut self.release_ratio, 0.0, 1.0);
        clamp_f32(&mut warnings, "decay_ratio", &mut self.decay_ratio, 0.0, 1.0);
        clamp_f32(&mut warnings, "min_threshold", &mut self.min_threshold, 0.0, 1.0);

        let nyquist = self.sample_rate as f32 * 0.49;
        clamp_f32(&mut warnings, "highpass_hz", &mut self.highpass_hz, 10.0, nyquist);
        for (name, band, fallback) in [
            ("high_band", &mut self.high_band, defaults.high_band),
            ("low_band", &mut self.low_band, defaults.low_band),
        ] {
            let valid = band.low_hz.is_finite()
                && band.high_hz.is_finite()
                && band.low_hz >= 10.0
                && band.high_hz <= nyquist
                && band.low_hz < band.high_hz;
            if !valid {
                warnings.push(ConfigWarning {
                    field: name.to_string(),
                    requested: band.center_hz() as f64,
                    applied: fallback.center_hz() as f64,
                });
                *band = fallback;
                // Low sample rates cannot host the default click band.
                band.high_hz = band.high_hz.min(nyquist);
                band.low_hz = band.low_hz.min(band.high_hz * 0.5);
            }
        }

        clamp_f32(
            &mut warnings,
            "quality.ratio_scale",
            &mut self.quality.ratio_scale,
            0.1,
            100.0,
        );
        clamp_f32(
            &mut warnings,
            "spectral.candidate_ratio",
            &mut self.spectral.candidate_ratio,
            0.1,
            1.0,
        );
        clamp_usize(
            &mut warnings,
            "spectral.history_frames",
            &mut self.spectral.history_frames,
            1,
            16,
        );

        for warning in &warnings {
            tracing::warn!("[Config] {}", warning);
        }
        warnings
    }

    /// Apply a partial update, then clamp.
    pub fn apply_patch(&mut self, patch: &ConfigPatch) -> Vec<ConfigWarning> {
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = patch.$field.clone() {
                    self.$field = value;
                })*
            };
        }
        take!(
            sample_rate,
            frame_length,
            onset_time_ms,
            max_duration_ms,
            debounce_ms,
            baseline_window_size,
            high_multiplier,
            low_multiplier,
            require_low_band,
            low_band_min_rise,
            tick_guard_ms,
            use_listening_zone,
            zone_start,
            zone_width,
            min_beat_count,
            baseline_settle_ms,
            envelope_smoothing,
            onset_slope,
            release_ratio,
            decay_ratio,
            min_threshold,
            highpass_hz,
            high_band,
            low_band,
            quality,
            spectral,
        );
        if let Some(sensitivity) = patch.sensitivity {
            let (high, low) = sensitivity_to_multipliers(sensitivity);
            self.high_multiplier = high;
            self.low_multiplier = low;
        }
        self.sanitize()
    }

    /// Whether switching from `self` to `other` requires rebuilding the filters.
    pub fn needs_rebuild(&self, other: &DetectorConfig) -> bool {
        self.sample_rate != other.sample_rate
            || self.frame_length != other.frame_length
            || self.baseline_window_size != other.baseline_window_size
            || self.highpass_hz != other.highpass_hz
            || self.high_band != other.high_band
            || self.low_band != other.low_band
    }

    /// Load configuration from a JSON file
    ///
    /// Missing or malformed files fall back to defaults with a warning.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        let mut config = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    tracing::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                tracing::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        };
        config.sanitize();
        config
    }
}

/// Partial configuration update
///
/// Unset fields leave the current value untouched. `sensitivity` (0..1,
/// higher = more sensitive) overrides both band multipliers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigPatch {
    pub sample_rate: Option<u32>,
    pub frame_length: Option<usize>,
    pub onset_time_ms: Option<f32>,
    pub max_duration_ms: Option<f32>,
    pub debounce_ms: Option<f32>,
    pub baseline_window_size: Option<usize>,
    pub high_multiplier: Option<f32>,
    pub low_multiplier: Option<f32>,
    pub require_low_band: Option<bool>,
    pub low_band_min_rise: Option<f32>,
    pub tick_guard_ms: Option<f32>,
    pub use_listening_zone: Option<bool>,
    pub zone_start: Option<f32>,
    pub zone_width: Option<f32>,
    pub min_beat_count: Option<u64>,
    pub baseline_settle_ms: Option<f32>,
    pub envelope_smoothing: Option<f32>,
    pub onset_slope: Option<f32>,
    pub release_ratio: Option<f32>,
    pub decay_ratio: Option<f32>,
    pub min_threshold: Option<f32>,
    pub highpass_hz: Option<f32>,
    pub high_band: Option<BandConfig>,
    pub low_band: Option<BandConfig>,
    pub quality: Option<QualityWeights>,
    pub spectral: Option<SpectralConfig>,
    pub sensitivity: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DetectorConfig::default();
        assert_eq!(config.sample_rate, 44_100);
        assert_eq!(config.frame_length, 441);
        assert_eq!(config.max_duration_ms, 150.0);
        assert_eq!(config.baseline_window_size, 100);
        assert!((config.frame_ms() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_default_config_is_already_sane() {
        let mut config = DetectorConfig::default();
        assert!(config.sanitize().is_empty());
    }

    #[test]
    fn test_sanitize_clamps_and_reports() {
        let mut config = DetectorConfig {
            sample_rate: 0,
            high_multiplier: 25.0,
            low_multiplier: 0.2,
            tick_guard_ms: 5.0,
            low_band_min_rise: 0.5,
            ..DetectorConfig::default()
        };
        let warnings = config.sanitize();

        assert_eq!(config.sample_rate, 44_100);
        assert_eq!(config.high_multiplier, 10.0);
        assert_eq!(config.low_multiplier, 1.0);
        assert_eq!(config.tick_guard_ms, 30.0);
        assert_eq!(config.low_band_min_rise, 1.0);
        let fields: Vec<&str> = warnings.iter().map(|w| w.field.as_str()).collect();
        assert!(fields.contains(&"sample_rate"));
        assert!(fields.contains(&"high_multiplier"));
        assert!(fields.contains(&"low_multiplier"));
        assert!(fields.contains(&"tick_guard_ms"));
        assert!(fields.contains(&"low_band_min_rise"));
    }

    #[test]
    fn test_invalid_band_reverts_to_default() {
        let mut config = DetectorConfig {
            high_band: BandConfig {
                low_hz: 9_000.0,
                high_hz: 3_000.0,
            },
            ..DetectorConfig::default()
        };
        let warnings = config.sanitize();
        assert_eq!(config.high_band, DetectorConfig::default().high_band);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_patch_applies_only_set_fields() {
        let mut config = DetectorConfig::default();
        let patch = ConfigPatch {
            debounce_ms: Some(200.0),
            require_low_band: Some(true),
            ..ConfigPatch::default()
        };
        let warnings = config.apply_patch(&patch);
        assert!(warnings.is_empty());
        assert_eq!(config.debounce_ms, 200.0);
        assert!(config.require_low_band);
        assert_eq!(config.max_duration_ms, 150.0);
    }

    #[test]
    fn test_patch_sensitivity_sets_both_multipliers() {
        let mut config = DetectorConfig::default();
        config.apply_patch(&ConfigPatch {
            sensitivity: Some(1.0),
            ..ConfigPatch::default()
        });
        assert_eq!(config.high_multiplier, 1.0);
        assert_eq!(config.low_multiplier, 1.0);

        config.apply_patch(&ConfigPatch {
            sensitivity: Some(0.0),
            ..ConfigPatch::default()
        });
        assert_eq!(config.high_multiplier, 10.0);
        assert!((config.low_multiplier - 8.75).abs() < 1e-6);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "debounce_ms": 250.0, "spectral": { "history_frames": 2 } }"#;
        let config: DetectorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.debounce_ms, 250.0);
        assert_eq!(config.spectral.history_frames, 2);
        assert_eq!(config.spectral.candidate_ratio, 0.5);
        assert_eq!(config.frame_length, 441);
    }

    #[test]
    fn test_ignore_policy_json_shape() {
        let policy: IgnorePolicy =
            serde_json::from_str(r#"{ "mode": "unless_energy_above", "ratio": 3.0 }"#).unwrap();
        assert_eq!(policy, IgnorePolicy::UnlessEnergyAbove { ratio: 3.0 });
    }

    #[test]
    fn test_load_missing_file_falls_back_to_defaults() {
        let config = DetectorConfig::load_from_file("/nonexistent/putt_config.json");
        assert_eq!(config, DetectorConfig::default());
    }
}
