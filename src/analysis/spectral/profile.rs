// Spectral fingerprints and sound profiles
//
// A fingerprint is a 128-bin log-magnitude spectrum, averaged over Hann
// windows hopping across a short stretch of audio, floored 60 dB below its
// own peak and L2-normalised. All values are non-negative, so the cosine
// similarity of two fingerprints lies in [0, 1].

use serde::{Deserialize, Serialize};

use super::fft::FftProcessor;
use crate::analysis::filter::{Biquad, BUTTERWORTH_Q};
use crate::error::ProfileError;

/// Bins in a fingerprint (DC bin dropped)
pub const FINGERPRINT_BINS: usize = 128;
/// FFT window length used for fingerprints
pub const FINGERPRINT_FFT_SIZE: usize = 2 * FINGERPRINT_BINS;
const FINGERPRINT_HOP: usize = FINGERPRINT_FFT_SIZE / 2;
/// Dynamic range kept below the loudest bin
const FLOOR_DB: f32 = 60.0;
/// Corner of the DC-blocking high-pass applied before the FFT
const DC_BLOCK_HZ: f32 = 40.0;

pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.85;

/// Whether a matching profile forces acceptance or discards the candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileKind {
    Target,
    Ignore,
}

fn default_enabled() -> bool {
    true
}

/// Named spectral template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundProfile {
    pub name: String,
    pub kind: ProfileKind,
    /// L2-normalised log-magnitude template, [`FINGERPRINT_BINS`] long
    pub spectral_template: Vec<f32>,
    /// Minimum cosine similarity for a match
    pub similarity_threshold: f32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl SoundProfile {
    pub fn new(
        name: impl Into<String>,
        kind: ProfileKind,
        spectral_template: Vec<f32>,
    ) -> Result<Self, ProfileError> {
        if spectral_template.len() != FINGERPRINT_BINS {
            return Err(ProfileError::TemplateSize {
                expected: FINGERPRINT_BINS,
                actual: spectral_template.len(),
            });
        }
        Ok(Self {
            name: name.into(),
            kind,
            spectral_template,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            enabled: true,
        })
    }

    pub fn with_threshold(mut self, similarity_threshold: f32) -> Self {
        self.similarity_threshold = similarity_threshold.clamp(0.0, 1.0);
        self
    }

    pub fn similarity(&self, fingerprint: &[f32]) -> f32 {
        cosine_similarity(&self.spectral_template, fingerprint)
    }
}

/// Cosine similarity clamped to [0, 1]; 0 for mismatched or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        dot += x as f64 * y as f64;
        norm_a += x as f64 * x as f64;
        norm_b += y as f64 * y as f64;
    }
    if norm_a <= f64::EPSILON || norm_b <= f64::EPSILON {
        return 0.0;
    }
    ((dot / (norm_a.sqrt() * norm_b.sqrt())) as f32).clamp(0.0, 1.0)
}

fn normalize(values: &mut [f32]) -> bool {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm <= f32::EPSILON || !norm.is_finite() {
        return false;
    }
    values.iter_mut().for_each(|v| *v /= norm);
    true
}

/// Mean of several fingerprints, renormalised
pub fn average_fingerprints(fingerprints: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = fingerprints.first()?;
    let mut mean = vec![0.0f32; first.len()];
    for fingerprint in fingerprints {
        if fingerprint.len() != mean.len() {
            return None;
        }
        for (m, v) in mean.iter_mut().zip(fingerprint) {
            *m += v;
        }
    }
    normalize(&mut mean).then_some(mean)
}

/// Computes fingerprints from raw audio
pub struct FingerprintExtractor {
    fft: FftProcessor,
    dc_block: Biquad,
    filtered: Vec<f32>,
    magnitudes: Vec<f32>,
    accum: Vec<f32>,
}

impl FingerprintExtractor {
    pub fn new(sample_rate: u32) -> Self {
        let fft = FftProcessor::new(FINGERPRINT_FFT_SIZE);
        let bins = fft.bins();
        Self {
            fft,
            dc_block: Biquad::highpass(sample_rate as f32, DC_BLOCK_HZ, BUTTERWORTH_Q),
            filtered: Vec::new(),
            magnitudes: vec![0.0; bins],
            accum: vec![0.0; FINGERPRINT_BINS],
        }
    }

    /// Fingerprint `samples`; `None` for empty or silent input
    pub fn extract(&mut self, samples: &[f32]) -> Option<Vec<f32>> {
        if samples.is_empty() {
            return None;
        }

        self.dc_block.reset();
        self.filtered.clear();
        for &sample in samples {
            let value = if sample.is_finite() { sample } else { 0.0 };
            self.filtered.push(self.dc_block.process(value));
        }

        self.accum.iter_mut().for_each(|v| *v = 0.0);
        let mut windows = 0usize;
        let mut start = 0usize;
        loop {
            let end = (start + FINGERPRINT_FFT_SIZE).min(self.filtered.len());
            self.fft
                .magnitude_spectrum_into(&self.filtered[start..end], &mut self.magnitudes);
            for (acc, mag) in self.accum.iter_mut().zip(&self.magnitudes[1..]) {
                *acc += mag;
            }
            windows += 1;
            start += FINGERPRINT_HOP;
            if start + FINGERPRINT_FFT_SIZE > self.filtered.len() {
                break;
            }
        }

        let peak = self
            .accum
            .iter()
            .map(|m| m / windows as f32)
            .fold(0.0f32, f32::max);
        if peak <= 1e-9 {
            return None;
        }

        let mut fingerprint: Vec<f32> = self
            .accum
            .iter()
            .map(|&m| {
                let relative = (m / windows as f32 / peak).max(1e-12);
                (20.0 * relative.log10() + FLOOR_DB).max(0.0)
            })
            .collect();
        normalize(&mut fingerprint).then_some(fingerprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn tone(freq: f32, len: usize, amplitude: f32, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..len)
            .map(|n| {
                amplitude * (2.0 * std::f32::consts::PI * freq * n as f32 / 44_100.0).sin()
                    + rng.gen_range(-0.01..0.01)
            })
            .collect()
    }

    #[test]
    fn test_fingerprint_is_normalised() {
        let mut extractor = FingerprintExtractor::new(44_100);
        let fingerprint = extractor.extract(&tone(5_000.0, 1_764, 0.3, 1)).unwrap();
        assert_eq!(fingerprint.len(), FINGERPRINT_BINS);
        let norm: f32 = fingerprint.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
        assert!(fingerprint.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_silence_has_no_fingerprint() {
        let mut extractor = FingerprintExtractor::new(44_100);
        assert!(extractor.extract(&[0.0; 1_000]).is_none());
        assert!(extractor.extract(&[]).is_none());
    }

    #[test]
    fn test_short_input_is_zero_padded() {
        let mut extractor = FingerprintExtractor::new(44_100);
        assert!(extractor.extract(&tone(2_000.0, 100, 0.5, 2)).is_some());
    }

    #[test]
    fn test_same_sound_scores_higher_than_different_sound() {
        let mut extractor = FingerprintExtractor::new(44_100);
        let a = extractor.extract(&tone(5_000.0, 1_764, 0.3, 3)).unwrap();
        let b = extractor.extract(&tone(5_000.0, 1_764, 0.3, 4)).unwrap();
        let c = extractor.extract(&tone(1_000.0, 1_764, 0.3, 5)).unwrap();
        let same = cosine_similarity(&a, &b);
        let different = cosine_similarity(&a, &c);
        assert!(same > 0.9, "same sound similarity {}", same);
        assert!(different < same, "{} should be below {}", different, same);
    }

    #[test]
    fn test_cosine_similarity_edges() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_profile_rejects_wrong_template_size() {
        let err = SoundProfile::new("putt", ProfileKind::Target, vec![0.0; 10]).unwrap_err();
        assert_eq!(
            err,
            ProfileError::TemplateSize {
                expected: FINGERPRINT_BINS,
                actual: 10
            }
        );
    }

    #[test]
    fn test_average_fingerprints() {
        let avg = average_fingerprints(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        assert!((avg[0] - avg[1]).abs() < 1e-6);
        assert!(average_fingerprints(&[]).is_none());
        assert!(average_fingerprints(&[vec![1.0], vec![1.0, 0.0]]).is_none());
    }
}
