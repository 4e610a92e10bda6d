// SpectralProfileMatcher - compare recent audio against recorded templates
//
// Keeps a ring of the most recent raw frames. When the detector flags a
// candidate, the frames are concatenated oldest-first, fingerprinted and
// compared to every enabled profile.
//
// The frames are the detector's input, not its band-filtered signal: profile
// recordings are fingerprinted from raw audio by the same extractor (40 Hz DC
// block, then FFT), and both sides must see identical processing for their
// cosine similarity to be meaningful.

use serde::{Deserialize, Serialize};

use super::profile::{FingerprintExtractor, ProfileKind, SoundProfile};
use crate::profiles::ProfileSet;

/// Best profile match for a candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileMatch {
    pub name: String,
    pub kind: ProfileKind,
    pub similarity: f32,
}

/// Highest-similarity profile that clears its own cutoff
///
/// Disabled profiles are skipped. On equal similarity an ignore profile wins.
pub fn best_match(fingerprint: &[f32], profiles: &ProfileSet) -> Option<ProfileMatch> {
    profiles
        .target
        .iter()
        .chain(profiles.ignore.iter())
        .filter(|p| p.enabled)
        .filter_map(|p: &SoundProfile| {
            let similarity = p.similarity(fingerprint);
            (similarity >= p.similarity_threshold).then(|| ProfileMatch {
                name: p.name.clone(),
                kind: p.kind,
                similarity,
            })
        })
        .fold(None, |best: Option<ProfileMatch>, candidate| match best {
            Some(b)
                if b.similarity > candidate.similarity
                    || (b.similarity == candidate.similarity
                        && b.kind == ProfileKind::Ignore) =>
            {
                Some(b)
            }
            _ => Some(candidate),
        })
}

pub struct SpectralProfileMatcher {
    extractor: FingerprintExtractor,
    history: Vec<Vec<f32>>,
    next: usize,
    filled: usize,
    window: Vec<f32>,
}

impl SpectralProfileMatcher {
    pub fn new(sample_rate: u32, frame_length: usize, history_frames: usize) -> Self {
        let history_frames = history_frames.max(1);
        Self {
            extractor: FingerprintExtractor::new(sample_rate),
            history: vec![vec![0.0; frame_length]; history_frames],
            next: 0,
            filled: 0,
            window: Vec::with_capacity(frame_length * history_frames),
        }
    }

    pub fn history_frames(&self) -> usize {
        self.history.len()
    }

    /// Remember a frame; the oldest is overwritten once the ring is full
    pub fn push_frame(&mut self, frame: &[f32]) {
        let slot = &mut self.history[self.next];
        slot.clear();
        slot.extend_from_slice(frame);
        self.next = (self.next + 1) % self.history.len();
        self.filled = (self.filled + 1).min(self.history.len());
    }

    /// Fingerprint of the remembered frames, oldest first
    pub fn fingerprint(&mut self) -> Option<Vec<f32>> {
        if self.filled == 0 {
            return None;
        }
        let len = self.history.len();
        let oldest = (self.next + len - self.filled) % len;
        self.window.clear();
        for k in 0..self.filled {
            self.window.extend_from_slice(&self.history[(oldest + k) % len]);
        }
        self.extractor.extract(&self.window)
    }

    /// Fingerprint the recent frames and find the best match in `profiles`
    pub fn match_profiles(&mut self, profiles: &ProfileSet) -> Option<ProfileMatch> {
        if profiles.is_empty() {
            return None;
        }
        let fingerprint = self.fingerprint()?;
        let matched = best_match(&fingerprint, profiles);
        if let Some(ref m) = matched {
            tracing::debug!(
                "[SpectralProfileMatcher] {:?} profile '{}' matched (similarity {:.3})",
                m.kind,
                m.name,
                m.similarity
            );
        }
        matched
    }

    pub fn clear(&mut self) {
        self.next = 0;
        self.filled = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(index: usize) -> Vec<f32> {
        let mut v = vec![0.0; super::super::FINGERPRINT_BINS];
        v[index] = 1.0;
        v
    }

    fn profile(name: &str, kind: ProfileKind, template: Vec<f32>, cutoff: f32) -> SoundProfile {
        SoundProfile::new(name, kind, template)
            .unwrap()
            .with_threshold(cutoff)
    }

    #[test]
    fn test_best_match_respects_cutoffs() {
        let set = ProfileSet {
            target: vec![profile("putter", ProfileKind::Target, unit(3), 0.9)],
            ignore: vec![profile("coin", ProfileKind::Ignore, unit(7), 0.9)],
        };
        let found = best_match(&unit(3), &set).unwrap();
        assert_eq!(found.name, "putter");
        assert_eq!(found.kind, ProfileKind::Target);
        assert!(best_match(&unit(20), &set).is_none());
    }

    #[test]
    fn test_disabled_profiles_are_skipped() {
        let mut coin = profile("coin", ProfileKind::Ignore, unit(7), 0.5);
        coin.enabled = false;
        let set = ProfileSet {
            target: Vec::new(),
            ignore: vec![coin],
        };
        assert!(best_match(&unit(7), &set).is_none());
    }

    #[test]
    fn test_ignore_wins_ties() {
        let set = ProfileSet {
            target: vec![profile("putter", ProfileKind::Target, unit(3), 0.5)],
            ignore: vec![profile("tap", ProfileKind::Ignore, unit(3), 0.5)],
        };
        assert_eq!(best_match(&unit(3), &set).unwrap().kind, ProfileKind::Ignore);
    }

    #[test]
    fn test_candidate_matches_recording_fingerprint() {
        let frames: Vec<Vec<f32>> = (0..4)
            .map(|f| {
                (0..441)
                    .map(|n| {
                        let t = (f * 441 + n) as f32 / 44_100.0;
                        0.3 * (2.0 * std::f32::consts::PI * 5_000.0 * t).sin()
                    })
                    .collect()
            })
            .collect();

        let mut matcher = SpectralProfileMatcher::new(44_100, 441, 4);
        for frame in &frames {
            matcher.push_frame(frame);
        }
        let candidate = matcher.fingerprint().unwrap();
        let recording = FingerprintExtractor::new(44_100)
            .extract(&frames.concat())
            .unwrap();

        for (a, b) in candidate.iter().zip(&recording) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_history_is_fingerprinted_oldest_first() {
        let mut matcher = SpectralProfileMatcher::new(44_100, 4, 2);
        assert!(matcher.fingerprint().is_none());
        matcher.push_frame(&[0.0; 4]);
        matcher.push_frame(&[1.0, -1.0, 1.0, -1.0]);
        matcher.push_frame(&[0.5, -0.5, 0.5, -0.5]);
        assert!(matcher.fingerprint().is_some());
        assert_eq!(matcher.window.len(), 8);
        assert_eq!(matcher.window[0], 1.0);
        matcher.clear();
        assert!(matcher.fingerprint().is_none());
    }
}
