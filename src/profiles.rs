//! Sound profile store
//!
//! The detector only ever reads profiles through [`ProfileStore`]. This module
//! also provides the concrete pieces around it: [`ProfileLibrary`], an
//! in-memory store persisted as JSON, and [`ProfileRecorder`], which turns a
//! handful of recordings of one sound into a [`SoundProfile`].

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::RwLock;

use crate::analysis::spectral::{
    average_fingerprints, FingerprintExtractor, ProfileKind, SoundProfile,
    DEFAULT_SIMILARITY_THRESHOLD,
};
use crate::error::ProfileError;

/// Recordings required by default before a profile can be built
pub const DEFAULT_MIN_RECORDINGS: usize = 3;

/// Enabled profiles split by kind
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileSet {
    pub target: Vec<SoundProfile>,
    pub ignore: Vec<SoundProfile>,
}

impl ProfileSet {
    pub fn is_empty(&self) -> bool {
        self.target.is_empty() && self.ignore.is_empty()
    }
}

/// Read-only view of the profiles the detector should match against
pub trait ProfileStore: Send + Sync {
    fn enabled_profiles(&self) -> ProfileSet;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LibraryFile {
    profiles: Vec<SoundProfile>,
}

/// In-memory profile collection with JSON persistence
#[derive(Debug, Default)]
pub struct ProfileLibrary {
    profiles: RwLock<Vec<SoundProfile>>,
}

impl ProfileLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_profiles(profiles: Vec<SoundProfile>) -> Self {
        Self {
            profiles: RwLock::new(profiles),
        }
    }

    /// Load a library written by [`Self::save`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ProfileError> {
        let contents = fs::read_to_string(&path)?;
        let file: LibraryFile = serde_json::from_str(&contents)?;
        for profile in &file.profiles {
            if profile.spectral_template.len() != crate::analysis::spectral::FINGERPRINT_BINS {
                return Err(ProfileError::TemplateSize {
                    expected: crate::analysis::spectral::FINGERPRINT_BINS,
                    actual: profile.spectral_template.len(),
                });
            }
        }
        tracing::info!(
            "[ProfileLibrary] Loaded {} profiles from {:?}",
            file.profiles.len(),
            path.as_ref()
        );
        Ok(Self::from_profiles(file.profiles))
    }

    /// Load `path` if it exists, otherwise start empty
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ProfileError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::new())
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ProfileError> {
        let file = LibraryFile {
            profiles: self.profiles(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        fs::write(&path, json)?;
        tracing::info!(
            "[ProfileLibrary] Saved {} profiles to {:?}",
            file.profiles.len(),
            path.as_ref()
        );
        Ok(())
    }

    /// Snapshot of every profile, enabled or not
    pub fn profiles(&self) -> Vec<SoundProfile> {
        match self.profiles.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<SoundProfile>> {
        match self.profiles.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Insert a profile, replacing any existing one with the same name
    pub fn upsert(&self, profile: SoundProfile) {
        let mut profiles = self.write();
        match profiles.iter_mut().find(|p| p.name == profile.name) {
            Some(existing) => *existing = profile,
            None => profiles.push(profile),
        }
    }

    /// Remove by name; returns whether anything was removed
    pub fn remove(&self, name: &str) -> bool {
        let mut profiles = self.write();
        let before = profiles.len();
        profiles.retain(|p| p.name != name);
        profiles.len() != before
    }

    /// Enable or disable by name; returns whether the profile exists
    pub fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        let mut profiles = self.write();
        match profiles.iter_mut().find(|p| p.name == name) {
            Some(profile) => {
                profile.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.profiles().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ProfileStore for ProfileLibrary {
    fn enabled_profiles(&self) -> ProfileSet {
        let guard = match self.profiles.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut set = ProfileSet::default();
        for profile in guard.iter().filter(|p| p.enabled) {
            match profile.kind {
                ProfileKind::Target => set.target.push(profile.clone()),
                ProfileKind::Ignore => set.ignore.push(profile.clone()),
            }
        }
        set
    }
}

/// Builds a profile by averaging the fingerprints of several recordings
pub struct ProfileRecorder {
    name: String,
    kind: ProfileKind,
    min_recordings: usize,
    similarity_threshold: f32,
    extractor: FingerprintExtractor,
    fingerprints: Vec<Vec<f32>>,
}

impl ProfileRecorder {
    pub fn new(name: impl Into<String>, kind: ProfileKind, sample_rate: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            min_recordings: DEFAULT_MIN_RECORDINGS,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            extractor: FingerprintExtractor::new(sample_rate),
            fingerprints: Vec::new(),
        }
    }

    pub fn with_min_recordings(mut self, min_recordings: usize) -> Self {
        self.min_recordings = min_recordings.max(1);
        self
    }

    pub fn with_threshold(mut self, similarity_threshold: f32) -> Self {
        self.similarity_threshold = similarity_threshold.clamp(0.0, 1.0);
        self
    }

    /// Fingerprint one recording. Returns the number collected so far.
    pub fn add_recording(&mut self, samples: &[f32]) -> Result<usize, ProfileError> {
        let fingerprint = self
            .extractor
            .extract(samples)
            .ok_or(ProfileError::EmptyRecording)?;
        self.fingerprints.push(fingerprint);
        tracing::debug!(
            "[ProfileRecorder] '{}' recording {}/{}",
            self.name,
            self.fingerprints.len(),
            self.min_recordings
        );
        Ok(self.fingerprints.len())
    }

    pub fn recordings(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn is_complete(&self) -> bool {
        self.fingerprints.len() >= self.min_recordings
    }

    /// Average the collected fingerprints into a profile
    pub fn finish(self) -> Result<SoundProfile, ProfileError> {
        if !self.is_complete() {
            return Err(ProfileError::InsufficientRecordings {
                required: self.min_recordings,
                collected: self.fingerprints.len(),
            });
        }
        let template =
            average_fingerprints(&self.fingerprints).ok_or(ProfileError::EmptyRecording)?;
        tracing::info!(
            "[ProfileRecorder] Built {:?} profile '{}' from {} recordings",
            self.kind,
            self.name,
            self.fingerprints.len()
        );
        Ok(SoundProfile::new(self.name, self.kind, template)?
            .with_threshold(self.similarity_threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn recording(seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..1_764)
            .map(|n| {
                let tone = if n >= 1_323 {
                    0.3 * (2.0 * std::f32::consts::PI * 5_000.0 * n as f32 / 44_100.0).sin()
                } else {
                    0.0
                };
                tone + rng.gen_range(-0.01..0.01)
            })
            .collect()
    }

    #[test]
    fn test_recorder_requires_minimum_recordings() {
        let mut recorder = ProfileRecorder::new("putter", ProfileKind::Target, 44_100);
        recorder.add_recording(&recording(1)).unwrap();
        let err = recorder.finish().unwrap_err();
        assert_eq!(
            err,
            ProfileError::InsufficientRecordings {
                required: 3,
                collected: 1
            }
        );
    }

    #[test]
    fn test_recorder_rejects_silence() {
        let mut recorder = ProfileRecorder::new("putter", ProfileKind::Target, 44_100);
        assert_eq!(
            recorder.add_recording(&[0.0; 512]),
            Err(ProfileError::EmptyRecording)
        );
        assert_eq!(recorder.recordings(), 0);
    }

    #[test]
    fn test_averaged_profile_matches_new_recording() {
        let mut recorder = ProfileRecorder::new("putter", ProfileKind::Target, 44_100);
        for seed in 1..=3 {
            recorder.add_recording(&recording(seed)).unwrap();
        }
        assert!(recorder.is_complete());
        let profile = recorder.finish().unwrap();

        let mut extractor = FingerprintExtractor::new(44_100);
        let fresh = extractor.extract(&recording(99)).unwrap();
        let similarity = profile.similarity(&fresh);
        assert!(similarity > 0.9, "similarity {} should exceed 0.9", similarity);
    }

    #[test]
    fn test_library_splits_enabled_profiles() {
        let library = ProfileLibrary::new();
        let template = vec![1.0 / (128f32).sqrt(); 128];
        library.upsert(SoundProfile::new("putter", ProfileKind::Target, template.clone()).unwrap());
        library.upsert(SoundProfile::new("coin", ProfileKind::Ignore, template.clone()).unwrap());
        library.upsert(SoundProfile::new("tap", ProfileKind::Ignore, template).unwrap());
        assert!(library.set_enabled("tap", false));
        assert!(!library.set_enabled("missing", false));

        let set = library.enabled_profiles();
        assert_eq!(set.target.len(), 1);
        assert_eq!(set.ignore.len(), 1);
        assert_eq!(set.ignore[0].name, "coin");

        assert!(library.remove("coin"));
        assert!(!library.remove("coin"));
        assert_eq!(library.len(), 2);
    }

    #[test]
    fn test_upsert_replaces_by_name() {
        let library = ProfileLibrary::new();
        let template = vec![1.0 / (128f32).sqrt(); 128];
        library.upsert(SoundProfile::new("putter", ProfileKind::Target, template.clone()).unwrap());
        library.upsert(
            SoundProfile::new("putter", ProfileKind::Target, template)
                .unwrap()
                .with_threshold(0.95),
        );
        let profiles = library.profiles();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].similarity_threshold, 0.95);
    }

    #[test]
    fn test_library_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        let library = ProfileLibrary::new();
        let template = vec![1.0 / (128f32).sqrt(); 128];
        library.upsert(SoundProfile::new("putter", ProfileKind::Target, template).unwrap());
        library.save(&path).unwrap();

        let loaded = ProfileLibrary::load(&path).unwrap();
        assert_eq!(loaded.profiles(), library.profiles());
        assert!(ProfileLibrary::load_or_default(dir.path().join("none.json"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            ProfileLibrary::load(&path),
            Err(ProfileError::Parse { .. })
        ));
    }
}
