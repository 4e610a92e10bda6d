// Putt Detector Core - real-time putter strike detection
// Frame-synchronous DSP pipeline fed by a lock-free capture path

pub mod analysis;
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod profiles;

// Re-exports for convenience
pub use analysis::{DetectorStats, StrikeDetector, StrikeEvent, StrikeListener};
pub use audio::metronome::{BeatSource, GridMetronome};
pub use config::{ConfigPatch, ConfigWarning, DetectorConfig, IgnorePolicy};
pub use engine::{BackendKind, EngineHandle};
pub use error::{AudioError, ProfileError};
pub use profiles::{ProfileLibrary, ProfileRecorder, ProfileStore};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_structure() {
        let detector = StrikeDetector::new(DetectorConfig::default());
        assert_eq!(detector.stats().frame_count, 0);
        assert!(ProfileLibrary::new().is_empty());
    }
}
