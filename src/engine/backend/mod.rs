//! Capture backends for the engine core.
//!
//! A backend delivers audio into the shared detector until stopped. The
//! implementation is chosen once, at construction, through [`BackendKind`]:
//! the `cpal` microphone backend for real capture, or the synthetic backend
//! whose samples are pushed by the caller (tests, offline tooling).

use std::sync::{Arc, Mutex, MutexGuard};

use crate::analysis::StrikeDetector;
use crate::error::AudioError;

mod cpal;
mod synthetic;

pub use self::cpal::CpalBackend;
pub use self::synthetic::{SyntheticBackend, SyntheticFeeder};

/// Detector shared between the engine handle and a backend's delivery thread
pub type SharedDetector = Arc<Mutex<StrikeDetector>>;

/// Lock the shared detector, mapping poisoning to [`AudioError::LockPoisoned`]
pub fn lock_detector(detector: &SharedDetector) -> Result<MutexGuard<'_, StrikeDetector>, AudioError> {
    detector.lock().map_err(|_| AudioError::LockPoisoned {
        component: "detector".to_string(),
    })
}

/// Trait implemented by capture backends.
///
/// `start` must fail fast with a distinguishable error when capture is
/// unavailable. After `stop` returns, no further frames reach the detector.
pub trait CaptureBackend: Send {
    fn name(&self) -> &'static str;

    fn start(&mut self, detector: SharedDetector) -> Result<(), AudioError>;

    fn stop(&mut self) -> Result<(), AudioError>;

    fn is_running(&self) -> bool;

    /// Handle for pushing samples, for backends fed by the caller
    fn feeder(&self) -> Option<SyntheticFeeder> {
        None
    }
}

/// Backend selection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BackendKind {
    /// Default (or named) input device through cpal
    #[default]
    Cpal,
    CpalDevice(String),
    /// Caller-fed samples
    Synthetic,
    /// Synthetic backend whose start always fails with `PermissionDenied`
    SyntheticDenied,
}

/// Build the backend for `kind`
pub fn create_backend(kind: &BackendKind) -> Box<dyn CaptureBackend> {
    match kind {
        BackendKind::Cpal => Box::new(CpalBackend::new(None)),
        BackendKind::CpalDevice(name) => Box::new(CpalBackend::new(Some(name.clone()))),
        BackendKind::Synthetic => Box::new(SyntheticBackend::new()),
        BackendKind::SyntheticDenied => Box::new(SyntheticBackend::denied()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_selects_backend() {
        assert_eq!(create_backend(&BackendKind::Synthetic).name(), "synthetic");
        assert_eq!(create_backend(&BackendKind::Cpal).name(), "cpal");
        assert!(create_backend(&BackendKind::Synthetic).feeder().is_some());
        assert!(create_backend(&BackendKind::Cpal).feeder().is_none());
    }
}
