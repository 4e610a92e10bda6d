use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::analysis::StrikeEvent;
use crate::error::AudioError;

use super::{lock_detector, CaptureBackend, SharedDetector};

#[derive(Default)]
struct FeedState {
    running: AtomicBool,
    detector: Mutex<Option<SharedDetector>>,
}

/// Synthetic backend used for deterministic testing and offline tooling.
///
/// No audio device is opened; samples arrive through a [`SyntheticFeeder`]
/// and are processed synchronously on the caller's thread.
pub struct SyntheticBackend {
    state: Arc<FeedState>,
    deny: bool,
}

impl SyntheticBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(FeedState::default()),
            deny: false,
        }
    }

    /// Backend that behaves like a device with microphone permission refused
    pub fn denied() -> Self {
        Self {
            deny: true,
            ..Self::new()
        }
    }
}

impl Default for SyntheticBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for SyntheticBackend {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn start(&mut self, detector: SharedDetector) -> Result<(), AudioError> {
        if self.deny {
            return Err(AudioError::PermissionDenied);
        }
        let mut slot = self.state.detector.lock().map_err(|_| AudioError::LockPoisoned {
            component: "synthetic backend".to_string(),
        })?;
        *slot = Some(detector);
        self.state.running.store(true, Ordering::SeqCst);
        tracing::debug!("[SyntheticBackend] Started");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        // Taking the slot lock waits out any feed in progress.
        let mut slot = self.state.detector.lock().map_err(|_| AudioError::LockPoisoned {
            component: "synthetic backend".to_string(),
        })?;
        self.state.running.store(false, Ordering::SeqCst);
        *slot = None;
        tracing::debug!("[SyntheticBackend] Stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    fn feeder(&self) -> Option<SyntheticFeeder> {
        Some(SyntheticFeeder {
            state: Arc::clone(&self.state),
        })
    }
}

/// Pushes samples into a running synthetic backend
#[derive(Clone)]
pub struct SyntheticFeeder {
    state: Arc<FeedState>,
}

impl SyntheticFeeder {
    /// Feed f32 samples; returns the strikes they produced
    ///
    /// A no-op (empty result) while the backend is stopped.
    pub fn feed(&self, samples: &[f32]) -> Result<Vec<StrikeEvent>, AudioError> {
        let slot = self.state.detector.lock().map_err(|_| AudioError::LockPoisoned {
            component: "synthetic backend".to_string(),
        })?;
        match slot.as_ref() {
            Some(detector) if self.state.running.load(Ordering::SeqCst) => {
                Ok(lock_detector(detector)?.process_samples(samples))
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Feed Int16 PCM
    pub fn feed_i16(&self, samples: &[i16]) -> Result<Vec<StrikeEvent>, AudioError> {
        let slot = self.state.detector.lock().map_err(|_| AudioError::LockPoisoned {
            component: "synthetic backend".to_string(),
        })?;
        match slot.as_ref() {
            Some(detector) if self.state.running.load(Ordering::SeqCst) => {
                Ok(lock_detector(detector)?.process_pcm_i16(samples))
            }
            _ => Ok(Vec::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }
}
