//! EngineHandle: owned detector instance plus its capture backend.
//!
//! Each handle is fully independent: its own detector, its own backend and its
//! own telemetry channel. Lifecycle calls are tolerant of UI-driven races:
//! starting a running engine and stopping a stopped one are no-ops.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::analysis::{
    BroadcastListener, DetectorStats, StrikeDetector, StrikeEvent, StrikeListener,
};
use crate::audio::metronome::BeatSource;
use crate::config::{ConfigPatch, ConfigWarning, DetectorConfig};
use crate::engine::backend::{
    create_backend, lock_detector, BackendKind, CaptureBackend, SharedDetector, SyntheticFeeder,
};
use crate::error::{log_audio_error, AudioError};
use crate::profiles::ProfileStore;

/// Lifecycle event published on the telemetry channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineEvent {
    /// Milliseconds since the handle was created
    pub timestamp_ms: u64,
    pub kind: EngineEventKind,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineEventKind {
    Started { backend: String },
    Stopped,
    Reset,
    ParamsUpdated { warnings: usize },
    Warning,
}

/// EngineHandle orchestrates one detector and its capture backend.
pub struct EngineHandle {
    detector: SharedDetector,
    backend: Mutex<Box<dyn CaptureBackend>>,
    telemetry_tx: broadcast::Sender<EngineEvent>,
    start_instant: Instant,
}

impl EngineHandle {
    /// Create a handle with a fresh detector and the backend selected by `kind`
    pub fn new(config: DetectorConfig, kind: &BackendKind) -> Self {
        Self::from_parts(StrikeDetector::new(config), create_backend(kind))
    }

    /// Create a handle around an existing detector and backend
    pub fn from_parts(detector: StrikeDetector, backend: Box<dyn CaptureBackend>) -> Self {
        let (telemetry_tx, _) = broadcast::channel(128);
        tracing::debug!("[EngineHandle] Created with {} backend", backend.name());
        Self {
            detector: Arc::new(Mutex::new(detector)),
            backend: Mutex::new(backend),
            telemetry_tx,
            start_instant: Instant::now(),
        }
    }

    fn lock_backend(&self) -> Result<MutexGuard<'_, Box<dyn CaptureBackend>>, AudioError> {
        self.backend.lock().map_err(|_| AudioError::LockPoisoned {
            component: "backend".to_string(),
        })
    }

    fn emit_event(&self, kind: EngineEventKind, detail: Option<String>) {
        let timestamp_ms = self.start_instant.elapsed().as_millis() as u64;
        let _ = self.telemetry_tx.send(EngineEvent {
            timestamp_ms,
            kind,
            detail,
        });
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Reset all adaptive state and start capture.
    ///
    /// Already running: no-op. Capture failures (permission, missing device)
    /// are returned as is.
    pub fn start(&self) -> Result<(), AudioError> {
        let mut backend = self.lock_backend()?;
        if backend.is_running() {
            tracing::debug!("[EngineHandle] start() while running; ignoring");
            return Ok(());
        }

        lock_detector(&self.detector)?.reset();
        backend.start(Arc::clone(&self.detector)).map_err(|err| {
            log_audio_error(&err, "engine_start");
            self.emit_event(EngineEventKind::Warning, Some(err.to_string()));
            err
        })?;

        tracing::info!("[EngineHandle] Started ({} backend)", backend.name());
        self.emit_event(
            EngineEventKind::Started {
                backend: backend.name().to_string(),
            },
            None,
        );
        Ok(())
    }

    /// Stop capture; no callbacks fire after this returns. No-op when stopped.
    pub fn stop(&self) -> Result<(), AudioError> {
        let mut backend = self.lock_backend()?;
        if !backend.is_running() {
            // A backend whose worker died still needs its resources released.
            backend.stop()?;
            return Ok(());
        }
        backend.stop()?;
        tracing::info!("[EngineHandle] Stopped");
        self.emit_event(EngineEventKind::Stopped, None);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.lock_backend()
            .map(|backend| backend.is_running())
            .unwrap_or(false)
    }

    /// Clear baseline, event state and debounce timer
    pub fn reset(&self) -> Result<(), AudioError> {
        lock_detector(&self.detector)?.reset();
        self.emit_event(EngineEventKind::Reset, None);
        Ok(())
    }

    // ========================================================================
    // PARAMETERS & DIAGNOSTICS
    // ========================================================================

    /// Apply a partial config; takes effect at the next frame boundary
    pub fn update_params(&self, patch: &ConfigPatch) -> Result<Vec<ConfigWarning>, AudioError> {
        let warnings = lock_detector(&self.detector)?.update_params(patch);
        let detail = (!warnings.is_empty()).then(|| {
            warnings
                .iter()
                .map(|w| w.field.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        });
        self.emit_event(
            EngineEventKind::ParamsUpdated {
                warnings: warnings.len(),
            },
            detail,
        );
        Ok(warnings)
    }

    pub fn set_sensitivity(&self, sensitivity: f32) -> Result<(f32, f32), AudioError> {
        Ok(lock_detector(&self.detector)?.set_sensitivity(sensitivity))
    }

    pub fn stats(&self) -> Result<DetectorStats, AudioError> {
        Ok(lock_detector(&self.detector)?.stats())
    }

    pub fn config(&self) -> Result<DetectorConfig, AudioError> {
        Ok(lock_detector(&self.detector)?.config().clone())
    }

    // ========================================================================
    // COLLABORATORS & OBSERVERS
    // ========================================================================

    pub fn set_beat_source(&self, beats: Option<Arc<dyn BeatSource>>) -> Result<(), AudioError> {
        lock_detector(&self.detector)?.set_beat_source(beats);
        Ok(())
    }

    pub fn set_profile_store(
        &self,
        store: Option<Arc<dyn ProfileStore>>,
    ) -> Result<(), AudioError> {
        lock_detector(&self.detector)?.set_profile_store(store);
        Ok(())
    }

    /// Register a synchronous strike observer
    pub fn subscribe<L: StrikeListener + 'static>(&self, listener: L) -> Result<(), AudioError> {
        lock_detector(&self.detector)?.subscribe(listener);
        Ok(())
    }

    /// Strikes as a broadcast stream
    pub fn subscribe_strikes(
        &self,
        capacity: usize,
    ) -> Result<broadcast::Receiver<StrikeEvent>, AudioError> {
        let (listener, rx) = BroadcastListener::new(capacity);
        self.subscribe(listener)?;
        Ok(rx)
    }

    pub fn subscribe_telemetry(&self) -> broadcast::Receiver<EngineEvent> {
        self.telemetry_tx.subscribe()
    }

    /// Sample feeder when the backend is caller-fed
    pub fn synthetic_feeder(&self) -> Option<SyntheticFeeder> {
        self.lock_backend().ok().and_then(|backend| backend.feeder())
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        if let Ok(backend) = self.backend.get_mut() {
            let _ = backend.stop();
        }
    }
}
