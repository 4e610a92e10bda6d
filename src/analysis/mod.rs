// Analysis module - acoustic strike detection pipeline
//
// Frames flow through the band filters, the adaptive thresholds and the event
// state machine in `detector`; the spectral matcher is consulted for
// candidates when profiles are available.
//
// Architecture:
// - filter: biquad stages and per-band chains
// - threshold: rolling median + k·MAD noise floor per band
// - gate: settle / beat-count / listening-zone suppression
// - spectral: fingerprints and profile matching
// - detector: StrikeDetector, the frame-synchronous state machine
//
// Output types and the observer trait live here so engine code and listeners
// do not depend on detector internals.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub mod detector;
pub mod filter;
pub mod gate;
pub mod spectral;
pub mod threshold;

pub use detector::StrikeDetector;
pub use spectral::ProfileMatch;

/// An accepted putter strike
///
/// Emitted once per accepted event, in stream order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrikeEvent {
    /// Event start on the stream clock (ms since the detector was built)
    pub timestamp_ms: f64,
    /// Peak high-band envelope during the event
    pub energy: f32,
    pub duration_ms: f32,
    /// Quality score in [0, 1]
    pub quality: f32,
    /// Set when a target profile forced acceptance
    pub profile_match: Option<ProfileMatch>,
}

/// A value per analysis band
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BandPair<T> {
    pub high: T,
    pub low: T,
}

/// Closed events that were not emitted, by reason
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionCounts {
    pub debounced: u64,
    pub too_long: u64,
    pub no_low_band: u64,
    pub near_tick: u64,
    pub ignored_profile: u64,
}

/// Idle frames on which each gate reason blocked onset testing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateCounts {
    pub settling: u64,
    pub awaiting_beats: u64,
    pub outside_zone: u64,
}

/// Snapshot of detector state for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorStats {
    /// Frames processed since the last reset
    pub frame_count: u64,
    /// Malformed frames dropped since the last reset
    pub skipped_frames: u64,
    pub strike_count: u64,
    pub envelopes: BandPair<f32>,
    /// `None` while a band is still warming up
    pub thresholds: BandPair<Option<f32>>,
    pub event_open: bool,
    pub rejections: RejectionCounts,
    pub gate_blocked: GateCounts,
    /// Configuration values clamped since construction
    pub config_warnings: u64,
}

/// Receives detector output synchronously, in frame-arrival order
///
/// Called from inside frame processing; implementations must not block.
pub trait StrikeListener: Send {
    fn on_strike(&mut self, event: &StrikeEvent);

    /// High-band envelope after every processed frame
    fn on_audio_level(&mut self, _level: f32) {}
}

impl<F> StrikeListener for F
where
    F: FnMut(&StrikeEvent) + Send,
{
    fn on_strike(&mut self, event: &StrikeEvent) {
        self(event)
    }
}

/// Forwards strikes (and optionally levels) to tokio broadcast channels
///
/// Sending never blocks; a send with no live receivers is dropped.
pub struct BroadcastListener {
    strikes: broadcast::Sender<StrikeEvent>,
    levels: Option<broadcast::Sender<f32>>,
}

impl BroadcastListener {
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<StrikeEvent>) {
        let (strikes, rx) = broadcast::channel(capacity.max(1));
        (
            Self {
                strikes,
                levels: None,
            },
            rx,
        )
    }

    /// Also publish audio levels
    pub fn with_levels(mut self, capacity: usize) -> (Self, broadcast::Receiver<f32>) {
        let (tx, rx) = broadcast::channel(capacity.max(1));
        self.levels = Some(tx);
        (self, rx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StrikeEvent> {
        self.strikes.subscribe()
    }
}

impl StrikeListener for BroadcastListener {
    fn on_strike(&mut self, event: &StrikeEvent) {
        let _ = self.strikes.send(event.clone());
    }

    fn on_audio_level(&mut self, level: f32) {
        if let Some(ref tx) = self.levels {
            let _ = tx.send(level);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strike(timestamp_ms: f64) -> StrikeEvent {
        StrikeEvent {
            timestamp_ms,
            energy: 0.1,
            duration_ms: 20.0,
            quality: 0.8,
            profile_match: None,
        }
    }

    #[test]
    fn test_closure_listener() {
        let mut seen = Vec::new();
        {
            let mut listener = |event: &StrikeEvent| seen.push(event.timestamp_ms);
            listener.on_strike(&strike(10.0));
            listener.on_audio_level(0.5);
            listener.on_strike(&strike(20.0));
        }
        assert_eq!(seen, vec![10.0, 20.0]);
    }

    #[test]
    fn test_broadcast_listener_forwards() {
        let (listener, mut strikes) = BroadcastListener::new(8);
        let (mut listener, mut levels) = listener.with_levels(8);
        listener.on_audio_level(0.25);
        listener.on_strike(&strike(42.0));
        assert_eq!(strikes.try_recv().unwrap().timestamp_ms, 42.0);
        assert_eq!(levels.try_recv().unwrap(), 0.25);
    }

    #[test]
    fn test_broadcast_without_receivers_does_not_fail() {
        let (mut listener, rx) = BroadcastListener::new(1);
        drop(rx);
        listener.on_strike(&strike(1.0));
    }

    #[test]
    fn test_strike_event_json_shape() {
        let json = serde_json::to_value(strike(5.0)).unwrap();
        assert_eq!(json["timestamp_ms"], 5.0);
        assert!(json["profile_match"].is_null());
    }
}
