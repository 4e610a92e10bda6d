//! EngineHandle lifecycle with the synthetic backend
//!
//! The synthetic backend is fed from the test thread, so strikes surface
//! deterministically both as return values and on the broadcast stream.

use putt_detector::engine::EngineEventKind;
use putt_detector::{AudioError, BackendKind, ConfigPatch, DetectorConfig, EngineHandle};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const FRAME: usize = 441;

fn audio_with_strike(frames: usize, strike_frame: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..frames * FRAME)
        .map(|n| {
            if n / FRAME == strike_frame {
                rng.gen_range(-0.2..0.2)
            } else {
                rng.gen_range(-0.01..0.01)
            }
        })
        .collect()
}

fn synthetic_engine() -> EngineHandle {
    EngineHandle::new(DetectorConfig::default(), &BackendKind::Synthetic)
}

#[test]
fn strikes_reach_broadcast_subscribers() {
    let engine = synthetic_engine();
    let mut strikes = engine.subscribe_strikes(16).unwrap();
    engine.start().unwrap();

    let feeder = engine.synthetic_feeder().expect("synthetic feeder");
    let returned = feeder.feed(&audio_with_strike(100, 60, 1)).unwrap();

    assert_eq!(returned.len(), 1);
    assert_eq!(strikes.try_recv().unwrap(), returned[0]);
    assert_eq!(engine.stats().unwrap().strike_count, 1);
}

#[tokio::test]
async fn strikes_can_be_awaited() {
    let engine = synthetic_engine();
    let mut strikes = engine.subscribe_strikes(16).unwrap();
    engine.start().unwrap();
    engine
        .synthetic_feeder()
        .unwrap()
        .feed(&audio_with_strike(100, 60, 2))
        .unwrap();

    let strike = strikes.recv().await.unwrap();
    assert!((strike.timestamp_ms - 600.0).abs() < 1e-6);
}

#[test]
fn nothing_is_processed_after_stop() {
    let engine = synthetic_engine();
    let feeder = engine.synthetic_feeder().unwrap();
    engine.start().unwrap();
    feeder.feed(&audio_with_strike(20, 99, 3)).unwrap();
    engine.stop().unwrap();

    let frames = engine.stats().unwrap().frame_count;
    assert!(feeder
        .feed(&audio_with_strike(100, 60, 4))
        .unwrap()
        .is_empty());
    assert_eq!(engine.stats().unwrap().frame_count, frames);
    assert!(!feeder.is_running());
}

#[test]
fn restart_clears_adaptive_state() {
    let engine = synthetic_engine();
    let feeder = engine.synthetic_feeder().unwrap();
    engine.start().unwrap();
    feeder.feed(&audio_with_strike(100, 60, 5)).unwrap();
    assert!(engine.stats().unwrap().thresholds.high.is_some());

    engine.stop().unwrap();
    engine.start().unwrap();
    let stats = engine.stats().unwrap();
    assert_eq!(stats.frame_count, 0);
    assert_eq!(stats.strike_count, 0);
    assert_eq!(stats.thresholds.high, None);
}

#[test]
fn permission_denied_is_distinguishable() {
    let engine = EngineHandle::new(DetectorConfig::default(), &BackendKind::SyntheticDenied);
    let mut telemetry = engine.subscribe_telemetry();

    let err = engine.start().unwrap_err();
    assert_eq!(err, AudioError::PermissionDenied);
    assert!(!engine.is_running());
    assert_eq!(telemetry.try_recv().unwrap().kind, EngineEventKind::Warning);
}

#[test]
fn engines_are_independent() {
    let first = synthetic_engine();
    let second = synthetic_engine();
    first.start().unwrap();
    second.start().unwrap();

    first
        .synthetic_feeder()
        .unwrap()
        .feed(&audio_with_strike(100, 60, 6))
        .unwrap();
    second
        .synthetic_feeder()
        .unwrap()
        .feed(&audio_with_strike(30, 99, 7))
        .unwrap();

    assert_eq!(first.stats().unwrap().strike_count, 1);
    assert_eq!(first.stats().unwrap().frame_count, 100);
    assert_eq!(second.stats().unwrap().strike_count, 0);
    assert_eq!(second.stats().unwrap().frame_count, 30);
}

#[test]
fn params_apply_while_running() {
    let engine = synthetic_engine();
    engine.start().unwrap();
    let (high, low) = engine.set_sensitivity(0.5).unwrap();
    assert!((high - 5.5).abs() < 1e-5);
    assert!(low >= 1.0 && low <= high);

    let warnings = engine
        .update_params(&ConfigPatch {
            debounce_ms: Some(400.0),
            zone_width: Some(2.0),
            ..ConfigPatch::default()
        })
        .unwrap();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].field, "zone_width");

    let config = engine.config().unwrap();
    assert_eq!(config.debounce_ms, 400.0);
    assert_eq!(config.zone_width, 1.0);
    assert!(engine.is_running());
}
