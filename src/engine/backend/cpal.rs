//! CPAL-based capture backend for desktop platforms (Linux, macOS, Windows)
//!
//! A worker thread opens the input stream, owns it for its whole lifetime and
//! drives the detector from the buffer pool. The capture callback only copies
//! the first channel into pooled buffers. `stop` clears the running flag and
//! joins the worker, which drops the stream before exiting, so no frame
//! reaches the detector after `stop` returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ::cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::audio::buffer_pool::{
    AnalysisChannels, BufferPool, CaptureChannels, DEFAULT_BUFFER_COUNT, DEFAULT_BUFFER_SIZE,
};
use crate::audio::frame::i16_sample_to_f32;
use crate::config::ConfigPatch;
use crate::error::{log_audio_error, AudioError};

use super::{lock_detector, CaptureBackend, SharedDetector};

/// Sleep between polls of an empty data queue
const IDLE_POLL: Duration = Duration::from_millis(2);

pub struct CpalBackend {
    device_name: Option<String>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl CpalBackend {
    /// `device_name` selects an input device by name; `None` uses the default
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

impl CpalBackend {
    /// Join a worker whose analysis loop already exited (lock poisoning)
    fn reap_finished_worker(&mut self) {
        if let Some(finished) = self.worker.take() {
            self.running.store(false, Ordering::Release);
            if finished.join().is_err() {
                tracing::warn!("[CpalBackend] Previous capture thread panicked");
            }
        }
    }
}

fn find_device(device_name: Option<&str>) -> Result<::cpal::Device, AudioError> {
    let host = ::cpal::default_host();
    match device_name {
        None => host.default_input_device().ok_or(AudioError::NoInputDevice),
        Some(name) => {
            let devices = host.input_devices().map_err(|e| AudioError::HardwareError {
                details: format!("Failed to enumerate input devices: {}", e),
            })?;
            for device in devices {
                if device.name().map(|n| n == name).unwrap_or(false) {
                    return Ok(device);
                }
            }
            Err(AudioError::NoInputDevice)
        }
    }
}

fn map_build_error(err: ::cpal::BuildStreamError) -> AudioError {
    match err {
        ::cpal::BuildStreamError::DeviceNotAvailable => AudioError::NoInputDevice,
        ::cpal::BuildStreamError::StreamConfigNotSupported => AudioError::UnsupportedFormat {
            format: "stream config".to_string(),
        },
        other => {
            let reason = other.to_string();
            if reason.to_lowercase().contains("permission") {
                AudioError::PermissionDenied
            } else {
                AudioError::StreamOpenFailed { reason }
            }
        }
    }
}

/// Open and start the input stream; returns it with the device sample rate
fn open_stream(
    device_name: Option<&str>,
    mut capture: CaptureChannels,
) -> Result<(::cpal::Stream, u32), AudioError> {
    let device = find_device(device_name)?;
    let config = device
        .default_input_config()
        .map_err(|e| AudioError::StreamOpenFailed {
            reason: format!("Failed to get default input config: {}", e),
        })?;

    let stream_config: ::cpal::StreamConfig = config.clone().into();
    let channels = stream_config.channels as usize;
    let sample_rate = stream_config.sample_rate.0;

    let err_fn = |err| tracing::error!("[CpalBackend] Input stream error: {}", err);

    let stream = match config.sample_format() {
        ::cpal::SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &::cpal::InputCallbackInfo| {
                capture.push_block(data, channels, |s| s);
            },
            err_fn,
            None,
        ),
        ::cpal::SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &::cpal::InputCallbackInfo| {
                capture.push_block(data, channels, i16_sample_to_f32);
            },
            err_fn,
            None,
        ),
        other => {
            return Err(AudioError::UnsupportedFormat {
                format: format!("{:?}", other),
            })
        }
    }
    .map_err(map_build_error)?;

    stream.play().map_err(|e| AudioError::HardwareError {
        details: format!("Input start failed: {}", e),
    })?;

    Ok((stream, sample_rate))
}

/// Match the detector to the device rate, keeping the frame duration
fn align_sample_rate(detector: &SharedDetector, device_rate: u32) -> Result<(), AudioError> {
    let mut guard = lock_detector(detector)?;
    let config = guard.config();
    if config.sample_rate == device_rate {
        return Ok(());
    }
    let frame_ms = config.frame_ms();
    let frame_length = ((device_rate as f64 * frame_ms / 1000.0).round() as usize).max(1);
    tracing::info!(
        "[CpalBackend] Device runs at {} Hz; reconfiguring detector ({} samples/frame)",
        device_rate,
        frame_length
    );
    guard.update_params(&ConfigPatch {
        sample_rate: Some(device_rate),
        frame_length: Some(frame_length),
        ..ConfigPatch::default()
    });
    Ok(())
}

fn analysis_loop(detector: &SharedDetector, mut analysis: AnalysisChannels, running: &AtomicBool) {
    while running.load(Ordering::Acquire) {
        match analysis.data_consumer.pop() {
            Ok(buffer) => {
                match lock_detector(detector) {
                    Ok(mut guard) => {
                        guard.process_samples(&buffer);
                    }
                    Err(err) => {
                        log_audio_error(&err, "cpal_analysis");
                        running.store(false, Ordering::Release);
                    }
                }
                let _ = analysis.pool_producer.push(buffer);
            }
            Err(_) => thread::sleep(IDLE_POLL),
        }
    }
}

impl CaptureBackend for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn start(&mut self, detector: SharedDetector) -> Result<(), AudioError> {
        if self.is_running() {
            return Ok(());
        }
        self.reap_finished_worker();

        let (capture, analysis) = BufferPool::new(DEFAULT_BUFFER_COUNT, DEFAULT_BUFFER_SIZE).split();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<u32, AudioError>>();
        let running = Arc::clone(&self.running);
        let device_name = self.device_name.clone();
        running.store(true, Ordering::Release);

        let worker = thread::Builder::new()
            .name("putt-capture".to_string())
            .spawn(move || {
                let (stream, rate) = match open_stream(device_name.as_deref(), capture) {
                    Ok(opened) => opened,
                    Err(err) => {
                        running.store(false, Ordering::Release);
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                if let Err(err) = align_sample_rate(&detector, rate) {
                    running.store(false, Ordering::Release);
                    let _ = ready_tx.send(Err(err));
                    return;
                }
                let _ = ready_tx.send(Ok(rate));
                analysis_loop(&detector, analysis, &running);
                drop(stream);
                tracing::debug!("[CpalBackend] Capture thread exiting");
            })
            .map_err(|e| AudioError::HardwareError {
                details: format!("Failed to spawn capture thread: {}", e),
            })?;

        match ready_rx.recv() {
            Ok(Ok(rate)) => {
                tracing::info!("[CpalBackend] Capturing at {} Hz", rate);
                self.worker = Some(worker);
                Ok(())
            }
            Ok(Err(err)) => {
                let _ = worker.join();
                log_audio_error(&err, "cpal_start");
                Err(err)
            }
            Err(_) => {
                self.running.store(false, Ordering::Release);
                let _ = worker.join();
                Err(AudioError::StreamFailure {
                    reason: "capture thread exited during start".to_string(),
                })
            }
        }
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            worker.join().map_err(|_| AudioError::StreamFailure {
                reason: "capture thread panicked".to_string(),
            })?;
            tracing::info!("[CpalBackend] Stopped");
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.worker.is_some() && self.running.load(Ordering::Acquire)
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
