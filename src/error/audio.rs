// Audio capture error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Audio error code constants
///
/// Single source of truth for the numeric codes reported by [`AudioError`].
///
/// Error code range: 1001-1008
pub struct AudioErrorCodes;

impl AudioErrorCodes {
    /// Microphone permission denied by the platform
    pub const PERMISSION_DENIED: i32 = 1001;

    /// No capture device is available
    pub const NO_INPUT_DEVICE: i32 = 1002;

    /// Failed to open the capture stream
    pub const STREAM_OPEN_FAILED: i32 = 1003;

    /// Capture device only offers a sample format we cannot convert
    pub const UNSUPPORTED_FORMAT: i32 = 1004;

    /// Capture stream failed or its channel closed unexpectedly
    pub const STREAM_FAILURE: i32 = 1005;

    /// Mutex/RwLock was poisoned
    pub const LOCK_POISONED: i32 = 1006;

    /// Sample rate reported by the device is unusable
    pub const INVALID_SAMPLE_RATE: i32 = 1007;

    /// Hardware or OS level failure
    pub const HARDWARE_ERROR: i32 = 1008;
}

/// Log an audio error with structured context
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_audio_error(err: &AudioError, context: &str) {
    error!(
        "Audio error in {}: code={}, component=Capture, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Audio capture errors
///
/// `start()` surfaces these so that an unavailable microphone fails fast and
/// distinguishably instead of silently producing no frames.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    /// Microphone permission denied
    PermissionDenied,

    /// No default input device found
    NoInputDevice,

    /// Failed to open audio stream
    StreamOpenFailed { reason: String },

    /// Device sample format is not convertible to f32
    UnsupportedFormat { format: String },

    /// Stream channel disconnected unexpectedly
    StreamFailure { reason: String },

    /// Mutex/RwLock was poisoned
    LockPoisoned { component: String },

    /// Sample rate is zero or otherwise unusable
    InvalidSampleRate { rate: u32 },

    /// Hardware error occurred
    HardwareError { details: String },
}

impl ErrorCode for AudioError {
    fn code(&self) -> i32 {
        match self {
            AudioError::PermissionDenied => AudioErrorCodes::PERMISSION_DENIED,
            AudioError::NoInputDevice => AudioErrorCodes::NO_INPUT_DEVICE,
            AudioError::StreamOpenFailed { .. } => AudioErrorCodes::STREAM_OPEN_FAILED,
            AudioError::UnsupportedFormat { .. } => AudioErrorCodes::UNSUPPORTED_FORMAT,
            AudioError::StreamFailure { .. } => AudioErrorCodes::STREAM_FAILURE,
            AudioError::LockPoisoned { .. } => AudioErrorCodes::LOCK_POISONED,
            AudioError::InvalidSampleRate { .. } => AudioErrorCodes::INVALID_SAMPLE_RATE,
            AudioError::HardwareError { .. } => AudioErrorCodes::HARDWARE_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            AudioError::PermissionDenied => {
                "Microphone permission denied. Please grant microphone access.".to_string()
            }
            AudioError::NoInputDevice => "No audio input device available".to_string(),
            AudioError::StreamOpenFailed { reason } => {
                format!("Failed to open audio stream: {}", reason)
            }
            AudioError::UnsupportedFormat { format } => {
                format!("Unsupported capture sample format: {}", format)
            }
            AudioError::StreamFailure { reason } => {
                format!("Audio stream failed: {}", reason)
            }
            AudioError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
            AudioError::InvalidSampleRate { rate } => {
                format!("Sample rate must be greater than 0 (got {})", rate)
            }
            AudioError::HardwareError { details } => {
                format!("Hardware error: {}", details)
            }
        }
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AudioError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for AudioError {}

impl From<std::io::Error> for AudioError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            return AudioError::PermissionDenied;
        }
        AudioError::HardwareError {
            details: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_error_codes() {
        assert_eq!(
            AudioError::PermissionDenied.code(),
            AudioErrorCodes::PERMISSION_DENIED
        );
        assert_eq!(
            AudioError::NoInputDevice.code(),
            AudioErrorCodes::NO_INPUT_DEVICE
        );
        assert_eq!(
            AudioError::StreamOpenFailed {
                reason: "test".to_string()
            }
            .code(),
            AudioErrorCodes::STREAM_OPEN_FAILED
        );
        assert_eq!(
            AudioError::UnsupportedFormat {
                format: "U8".to_string()
            }
            .code(),
            1004
        );
        assert_eq!(
            AudioError::LockPoisoned {
                component: "test".to_string()
            }
            .code(),
            AudioErrorCodes::LOCK_POISONED
        );
        assert_eq!(AudioError::InvalidSampleRate { rate: 0 }.code(), 1007);
    }

    #[test]
    fn test_audio_error_messages() {
        let err = AudioError::PermissionDenied;
        assert!(err.message().contains("permission denied"));

        let err = AudioError::InvalidSampleRate { rate: 0 };
        assert_eq!(err.message(), "Sample rate must be greater than 0 (got 0)");

        let err = AudioError::HardwareError {
            details: "test error".to_string(),
        };
        assert_eq!(err.message(), "Hardware error: test error");
    }

    #[test]
    fn test_audio_error_display() {
        let err = AudioError::NoInputDevice;
        let display = format!("{}", err);
        assert!(display.contains("AudioError"));
        assert!(display.contains(&err.code().to_string()));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::other("test io error");
        match AudioError::from(io_err) {
            AudioError::HardwareError { details } => {
                assert!(details.contains("test io error"));
            }
            other => panic!("Expected HardwareError, got {:?}", other),
        }

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(AudioError::from(denied), AudioError::PermissionDenied);
    }
}
