// Sound profile error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Profile error code constants
///
/// Error code range: 2001-2005
pub struct ProfileErrorCodes;

impl ProfileErrorCodes {
    /// Not enough recordings were collected to build a template
    pub const INSUFFICIENT_RECORDINGS: i32 = 2001;

    /// A recording contained no analysable audio
    pub const EMPTY_RECORDING: i32 = 2002;

    /// A stored template has the wrong number of bins
    pub const TEMPLATE_SIZE: i32 = 2003;

    /// Reading or writing the profile library failed
    pub const IO: i32 = 2004;

    /// The profile library is not valid JSON
    pub const PARSE: i32 = 2005;
}

/// Log a profile error with structured context
pub fn log_profile_error(err: &ProfileError, context: &str) {
    error!(
        "Profile error in {}: code={}, component=ProfileLibrary, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors raised while recording, loading or saving sound profiles
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileError {
    /// Insufficient recordings collected for a template
    InsufficientRecordings { required: usize, collected: usize },

    /// Recording was empty or silent
    EmptyRecording,

    /// Template length does not match the fingerprint size
    TemplateSize { expected: usize, actual: usize },

    /// Filesystem error
    Io { details: String },

    /// JSON decoding error
    Parse { details: String },
}

impl ErrorCode for ProfileError {
    fn code(&self) -> i32 {
        match self {
            ProfileError::InsufficientRecordings { .. } => {
                ProfileErrorCodes::INSUFFICIENT_RECORDINGS
            }
            ProfileError::EmptyRecording => ProfileErrorCodes::EMPTY_RECORDING,
            ProfileError::TemplateSize { .. } => ProfileErrorCodes::TEMPLATE_SIZE,
            ProfileError::Io { .. } => ProfileErrorCodes::IO,
            ProfileError::Parse { .. } => ProfileErrorCodes::PARSE,
        }
    }

    fn message(&self) -> String {
        match self {
            ProfileError::InsufficientRecordings {
                required,
                collected,
            } => {
                format!(
                    "Insufficient recordings: need {}, got {}",
                    required, collected
                )
            }
            ProfileError::EmptyRecording => "Recording contains no audible signal".to_string(),
            ProfileError::TemplateSize { expected, actual } => {
                format!(
                    "Spectral template must have {} bins (got {})",
                    expected, actual
                )
            }
            ProfileError::Io { details } => format!("Profile library I/O failed: {}", details),
            ProfileError::Parse { details } => {
                format!("Profile library is malformed: {}", details)
            }
        }
    }
}

impl fmt::Display for ProfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ProfileError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for ProfileError {}

impl From<std::io::Error> for ProfileError {
    fn from(err: std::io::Error) -> Self {
        ProfileError::Io {
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ProfileError {
    fn from(err: serde_json::Error) -> Self {
        ProfileError::Parse {
            details: err.to_string(),
        }
    }
}
