// Error types for the putt detector
//
// This module defines custom error types for audio capture and sound-profile
// operations, providing structured error handling with stable numeric codes.

mod audio;
mod profile;

pub use audio::{log_audio_error, AudioError, AudioErrorCodes};
pub use profile::{log_profile_error, ProfileError, ProfileErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the library and its command-line front end.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
