// Error types for the chord verification core
//
// This module defines custom error types for audio, adapter, and chord/config
// operations, providing structured error handling with stable numeric codes
// for logging and host integration.

mod adapter;
mod audio;
mod config;

pub use adapter::AdapterError;
pub use audio::{log_audio_error, AudioError};
pub use config::ConfigError;

use std::fmt;

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling and
/// structured log lines across the crate.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}

/// Top-level error for controller operations that cross domains
///
/// `ChordVerifier::start` can fail in the audio layer (device acquisition)
/// or the adapter layer (model warm-up); `set_expected` can fail validation.
/// This enum carries whichever domain error occurred.
#[derive(Debug, Clone, PartialEq)]
pub enum VerifierError {
    Audio(AudioError),
    Adapter(AdapterError),
    Config(ConfigError),
}

impl ErrorCode for VerifierError {
    fn code(&self) -> i32 {
        match self {
            VerifierError::Audio(e) => e.code(),
            VerifierError::Adapter(e) => e.code(),
            VerifierError::Config(e) => e.code(),
        }
    }

    fn message(&self) -> String {
        match self {
            VerifierError::Audio(e) => e.message(),
            VerifierError::Adapter(e) => e.message(),
            VerifierError::Config(e) => e.message(),
        }
    }
}

impl fmt::Display for VerifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifierError::Audio(e) => write!(f, "{}", e),
            VerifierError::Adapter(e) => write!(f, "{}", e),
            VerifierError::Config(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for VerifierError {}

impl From<AudioError> for VerifierError {
    fn from(err: AudioError) -> Self {
        VerifierError::Audio(err)
    }
}

impl From<AdapterError> for VerifierError {
    fn from(err: AdapterError) -> Self {
        VerifierError::Adapter(err)
    }
}

impl From<ConfigError> for VerifierError {
    fn from(err: ConfigError) -> Self {
        VerifierError::Config(err)
    }
}
