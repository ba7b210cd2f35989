// Audio error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Error code range: 1101-1107
pub const CODE_PERMISSION_DENIED: i32 = 1101;
pub const CODE_DEVICE_UNAVAILABLE: i32 = 1102;
pub const CODE_STREAM_OPEN_FAILED: i32 = 1103;
pub const CODE_ALREADY_RUNNING: i32 = 1104;
pub const CODE_NOT_RUNNING: i32 = 1105;
pub const CODE_STREAM_FAILURE: i32 = 1106;
pub const CODE_LOCK_POISONED: i32 = 1107;

/// Log an audio error with structured context
///
/// Logs the error code, component, and message in one line so host-side
/// log scrapers can key on the code. Non-blocking, never panics.
pub fn log_audio_error(err: &AudioError, context: &str) {
    error!(
        "Audio error in {}: code={}, component=Capture, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Audio-related errors
///
/// These errors cover device acquisition, capture stream management, and
/// controller lifecycle misuse.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    /// Microphone permission refused by the host
    PermissionDenied,

    /// No input device, or the device was lost mid-session
    DeviceUnavailable { details: String },

    /// Failed to open or start the capture stream
    StreamOpenFailed { reason: String },

    /// Verifier is already listening
    AlreadyRunning,

    /// Verifier is not listening
    NotRunning,

    /// Stream or channel failed unexpectedly
    StreamFailure { reason: String },

    /// Mutex was poisoned
    LockPoisoned { component: String },
}

impl AudioError {
    /// Whether the error ends the session (fatal errors drive status to `Error`)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AudioError::PermissionDenied | AudioError::DeviceUnavailable { .. }
        )
    }
}

impl ErrorCode for AudioError {
    fn code(&self) -> i32 {
        match self {
            AudioError::PermissionDenied => CODE_PERMISSION_DENIED,
            AudioError::DeviceUnavailable { .. } => CODE_DEVICE_UNAVAILABLE,
            AudioError::StreamOpenFailed { .. } => CODE_STREAM_OPEN_FAILED,
            AudioError::AlreadyRunning => CODE_ALREADY_RUNNING,
            AudioError::NotRunning => CODE_NOT_RUNNING,
            AudioError::StreamFailure { .. } => CODE_STREAM_FAILURE,
            AudioError::LockPoisoned { .. } => CODE_LOCK_POISONED,
        }
    }

    fn message(&self) -> String {
        match self {
            AudioError::PermissionDenied => {
                "Microphone permission denied. Please grant microphone access.".to_string()
            }
            AudioError::DeviceUnavailable { details } => {
                format!("Audio device unavailable: {}", details)
            }
            AudioError::StreamOpenFailed { reason } => {
                format!("Failed to open capture stream: {}", reason)
            }
            AudioError::AlreadyRunning => {
                "Verifier already listening. Call stop() first.".to_string()
            }
            AudioError::NotRunning => "Verifier not listening. Call start() first.".to_string(),
            AudioError::StreamFailure { reason } => {
                format!("Capture stream failed: {}", reason)
            }
            AudioError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
        }
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AudioError (code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for AudioError {}
