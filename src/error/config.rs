// Configuration and chord specification errors
//
// These are rejected at the call site with no state change: an invalid
// config never reaches the worker, an invalid chord never replaces the
// current target.

use crate::error::ErrorCode;
use std::fmt;

/// Error code range: 1301-1307
pub const CODE_EMPTY_CHORD: i32 = 1301;
pub const CODE_K_OUT_OF_RANGE: i32 = 1302;
pub const CODE_WINDOW_INVALID: i32 = 1303;
pub const CODE_TICK_INVALID: i32 = 1304;
pub const CODE_THRESHOLD_INVALID: i32 = 1305;
pub const CODE_RANGE_INVALID: i32 = 1306;
pub const CODE_PITCH_CLASS_INVALID: i32 = 1307;

/// Validation errors for [`crate::VerifierConfig`] and [`crate::ChordSpec`]
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Chord spec has no pitch classes
    EmptyChord,

    /// `k` outside `1..=|pcs|`
    KOutOfRange { k: usize, n: usize },

    /// Non-positive window length
    WindowInvalid { window_sec: f64 },

    /// Non-positive tick period
    TickInvalid { tick_ms: u64 },

    /// Salience threshold outside [0, 1]
    ThresholdInvalid { threshold: f32 },

    /// Inverted or non-positive f0 range
    RangeInvalid { min_f0_hz: f64, max_f0_hz: f64 },

    /// Pitch class outside 0..=11
    PitchClassInvalid { value: i32 },
}

impl ErrorCode for ConfigError {
    fn code(&self) -> i32 {
        match self {
            ConfigError::EmptyChord => CODE_EMPTY_CHORD,
            ConfigError::KOutOfRange { .. } => CODE_K_OUT_OF_RANGE,
            ConfigError::WindowInvalid { .. } => CODE_WINDOW_INVALID,
            ConfigError::TickInvalid { .. } => CODE_TICK_INVALID,
            ConfigError::ThresholdInvalid { .. } => CODE_THRESHOLD_INVALID,
            ConfigError::RangeInvalid { .. } => CODE_RANGE_INVALID,
            ConfigError::PitchClassInvalid { .. } => CODE_PITCH_CLASS_INVALID,
        }
    }

    fn message(&self) -> String {
        match self {
            ConfigError::EmptyChord => {
                "Chord spec must contain at least one pitch class".to_string()
            }
            ConfigError::KOutOfRange { k, n } => {
                format!("k must be in 1..={} (got {})", n, k)
            }
            ConfigError::WindowInvalid { window_sec } => {
                format!("window_sec must be positive (got {})", window_sec)
            }
            ConfigError::TickInvalid { tick_ms } => {
                format!("tick_ms must be positive (got {})", tick_ms)
            }
            ConfigError::ThresholdInvalid { threshold } => {
                format!("salience threshold must be in [0, 1] (got {})", threshold)
            }
            ConfigError::RangeInvalid {
                min_f0_hz,
                max_f0_hz,
            } => {
                format!(
                    "f0 range must satisfy 0 < min < max (got {}..{})",
                    min_f0_hz, max_f0_hz
                )
            }
            ConfigError::PitchClassInvalid { value } => {
                format!("pitch class must be in 0..=11 (got {})", value)
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConfigError (code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for ConfigError {}
