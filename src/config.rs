//! Configuration management for the verification pipeline
//!
//! This module provides runtime configuration loading from JSON files,
//! enabling tuning of the tick cadence, smoothing, and policy parameters
//! without recompilation. Every field has a serde default so partial config
//! files work.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::ConfigError;
use crate::verify::policy::MatchPolicy;

/// Complete pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Rolling window length fed to the adapter, seconds
    pub window_sec: f64,
    /// Scheduler period, milliseconds
    pub tick_ms: u64,
    /// Adapter input length in samples (fixed by the model)
    pub model_window_samples: usize,
    /// Resampler target rate, Hz (fixed by the model)
    pub model_sample_rate: u32,
    /// Consecutive passing ticks required to emit `Match`
    pub frames_confirm: u32,
    /// Minimum interval between `Miss` emissions, milliseconds
    pub miss_cooldown_ms: u64,
    /// Minimum salience for a note to count toward the pitch-class set
    pub salience_threshold: f32,
    /// Detune tolerance in cents; when set, overrides `salience_threshold`
    /// via a fixed lookup (≤25 → 0.4, ≤50 → 0.3, else 0.2)
    pub cents_tol: Option<u32>,
    /// Added to detected MIDI before pitch-class reduction (capo support)
    pub transpose_semitones: i32,
    /// When false, the lowest detected note must be the chord root
    pub accept_inversions: bool,
    /// Verification policy
    pub policy: MatchPolicy,
    /// Length of the aggregator tick history (clamped to 3..=5)
    pub aggregator_max_len: usize,
    /// Lowest acceptable fundamental, Hz (E2; widen to 73.42 for dropped tunings)
    pub min_f0_hz: f64,
    /// Highest acceptable fundamental, Hz (E6)
    pub max_f0_hz: f64,
    /// Tuning reference
    pub a4_hz: f64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            window_sec: 1.3,
            tick_ms: 40,
            model_window_samples: crate::transcribe::MODEL_WINDOW_SAMPLES,
            model_sample_rate: crate::transcribe::MODEL_SAMPLE_RATE,
            frames_confirm: 3,
            miss_cooldown_ms: 250,
            salience_threshold: 0.2,
            cents_tol: None,
            transpose_semitones: 0,
            accept_inversions: true,
            policy: MatchPolicy::KOfN,
            aggregator_max_len: 5,
            min_f0_hz: 82.41,
            max_f0_hz: 1318.51,
            a4_hz: 440.0,
        }
    }
}

impl VerifierConfig {
    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.window_sec > 0.0) || !self.window_sec.is_finite() {
            return Err(ConfigError::WindowInvalid {
                window_sec: self.window_sec,
            });
        }
        if self.tick_ms == 0 {
            return Err(ConfigError::TickInvalid {
                tick_ms: self.tick_ms,
            });
        }
        if !(0.0..=1.0).contains(&self.salience_threshold) {
            return Err(ConfigError::ThresholdInvalid {
                threshold: self.salience_threshold,
            });
        }
        if !(self.min_f0_hz > 0.0) || self.min_f0_hz >= self.max_f0_hz {
            return Err(ConfigError::RangeInvalid {
                min_f0_hz: self.min_f0_hz,
                max_f0_hz: self.max_f0_hz,
            });
        }
        Ok(())
    }

    /// The salience threshold the policy engine actually applies.
    ///
    /// `cents_tol` is not a true pitch tolerance; it is repurposed as a
    /// salience threshold through this lookup for compatibility with
    /// existing callers.
    pub fn effective_salience_threshold(&self) -> f32 {
        match self.cents_tol {
            Some(cents) if cents <= 25 => 0.4,
            Some(cents) if cents <= 50 => 0.3,
            Some(_) => 0.2,
            None => self.salience_threshold,
        }
    }

    /// Rolling window length in samples at the device rate
    pub fn window_samples(&self, device_rate: u32) -> usize {
        (self.window_sec * device_rate as f64).ceil() as usize
    }

    /// Ring capacity: the window plus half a second of overwrite slack
    pub fn ring_capacity(&self, device_rate: u32) -> usize {
        ((self.window_sec + 0.5) * device_rate as f64).ceil() as usize
    }

    /// Load configuration from a JSON file, falling back to defaults with a
    /// warning if the file is missing or malformed.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = VerifierConfig::default();
        assert_eq!(config.window_sec, 1.3);
        assert_eq!(config.tick_ms, 40);
        assert_eq!(config.model_window_samples, 43844);
        assert_eq!(config.model_sample_rate, 22050);
        assert_eq!(config.frames_confirm, 3);
        assert_eq!(config.miss_cooldown_ms, 250);
        assert_eq!(config.policy, MatchPolicy::KOfN);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_window_sizing() {
        let config = VerifierConfig::default();
        assert_eq!(config.window_samples(48000), 62400);
        assert_eq!(config.window_samples(44100), 57330);
        assert_eq!(config.ring_capacity(48000), 86400);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = VerifierConfig::default();
        config.window_sec = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::WindowInvalid { .. })
        ));

        let mut config = VerifierConfig::default();
        config.tick_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TickInvalid { .. })
        ));

        let mut config = VerifierConfig::default();
        config.salience_threshold = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ThresholdInvalid { .. })
        ));

        let mut config = VerifierConfig::default();
        config.min_f0_hz = 2000.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::RangeInvalid { .. })
        ));
    }

    #[test]
    fn test_cents_tolerance_lookup() {
        let mut config = VerifierConfig::default();
        assert_eq!(config.effective_salience_threshold(), 0.2);
        config.cents_tol = Some(25);
        assert_eq!(config.effective_salience_threshold(), 0.4);
        config.cents_tol = Some(50);
        assert_eq!(config.effective_salience_threshold(), 0.3);
        config.cents_tol = Some(100);
        assert_eq!(config.effective_salience_threshold(), 0.2);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = VerifierConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: VerifierConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.window_sec, config.window_sec);
        assert_eq!(parsed.policy, config.policy);
        assert_eq!(parsed.aggregator_max_len, config.aggregator_max_len);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let parsed: VerifierConfig =
            serde_json::from_str(r#"{"tick_ms": 20, "policy": "BASS_PRIORITY"}"#).unwrap();
        assert_eq!(parsed.tick_ms, 20);
        assert_eq!(parsed.policy, MatchPolicy::BassPriority);
        assert_eq!(parsed.window_sec, 1.3);
    }
}
