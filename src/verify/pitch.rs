//! Pitch-class and MIDI arithmetic.
//!
//! A pitch class is the residue of a MIDI number modulo 12 and identifies a
//! note letter regardless of octave. All chord verification is performed on
//! pitch-class sets, so a chord played an octave higher than scored still
//! matches.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Semitones per octave
pub const SEMITONES: u8 = 12;

/// MIDI number of A4 (the tuning reference)
pub const MIDI_A4: i32 = 69;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// A pitch class in 0..=11 (C..B)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct PitchClass(u8);

impl PitchClass {
    /// Construct from a raw value, rejecting anything outside 0..=11
    pub fn new(value: u8) -> Result<Self, ConfigError> {
        if value < SEMITONES {
            Ok(Self(value))
        } else {
            Err(ConfigError::PitchClassInvalid {
                value: value as i32,
            })
        }
    }

    /// Reduce a MIDI number to its pitch class
    ///
    /// Uses euclidean remainder so negative inputs (possible after a large
    /// downward transpose) still land in 0..=11.
    pub fn from_midi(midi: i32) -> Self {
        Self(midi.rem_euclid(SEMITONES as i32) as u8)
    }

    /// Raw value in 0..=11
    pub fn value(self) -> u8 {
        self.0
    }

    /// Note-letter name with sharps ("C", "C#", ..., "B")
    pub fn name(self) -> &'static str {
        NOTE_NAMES[self.0 as usize]
    }
}

impl TryFrom<u8> for PitchClass {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PitchClass> for u8 {
    fn from(pc: PitchClass) -> u8 {
        pc.0
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for PitchClass {
    type Err = ConfigError;

    /// Parse a note name ("E", "F#", "Bb") or a numeric pitch class ("4")
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(value) = s.parse::<u8>() {
            return Self::new(value);
        }

        let mut chars = s.chars();
        let letter = chars.next().ok_or(ConfigError::PitchClassInvalid { value: -1 })?;
        let base: i32 = match letter.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(ConfigError::PitchClassInvalid { value: -1 }),
        };
        let accidental: i32 = match chars.next() {
            None => 0,
            Some('#') => 1,
            Some('b') => -1,
            Some(_) => return Err(ConfigError::PitchClassInvalid { value: -1 }),
        };
        if chars.next().is_some() {
            return Err(ConfigError::PitchClassInvalid { value: -1 });
        }
        Ok(Self::from_midi(base + accidental))
    }
}

/// Frequency of a (possibly fractional) MIDI number at tuning reference `a4_hz`
pub fn midi_to_hz(midi: f64, a4_hz: f64) -> f64 {
    a4_hz * ((midi - MIDI_A4 as f64) / 12.0).exp2()
}

/// Fractional MIDI number of a frequency at tuning reference `a4_hz`
pub fn hz_to_midi(hz: f64, a4_hz: f64) -> f64 {
    MIDI_A4 as f64 + 12.0 * (hz / a4_hz).log2()
}
