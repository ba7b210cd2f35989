//! Chord specifications: the verification target.
//!
//! A [`ChordSpec`] names the pitch classes the caller expects, how many of
//! them must be present (`k`), and optionally which one is the root. Specs
//! are passed by value and replaced atomically via
//! `ChordVerifier::set_expected`; they are validated at the call site so an
//! invalid spec never reaches the worker.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::error::ConfigError;
use crate::verify::pitch::PitchClass;

/// The current verification target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChordSpec {
    /// Expected pitch classes (unique, at least one)
    pub pcs: BTreeSet<PitchClass>,
    /// How many expected pitch classes must be detected (1..=|pcs|)
    pub k: usize,
    /// Root pitch class, when the caller distinguishes inversions
    pub root: Option<PitchClass>,
}

impl ChordSpec {
    /// Build a spec with an explicit `k`
    pub fn new(
        pcs: impl IntoIterator<Item = PitchClass>,
        k: usize,
        root: Option<PitchClass>,
    ) -> Result<Self, ConfigError> {
        let spec = Self {
            pcs: pcs.into_iter().collect(),
            k,
            root,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Build a spec with the default `k = min(2, |pcs|)` used for triads
    pub fn with_default_k(
        pcs: impl IntoIterator<Item = PitchClass>,
        root: Option<PitchClass>,
    ) -> Result<Self, ConfigError> {
        let pcs: BTreeSet<PitchClass> = pcs.into_iter().collect();
        let k = pcs.len().min(2);
        Self::new(pcs, k, root)
    }

    /// Check the target invariants: non-empty set, `1 <= k <= |pcs|`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pcs.is_empty() {
            return Err(ConfigError::EmptyChord);
        }
        if self.k == 0 || self.k > self.pcs.len() {
            return Err(ConfigError::KOutOfRange {
                k: self.k,
                n: self.pcs.len(),
            });
        }
        Ok(())
    }

    /// The root if set, otherwise the lowest-numbered pitch class in the set
    pub fn effective_root(&self) -> Option<PitchClass> {
        self.root.or_else(|| self.pcs.iter().next().copied())
    }

    /// Parse a chord argument: a name from the built-in table ("Em", "C"),
    /// or a comma-separated list of pitch classes ("4,7,11" or "E,G,B")
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let input = input.trim();
        if let Some(spec) = COMMON_CHORDS.get(input) {
            return Ok(spec.clone());
        }
        let pcs = input
            .split(',')
            .map(|tok| tok.parse::<PitchClass>())
            .collect::<Result<Vec<_>, _>>()?;
        let root = pcs.first().copied();
        Self::with_default_k(pcs, root)
    }
}

fn pc(v: u8) -> PitchClass {
    PitchClass::new(v).expect("pitch class constant in range")
}

fn triad(root: u8, third: u8, fifth: u8) -> ChordSpec {
    ChordSpec {
        pcs: [pc(root), pc(third), pc(fifth)].into_iter().collect(),
        k: 2,
        root: Some(pc(root)),
    }
}

/// Built-in open-position chord table used by the CLI and tests
pub static COMMON_CHORDS: Lazy<BTreeMap<&'static str, ChordSpec>> = Lazy::new(|| {
    let mut m = BTreeMap::new();
    m.insert("C", triad(0, 4, 7));
    m.insert("D", triad(2, 6, 9));
    m.insert("E", triad(4, 8, 11));
    m.insert("F", triad(5, 9, 0));
    m.insert("G", triad(7, 11, 2));
    m.insert("A", triad(9, 1, 4));
    m.insert("B", triad(11, 3, 6));
    m.insert("Cm", triad(0, 3, 7));
    m.insert("Dm", triad(2, 5, 9));
    m.insert("Em", triad(4, 7, 11));
    m.insert("Fm", triad(5, 8, 0));
    m.insert("Gm", triad(7, 10, 2));
    m.insert("Am", triad(9, 0, 4));
    m.insert("Bm", triad(11, 2, 6));
    m
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty() {
        let spec = ChordSpec {
            pcs: BTreeSet::new(),
            k: 1,
            root: None,
        };
        assert_eq!(spec.validate(), Err(ConfigError::EmptyChord));
    }

    #[test]
    fn test_validate_rejects_k_out_of_range() {
        let spec = ChordSpec::new([pc(0), pc(4), pc(7)], 4, None);
        assert!(matches!(
            spec,
            Err(ConfigError::KOutOfRange { k: 4, n: 3 })
        ));
        assert!(ChordSpec::new([pc(0)], 0, None).is_err());
    }

    #[test]
    fn test_default_k() {
        let triad = ChordSpec::with_default_k([pc(0), pc(4), pc(7)], None).unwrap();
        assert_eq!(triad.k, 2);
        let single = ChordSpec::with_default_k([pc(4)], None).unwrap();
        assert_eq!(single.k, 1);
    }

    #[test]
    fn test_duplicates_collapse() {
        let spec = ChordSpec::new([pc(4), pc(4), pc(7)], 2, None).unwrap();
        assert_eq!(spec.pcs.len(), 2);
    }

    #[test]
    fn test_effective_root_fallback() {
        let spec = ChordSpec::new([pc(7), pc(4), pc(11)], 2, None).unwrap();
        // lowest-numbered pitch class, not insertion order
        assert_eq!(spec.effective_root(), Some(pc(4)));
        let rooted = ChordSpec::new([pc(7), pc(4), pc(11)], 2, Some(pc(7))).unwrap();
        assert_eq!(rooted.effective_root(), Some(pc(7)));
    }

    #[test]
    fn test_parse_named_chord() {
        let em = ChordSpec::parse("Em").unwrap();
        assert_eq!(
            em.pcs.iter().map(|p| p.value()).collect::<Vec<_>>(),
            vec![4, 7, 11]
        );
        assert_eq!(em.root, Some(pc(4)));
        assert_eq!(em.k, 2);
    }

    #[test]
    fn test_parse_pitch_class_list() {
        let spec = ChordSpec::parse("4,7,11").unwrap();
        assert_eq!(spec.pcs.len(), 3);
        assert_eq!(spec.root, Some(pc(4)));

        let named = ChordSpec::parse("E,G,B").unwrap();
        assert_eq!(named.pcs, spec.pcs);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ChordSpec::parse("").is_err());
        assert!(ChordSpec::parse("X,Y").is_err());
    }
}
