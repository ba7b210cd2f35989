//! Policy engine: pitch-class verification with confirmation and debounce.
//!
//! Each tick the engine reduces the aggregated notes to an octave-invariant
//! pitch-class set, applies the selected verification policy against the
//! expected chord, and runs the result through two smoothing mechanisms:
//! a confirmation counter (`frames_confirm` consecutive passes before a
//! `Match`) and a miss cooldown (at most one `Miss` per `miss_cooldown_ms`).
//! The two stack deliberately: tuning one without the other biases toward
//! either jitter or lag.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::config::VerifierConfig;
use crate::transcribe::NoteEvent;
use crate::verdict::Verdict;
use crate::verify::chord::ChordSpec;
use crate::verify::pitch::PitchClass;

/// Verification policy applied to the detected pitch-class set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchPolicy {
    /// Pass when at least `k` of the expected pitch classes are present
    #[serde(rename = "K_OF_N")]
    KOfN,
    /// Pass when the root pitch class is present
    #[serde(rename = "INCLUDES_TARGET")]
    IncludesTarget,
    /// `KOfN`, and the lowest detected note must be the root
    #[serde(rename = "BASS_PRIORITY")]
    BassPriority,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        MatchPolicy::KOfN
    }
}

/// Where the engine is in its confirmation cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyPhase {
    /// No expected chord yet
    Idle,
    /// Expected chord set, awaiting the first passing tick
    Armed,
    /// At least one pass accrued toward confirmation
    Confirming,
    /// Just matched; passes accrue toward the next confirmation cycle
    Cooldown,
}

/// Pitch-class verification engine, owned by the inference worker
pub struct PolicyEngine {
    policy: MatchPolicy,
    frames_confirm: u32,
    miss_cooldown_ms: u64,
    salience_threshold: f32,
    transpose_semitones: i32,
    accept_inversions: bool,

    spec: Option<ChordSpec>,
    phase: PolicyPhase,
    confirm_count: u32,
    last_match_at: Option<f64>,
    last_miss_at: Option<f64>,
}

impl PolicyEngine {
    pub fn from_config(config: &VerifierConfig) -> Self {
        Self {
            policy: config.policy,
            frames_confirm: config.frames_confirm,
            miss_cooldown_ms: config.miss_cooldown_ms,
            salience_threshold: config.effective_salience_threshold(),
            transpose_semitones: config.transpose_semitones,
            accept_inversions: config.accept_inversions,
            spec: None,
            phase: PolicyPhase::Idle,
            confirm_count: 0,
            last_match_at: None,
            last_miss_at: None,
        }
    }

    /// Replace the verification target and reset the confirmation cycle.
    ///
    /// The miss cooldown clock is deliberately left running so a target
    /// switch mid-sustain cannot double the miss rate.
    pub fn set_expected(&mut self, spec: ChordSpec) {
        self.spec = Some(spec);
        self.phase = PolicyPhase::Armed;
        self.confirm_count = 0;
        self.last_match_at = None;
    }

    pub fn phase(&self) -> PolicyPhase {
        self.phase
    }

    pub fn expected(&self) -> Option<&ChordSpec> {
        self.spec.as_ref()
    }

    /// Evaluate one tick of aggregated notes at session time `t` seconds.
    ///
    /// Returns a `Match` or `Miss` verdict when one is due, `None` while
    /// confirming or inside the miss cooldown. Before the first
    /// `set_expected` the engine is idle and emits nothing.
    pub fn evaluate(&mut self, notes: &[NoteEvent], t: f64) -> Option<Verdict> {
        let spec = self.spec.as_ref()?;

        let filtered: Vec<&NoteEvent> = notes
            .iter()
            .filter(|n| n.salience >= self.salience_threshold)
            .collect();

        let pc_set: BTreeSet<PitchClass> = filtered
            .iter()
            .map(|n| PitchClass::from_midi(n.midi + self.transpose_semitones))
            .collect();
        let lowest_pc = filtered
            .iter()
            .min_by_key(|n| n.midi)
            .map(|n| PitchClass::from_midi(n.midi + self.transpose_semitones));

        let matched: BTreeSet<PitchClass> = spec.pcs.intersection(&pc_set).copied().collect();
        let missing: BTreeSet<PitchClass> = spec.pcs.difference(&pc_set).copied().collect();

        let root = spec.effective_root();
        let mut pass = match self.policy {
            MatchPolicy::KOfN => matched.len() >= spec.k,
            MatchPolicy::IncludesTarget => root.is_some_and(|r| pc_set.contains(&r)),
            MatchPolicy::BassPriority => matched.len() >= spec.k && lowest_pc == root,
        };
        if !self.accept_inversions {
            pass = pass && lowest_pc == root;
        }

        if pass {
            self.confirm_count += 1;
            if self.confirm_count >= self.frames_confirm {
                // at most one match per frames_confirm consecutive passes
                self.confirm_count = 0;
                self.phase = PolicyPhase::Cooldown;
                self.last_match_at = Some(t);
                return Some(Verdict::Match { t });
            }
            self.phase = PolicyPhase::Confirming;
            None
        } else {
            self.confirm_count = 0;
            self.phase = PolicyPhase::Armed;
            let due = self
                .last_miss_at
                .is_none_or(|prev| (t - prev) * 1000.0 >= self.miss_cooldown_ms as f64);
            if due {
                self.last_miss_at = Some(t);
                Some(Verdict::Miss {
                    t,
                    matched,
                    missing,
                })
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pc(v: u8) -> PitchClass {
        PitchClass::new(v).unwrap()
    }

    fn pcs(values: &[u8]) -> BTreeSet<PitchClass> {
        values.iter().map(|&v| pc(v)).collect()
    }

    fn note(midi: i32, salience: f32) -> NoteEvent {
        NoteEvent {
            midi,
            start_time: 0.0,
            end_time: None,
            salience,
        }
    }

    fn engine() -> PolicyEngine {
        PolicyEngine::from_config(&VerifierConfig::default())
    }

    fn e_minor() -> ChordSpec {
        ChordSpec::new([pc(4), pc(7), pc(11)], 2, Some(pc(4))).unwrap()
    }

    // E3 + G3 + B3
    fn e_minor_notes() -> Vec<NoteEvent> {
        vec![note(52, 0.8), note(55, 0.8), note(59, 0.8)]
    }

    #[test]
    fn test_idle_before_first_expected() {
        let mut engine = engine();
        assert_eq!(engine.phase(), PolicyPhase::Idle);
        assert_eq!(engine.evaluate(&e_minor_notes(), 0.0), None);
    }

    #[test]
    fn test_match_requires_frames_confirm_passes() {
        let mut engine = engine();
        engine.set_expected(e_minor());

        assert_eq!(engine.evaluate(&e_minor_notes(), 0.00), None);
        assert_eq!(engine.phase(), PolicyPhase::Confirming);
        assert_eq!(engine.evaluate(&e_minor_notes(), 0.04), None);
        let verdict = engine.evaluate(&e_minor_notes(), 0.08);
        assert_eq!(verdict, Some(Verdict::Match { t: 0.08 }));
        assert_eq!(engine.phase(), PolicyPhase::Cooldown);
    }

    #[test]
    fn test_one_match_per_confirmation_cycle() {
        let mut engine = engine();
        engine.set_expected(e_minor());

        let mut matches = 0;
        for i in 0..9 {
            if let Some(Verdict::Match { .. }) = engine.evaluate(&e_minor_notes(), i as f64 * 0.04)
            {
                matches += 1;
            }
        }
        // 9 consecutive passes, 3 per confirmation cycle
        assert_eq!(matches, 3);
    }

    #[test]
    fn test_failed_tick_resets_confirmation() {
        let mut engine = engine();
        engine.set_expected(e_minor());

        assert_eq!(engine.evaluate(&e_minor_notes(), 0.00), None);
        assert_eq!(engine.evaluate(&e_minor_notes(), 0.04), None);
        // silence breaks the streak
        let miss = engine.evaluate(&[], 0.08);
        assert!(matches!(miss, Some(Verdict::Miss { .. })));
        // two more passes are not enough; a full streak is needed again
        assert_eq!(engine.evaluate(&e_minor_notes(), 0.12), None);
        assert_eq!(engine.evaluate(&e_minor_notes(), 0.16), None);
        assert!(matches!(
            engine.evaluate(&e_minor_notes(), 0.20),
            Some(Verdict::Match { .. })
        ));
    }

    #[test]
    fn test_partial_match_reports_matched_and_missing() {
        let mut engine = engine();
        engine.set_expected(e_minor());

        // E3 + G3 only: {4, 7} matched, {11} missing; k = 2 passes, so play
        // it against k = 3 to force the miss
        let mut strict = PolicyEngine::from_config(&VerifierConfig::default());
        strict.set_expected(ChordSpec::new([pc(4), pc(7), pc(11)], 3, Some(pc(4))).unwrap());
        let verdict = strict.evaluate(&[note(52, 0.8), note(55, 0.8)], 0.0);
        match verdict {
            Some(Verdict::Miss { matched, missing, .. }) => {
                assert_eq!(matched, pcs(&[4, 7]));
                assert_eq!(missing, pcs(&[11]));
            }
            other => panic!("expected Miss, got {:?}", other),
        }
    }

    #[test]
    fn test_miss_partition_covers_spec() {
        let mut engine = engine();
        engine.set_expected(ChordSpec::new([pc(0), pc(4), pc(9)], 3, None).unwrap());
        // sustained E minor against an A minor target
        let verdict = engine.evaluate(&e_minor_notes(), 0.0);
        match verdict {
            Some(Verdict::Miss { matched, missing, .. }) => {
                assert_eq!(matched, pcs(&[4]));
                assert_eq!(missing, pcs(&[0, 9]));
                let union: BTreeSet<PitchClass> = matched.union(&missing).copied().collect();
                assert_eq!(union, pcs(&[0, 4, 9]));
                assert!(matched.intersection(&missing).next().is_none());
            }
            other => panic!("expected Miss, got {:?}", other),
        }
    }

    #[test]
    fn test_miss_cooldown_spacing() {
        let mut engine = engine();
        engine.set_expected(e_minor());

        let mut miss_times = Vec::new();
        for i in 0..20 {
            let t = i as f64 * 0.04;
            if let Some(Verdict::Miss { t, .. }) = engine.evaluate(&[], t) {
                miss_times.push(t);
            }
        }
        assert!(miss_times.len() >= 2);
        for pair in miss_times.windows(2) {
            assert!((pair[1] - pair[0]) * 1000.0 >= 250.0 - 1e-9);
        }
    }

    #[test]
    fn test_salience_filter_drops_weak_notes() {
        let mut engine = engine();
        engine.set_expected(e_minor());

        // all below the 0.2 default threshold: counts as silence
        let weak = vec![note(52, 0.1), note(55, 0.1), note(59, 0.1)];
        assert!(matches!(
            engine.evaluate(&weak, 0.0),
            Some(Verdict::Miss { .. })
        ));
    }

    #[test]
    fn test_octave_invariance() {
        let mut engine = engine();
        engine.set_expected(e_minor());

        // one octave up: E4 + G4 + B4
        let up = vec![note(64, 0.8), note(67, 0.8), note(71, 0.8)];
        engine.evaluate(&up, 0.00);
        engine.evaluate(&up, 0.04);
        assert!(matches!(
            engine.evaluate(&up, 0.08),
            Some(Verdict::Match { .. })
        ));
    }

    #[test]
    fn test_single_note_k1_matches_iff_present() {
        let mut engine = engine();
        engine.set_expected(ChordSpec::new([pc(4)], 1, None).unwrap());

        for t in 0..3 {
            engine.evaluate(&[note(52, 0.9)], t as f64 * 0.04);
        }
        // reset and check absence
        engine.set_expected(ChordSpec::new([pc(4)], 1, None).unwrap());
        assert!(matches!(
            engine.evaluate(&[note(55, 0.9)], 1.0),
            Some(Verdict::Miss { .. })
        ));
    }

    #[test]
    fn test_transpose_capo() {
        let mut config = VerifierConfig::default();
        config.transpose_semitones = 2;
        let mut engine = PolicyEngine::from_config(&config);
        // expected C major, played D major two frets down the capo
        engine.set_expected(ChordSpec::new([pc(0), pc(4), pc(7)], 2, None).unwrap());

        // D3 + F#3 + A3
        let d_major = vec![note(50, 0.8), note(54, 0.8), note(57, 0.8)];
        engine.evaluate(&d_major, 0.00);
        engine.evaluate(&d_major, 0.04);
        assert!(matches!(
            engine.evaluate(&d_major, 0.08),
            Some(Verdict::Match { .. })
        ));
    }

    #[test]
    fn test_inversion_rejected_when_disallowed() {
        let mut config = VerifierConfig::default();
        config.accept_inversions = false;
        let mut engine = PolicyEngine::from_config(&config);
        engine.set_expected(ChordSpec::new([pc(0), pc(4), pc(7)], 3, Some(pc(0))).unwrap());

        // C major over a G bass: G2 + C3 + E3
        let inverted = vec![note(43, 0.8), note(48, 0.8), note(52, 0.8)];
        for i in 0..5 {
            let verdict = engine.evaluate(&inverted, i as f64);
            match verdict {
                Some(Verdict::Miss { matched, missing, .. }) => {
                    // every pitch class is present; only the bass is wrong
                    assert_eq!(matched, pcs(&[0, 4, 7]));
                    assert!(missing.is_empty());
                }
                None => {} // inside cooldown
                other => panic!("expected Miss or cooldown, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_root_position_accepted_when_inversions_disallowed() {
        let mut config = VerifierConfig::default();
        config.accept_inversions = false;
        let mut engine = PolicyEngine::from_config(&config);
        engine.set_expected(ChordSpec::new([pc(0), pc(4), pc(7)], 3, Some(pc(0))).unwrap());

        // C3 + E3 + G3
        let rooted = vec![note(48, 0.8), note(52, 0.8), note(55, 0.8)];
        engine.evaluate(&rooted, 0.00);
        engine.evaluate(&rooted, 0.04);
        assert!(matches!(
            engine.evaluate(&rooted, 0.08),
            Some(Verdict::Match { .. })
        ));
    }

    #[test]
    fn test_includes_target_policy() {
        let mut config = VerifierConfig::default();
        config.policy = MatchPolicy::IncludesTarget;
        let mut engine = PolicyEngine::from_config(&config);
        engine.set_expected(e_minor());

        // only the root, nothing else from the chord
        let just_root = vec![note(52, 0.9)];
        engine.evaluate(&just_root, 0.00);
        engine.evaluate(&just_root, 0.04);
        assert!(matches!(
            engine.evaluate(&just_root, 0.08),
            Some(Verdict::Match { .. })
        ));
    }

    #[test]
    fn test_bass_priority_policy() {
        let mut config = VerifierConfig::default();
        config.policy = MatchPolicy::BassPriority;
        let mut engine = PolicyEngine::from_config(&config);
        engine.set_expected(ChordSpec::new([pc(0), pc(4), pc(7)], 2, Some(pc(0))).unwrap());

        // correct pitch classes but G in the bass: fails
        let inverted = vec![note(43, 0.8), note(48, 0.8), note(52, 0.8)];
        assert!(matches!(
            engine.evaluate(&inverted, 0.0),
            Some(Verdict::Miss { .. })
        ));

        // root in the bass: passes
        engine.set_expected(ChordSpec::new([pc(0), pc(4), pc(7)], 2, Some(pc(0))).unwrap());
        let rooted = vec![note(48, 0.8), note(52, 0.8), note(55, 0.8)];
        engine.evaluate(&rooted, 1.00);
        engine.evaluate(&rooted, 1.04);
        assert!(matches!(
            engine.evaluate(&rooted, 1.08),
            Some(Verdict::Match { .. })
        ));
    }

    #[test]
    fn test_set_expected_resets_confirmation() {
        let mut engine = engine();
        engine.set_expected(e_minor());

        // two passes accrued, then the target switches mid-sustain
        engine.evaluate(&e_minor_notes(), 0.00);
        engine.evaluate(&e_minor_notes(), 0.04);
        engine.set_expected(ChordSpec::new([pc(0), pc(4), pc(9)], 2, Some(pc(9))).unwrap());
        assert_eq!(engine.phase(), PolicyPhase::Armed);

        // the stale passes must not count toward the new target: sustained
        // E minor misses A minor with {4} matched
        let verdict = engine.evaluate(&e_minor_notes(), 0.08);
        match verdict {
            Some(Verdict::Miss { matched, missing, .. }) => {
                assert_eq!(matched, pcs(&[4]));
                assert_eq!(missing, pcs(&[0, 9]));
            }
            other => panic!("expected Miss, got {:?}", other),
        }
    }

    #[test]
    fn test_set_expected_idempotent() {
        let mut a = engine();
        let mut b = engine();
        a.set_expected(e_minor());
        b.set_expected(e_minor());
        b.set_expected(e_minor());

        for i in 0..4 {
            let t = i as f64 * 0.04;
            assert_eq!(a.evaluate(&e_minor_notes(), t), b.evaluate(&e_minor_notes(), t));
        }
    }

    #[test]
    fn test_silence_never_matches() {
        let mut engine = engine();
        engine.set_expected(e_minor());
        for i in 0..50 {
            let verdict = engine.evaluate(&[], i as f64 * 0.04);
            assert!(!matches!(verdict, Some(Verdict::Match { .. })));
        }
    }
}
