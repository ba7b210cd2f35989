//! Chord verification: pitch-class arithmetic, chord targets, temporal
//! aggregation, and the policy decision engine.

pub mod aggregator;
pub mod chord;
pub mod pitch;
pub mod policy;

pub use aggregator::TemporalAggregator;
pub use chord::ChordSpec;
pub use pitch::PitchClass;
pub use policy::{MatchPolicy, PolicyEngine, PolicyPhase};
