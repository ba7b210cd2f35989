//! Verdict stream: the controller's only output.
//!
//! Every verdict carries `t`, seconds since session start, monotone within a
//! session. Verdicts are produced by the inference worker and fanned out
//! over a broadcast channel; nothing is persisted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::transcribe::NoteEvent;
use crate::verify::pitch::PitchClass;

/// Output event of the verification pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Verdict {
    /// One per completed inference; `inference_ms` is the measured adapter latency
    Tick { t: f64, inference_ms: f64 },

    /// Raw per-tick detections, before aggregation (optional consumer overlay)
    Notes { t: f64, notes: Vec<NoteEvent> },

    /// A confirmed chord match
    Match { t: f64 },

    /// A failed tick with diagnostic pitch-class sets
    ///
    /// `matched` and `missing` partition the expected chord's pitch classes:
    /// their union is the expected set and their intersection is empty.
    Miss {
        t: f64,
        matched: BTreeSet<PitchClass>,
        missing: BTreeSet<PitchClass>,
    },

    /// Recoverable or fatal failure; `message` is opaque to consumers
    Error { message: String },
}

impl Verdict {
    /// Timestamp of the verdict, if it carries one
    pub fn timestamp(&self) -> Option<f64> {
        match self {
            Verdict::Tick { t, .. }
            | Verdict::Notes { t, .. }
            | Verdict::Match { t }
            | Verdict::Miss { t, .. } => Some(*t),
            Verdict::Error { .. } => None,
        }
    }
}
