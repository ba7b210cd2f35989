//! Scripted transcriber: canned note lists with injectable latency.
//!
//! Lets scheduler and policy tests drive the full controller pipeline with
//! exact, audio-independent detections, including the inference-overrun
//! path (latency longer than the tick period).

use std::time::Duration;

use crate::error::AdapterError;
use crate::transcribe::{NoteEvent, Transcriber, MODEL_WINDOW_SAMPLES};

/// Transcriber returning a scripted sequence of note lists.
///
/// Each `evaluate` call returns the next entry; after the script is
/// exhausted the last entry repeats (a sustained detection). An empty
/// script always returns no notes.
pub struct ScriptedTranscriber {
    script: Vec<Vec<NoteEvent>>,
    cursor: usize,
    latency: Duration,
    fail_every: Option<usize>,
    calls: usize,
}

impl ScriptedTranscriber {
    pub fn new(script: Vec<Vec<NoteEvent>>) -> Self {
        Self {
            script,
            cursor: 0,
            latency: Duration::ZERO,
            fail_every: None,
            calls: 0,
        }
    }

    /// A transcriber that detects the same notes on every tick
    pub fn sustained(notes: Vec<NoteEvent>) -> Self {
        Self::new(vec![notes])
    }

    /// Sleep this long inside every `evaluate`, simulating model latency
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail every n-th call with `EvalFailed` (1-based), for error-path tests
    pub fn failing_every(mut self, n: usize) -> Self {
        self.fail_every = Some(n.max(1));
        self
    }

    /// Convenience: a sustained note at full salience
    pub fn note(midi: i32) -> NoteEvent {
        NoteEvent {
            midi,
            start_time: 0.0,
            end_time: None,
            salience: 0.9,
        }
    }
}

impl Transcriber for ScriptedTranscriber {
    fn evaluate(&mut self, samples: &[f32]) -> Result<Vec<NoteEvent>, AdapterError> {
        if samples.len() != MODEL_WINDOW_SAMPLES {
            return Err(AdapterError::InputLength {
                expected: MODEL_WINDOW_SAMPLES,
                actual: samples.len(),
            });
        }

        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        self.calls += 1;
        if let Some(n) = self.fail_every {
            if self.calls % n == 0 {
                return Err(AdapterError::EvalFailed {
                    reason: format!("scripted failure on call {}", self.calls),
                });
            }
        }

        if self.script.is_empty() {
            return Ok(Vec::new());
        }
        let entry = self.script[self.cursor.min(self.script.len() - 1)].clone();
        if self.cursor + 1 < self.script.len() {
            self.cursor += 1;
        }
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silent_window() -> Vec<f32> {
        vec![0.0; MODEL_WINDOW_SAMPLES]
    }

    #[test]
    fn test_sustained_repeats_last_entry() {
        let mut t = ScriptedTranscriber::sustained(vec![ScriptedTranscriber::note(52)]);
        let input = silent_window();
        for _ in 0..3 {
            let notes = t.evaluate(&input).unwrap();
            assert_eq!(notes.len(), 1);
            assert_eq!(notes[0].midi, 52);
        }
    }

    #[test]
    fn test_script_advances_then_holds() {
        let mut t = ScriptedTranscriber::new(vec![
            vec![],
            vec![ScriptedTranscriber::note(40)],
        ]);
        let input = silent_window();
        assert!(t.evaluate(&input).unwrap().is_empty());
        assert_eq!(t.evaluate(&input).unwrap()[0].midi, 40);
        assert_eq!(t.evaluate(&input).unwrap()[0].midi, 40);
    }

    #[test]
    fn test_enforces_window_length() {
        let mut t = ScriptedTranscriber::new(vec![]);
        assert!(matches!(
            t.evaluate(&[0.0; 10]),
            Err(AdapterError::InputLength { .. })
        ));
    }

    #[test]
    fn test_failing_every() {
        let mut t = ScriptedTranscriber::sustained(vec![]).failing_every(2);
        let input = silent_window();
        assert!(t.evaluate(&input).is_ok());
        assert!(t.evaluate(&input).is_err());
        assert!(t.evaluate(&input).is_ok());
        assert!(t.evaluate(&input).is_err());
    }
}
