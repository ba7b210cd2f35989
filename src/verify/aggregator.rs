// TemporalAggregator - short-history fusion of per-tick detections
//
// Averaging salience over the last few ticks stabilizes transient
// detections and damps single-frame false positives; the added latency is
// bounded by max_len * tick_ms.

use std::collections::{BTreeMap, VecDeque};

use crate::transcribe::NoteEvent;

/// Bounds for the retained tick history
pub const MIN_HISTORY: usize = 3;
pub const MAX_HISTORY: usize = 5;

struct Fused {
    salience_sum: f32,
    count: u32,
    start_time: f64,
    end_time: Option<f64>,
}

/// Bounded FIFO of recent tick note lists, fused by MIDI key
pub struct TemporalAggregator {
    history: VecDeque<Vec<NoteEvent>>,
    max_len: usize,
}

impl TemporalAggregator {
    /// `max_len` is clamped to 3..=5
    pub fn new(max_len: usize) -> Self {
        let max_len = max_len.clamp(MIN_HISTORY, MAX_HISTORY);
        Self {
            history: VecDeque::with_capacity(max_len + 1),
            max_len,
        }
    }

    /// Append one tick's detections and return the fused view: one note per
    /// MIDI key across the retained history, salience averaged over the
    /// occurrences.
    pub fn push(&mut self, notes: Vec<NoteEvent>) -> Vec<NoteEvent> {
        self.history.push_back(notes);
        if self.history.len() > self.max_len {
            self.history.pop_front();
        }

        let mut fused: BTreeMap<i32, Fused> = BTreeMap::new();
        for tick in &self.history {
            for note in tick {
                fused
                    .entry(note.midi)
                    .and_modify(|f| {
                        f.salience_sum += note.salience;
                        f.count += 1;
                        if note.start_time < f.start_time {
                            f.start_time = note.start_time;
                        }
                        f.end_time = match (f.end_time, note.end_time) {
                            (Some(a), Some(b)) => Some(a.max(b)),
                            _ => None,
                        };
                    })
                    .or_insert(Fused {
                        salience_sum: note.salience,
                        count: 1,
                        start_time: note.start_time,
                        end_time: note.end_time,
                    });
            }
        }

        fused
            .into_iter()
            .map(|(midi, f)| NoteEvent {
                midi,
                start_time: f.start_time,
                end_time: f.end_time,
                salience: f.salience_sum / f.count as f32,
            })
            .collect()
    }

    /// Retained tick count (at most `max_len`)
    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Drop all retained ticks
    pub fn clear(&mut self) {
        self.history.clear();
    }
}
