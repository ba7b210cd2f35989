// Activation-to-note conversion
//
// Models report two grids over (frame, pitch-bin): sustained pitch
// activation and onset activation. Notes are contiguous active runs per
// pitch bin; an onset peak inside a run re-articulates it (closes the run
// and opens a new one), so a re-plucked string yields two events rather
// than one long one.

use crate::transcribe::NoteEvent;

/// Frame-level activation grids produced by a [`crate::transcribe::PitchModel`]
///
/// `frames[t][p]` is the sustained-pitch activation of MIDI note
/// `midi_low + p` at frame `t`; `onsets` has the same shape. Both grids hold
/// values in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct ActivationGrid {
    pub midi_low: i32,
    pub hop_seconds: f64,
    pub frames: Vec<Vec<f32>>,
    pub onsets: Vec<Vec<f32>>,
}

impl ActivationGrid {
    /// Number of pitch bins per frame
    pub fn bins(&self) -> usize {
        self.frames.first().map(|row| row.len()).unwrap_or(0)
    }
}

/// Thresholds for run extraction
#[derive(Debug, Clone)]
pub struct NoteExtractionConfig {
    /// Activation required to open a run
    pub frame_threshold: f32,
    /// Activation below which a run closes (hysteresis below `frame_threshold`)
    pub release_threshold: f32,
    /// Onset activation that re-articulates an open run
    pub onset_threshold: f32,
    /// Minimum run length in frames; shorter runs are discarded as flicker
    pub min_frames: usize,
}

impl Default for NoteExtractionConfig {
    fn default() -> Self {
        Self {
            frame_threshold: 0.25,
            release_threshold: 0.15,
            onset_threshold: 0.5,
            min_frames: 2,
        }
    }
}

/// Convert activation grids into note events.
///
/// One event per contiguous active run per pitch bin; salience is the run's
/// peak activation, clamped to [0, 1]. Runs still open at the grid edge get
/// `end_time: None`.
pub fn notes_from_grid(grid: &ActivationGrid, cfg: &NoteExtractionConfig) -> Vec<NoteEvent> {
    let mut notes = Vec::new();
    let bins = grid.bins();
    let total_frames = grid.frames.len();

    for p in 0..bins {
        let mut run_start: Option<usize> = None;
        let mut peak: f32 = 0.0;

        for t in 0..total_frames {
            let level = grid.frames[t][p];
            match run_start {
                None => {
                    if level >= cfg.frame_threshold {
                        run_start = Some(t);
                        peak = level;
                    }
                }
                Some(start) => {
                    if level < cfg.release_threshold {
                        push_run(&mut notes, grid, cfg, p, start, Some(t), peak);
                        run_start = None;
                        peak = 0.0;
                    } else {
                        // re-articulation: an onset inside an established run
                        if t > start
                            && t - start >= cfg.min_frames
                            && grid.onsets[t][p] >= cfg.onset_threshold
                        {
                            push_run(&mut notes, grid, cfg, p, start, Some(t), peak);
                            run_start = Some(t);
                            peak = level;
                        } else {
                            peak = peak.max(level);
                        }
                    }
                }
            }
        }

        if let Some(start) = run_start {
            push_run(&mut notes, grid, cfg, p, start, None, peak);
        }
    }

    notes.sort_by(|a, b| {
        a.start_time
            .partial_cmp(&b.start_time)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.midi.cmp(&b.midi))
    });
    notes
}

fn push_run(
    notes: &mut Vec<NoteEvent>,
    grid: &ActivationGrid,
    cfg: &NoteExtractionConfig,
    bin: usize,
    start: usize,
    end: Option<usize>,
    peak: f32,
) {
    let len = end.unwrap_or(grid.frames.len()) - start;
    if len < cfg.min_frames {
        return;
    }
    notes.push(NoteEvent {
        midi: grid.midi_low + bin as i32,
        start_time: start as f64 * grid.hop_seconds,
        end_time: end.map(|e| e as f64 * grid.hop_seconds),
        salience: peak.clamp(0.0, 1.0),
    });
}
