//! Polyphonic transcription adapter.
//!
//! The adapter is a capability: anything that can turn a fixed-length mono
//! window at the model rate into a list of note events is substitutable
//! behind [`Transcriber`]. The bundled [`ModelTranscriber`] runs a
//! [`PitchModel`] producing frame-level pitch and onset activations and
//! converts them to note events; the default model is the FFT
//! harmonic-salience model in [`spectral`], and a pretrained runtime can be
//! slotted in behind the same trait.

pub mod activation;
pub mod spectral;

use serde::{Deserialize, Serialize};

use crate::error::AdapterError;
pub use activation::{ActivationGrid, NoteExtractionConfig};
pub use spectral::SpectralPitchModel;

/// Sample rate the model was trained at
pub const MODEL_SAMPLE_RATE: u32 = 22050;

/// Fixed model input length: 43844 samples, ≈1.988 s at 22050 Hz
pub const MODEL_WINDOW_SAMPLES: usize = 43844;

/// A transcribed note
///
/// Times are seconds relative to the start of the analysis window.
/// `end_time` is `None` while the note is still sounding at the window edge.
/// Salience is the model's peak activation amplitude in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub midi: i32,
    pub start_time: f64,
    pub end_time: Option<f64>,
    pub salience: f32,
}

/// Capability trait over the transcription model
pub trait Transcriber: Send {
    /// Transcribe exactly [`MODEL_WINDOW_SAMPLES`] mono samples at
    /// [`MODEL_SAMPLE_RATE`]. Callers with a shorter window must zero-pad at
    /// the front; with a longer one, pass the trailing subrange.
    fn evaluate(&mut self, samples: &[f32]) -> Result<Vec<NoteEvent>, AdapterError>;

    /// Run one silent inference so first-tick latency excludes lazy setup.
    fn warm_up(&mut self) -> Result<(), AdapterError> {
        let silence = vec![0.0f32; MODEL_WINDOW_SAMPLES];
        self.evaluate(&silence).map(|_| ()).map_err(|err| {
            AdapterError::InitFailed {
                reason: err.to_string(),
            }
        })
    }
}

/// A model producing frame-level pitch and onset activation grids
pub trait PitchModel: Send {
    fn infer(&mut self, samples: &[f32]) -> Result<ActivationGrid, AdapterError>;
}

/// Adapter over a [`PitchModel`]: validates input and output shapes, then
/// extracts note events from the activation grids.
pub struct ModelTranscriber {
    model: Box<dyn PitchModel>,
    extraction: NoteExtractionConfig,
}

impl ModelTranscriber {
    pub fn new(model: Box<dyn PitchModel>) -> Self {
        Self {
            model,
            extraction: NoteExtractionConfig::default(),
        }
    }

    pub fn with_extraction(mut self, extraction: NoteExtractionConfig) -> Self {
        self.extraction = extraction;
        self
    }

    fn validate_grid(grid: &ActivationGrid) -> Result<(), AdapterError> {
        if grid.onsets.len() != grid.frames.len() {
            return Err(AdapterError::MalformedOutput {
                details: format!(
                    "onset grid has {} frames, pitch grid has {}",
                    grid.onsets.len(),
                    grid.frames.len()
                ),
            });
        }
        let bins = grid.bins();
        for (t, (frame, onset)) in grid.frames.iter().zip(&grid.onsets).enumerate() {
            if frame.len() != bins || onset.len() != bins {
                return Err(AdapterError::MalformedOutput {
                    details: format!("ragged activation row at frame {}", t),
                });
            }
            if frame.iter().chain(onset.iter()).any(|v| !v.is_finite()) {
                return Err(AdapterError::MalformedOutput {
                    details: format!("non-finite activation at frame {}", t),
                });
            }
        }
        if grid.hop_seconds <= 0.0 {
            return Err(AdapterError::MalformedOutput {
                details: format!("non-positive hop: {}", grid.hop_seconds),
            });
        }
        Ok(())
    }
}

impl Transcriber for ModelTranscriber {
    fn evaluate(&mut self, samples: &[f32]) -> Result<Vec<NoteEvent>, AdapterError> {
        if samples.len() != MODEL_WINDOW_SAMPLES {
            return Err(AdapterError::InputLength {
                expected: MODEL_WINDOW_SAMPLES,
                actual: samples.len(),
            });
        }

        let grid = self.model.infer(samples)?;
        Self::validate_grid(&grid)?;
        Ok(activation::notes_from_grid(&grid, &self.extraction))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct GridModel {
        grid: ActivationGrid,
    }

    impl PitchModel for GridModel {
        fn infer(&mut self, _samples: &[f32]) -> Result<ActivationGrid, AdapterError> {
            Ok(self.grid.clone())
        }
    }

    fn flat_grid(frames: usize, bins: usize, value: f32) -> ActivationGrid {
        ActivationGrid {
            midi_low: 40,
            hop_seconds: 0.09,
            frames: vec![vec![value; bins]; frames],
            onsets: vec![vec![0.0; bins]; frames],
        }
    }

    #[test]
    fn test_rejects_wrong_input_length() {
        let mut adapter = ModelTranscriber::new(Box::new(GridModel {
            grid: flat_grid(4, 2, 0.0),
        }));
        let err = adapter.evaluate(&[0.0; 100]).unwrap_err();
        assert_eq!(
            err,
            AdapterError::InputLength {
                expected: MODEL_WINDOW_SAMPLES,
                actual: 100
            }
        );
    }

    #[test]
    fn test_rejects_ragged_grid() {
        let mut grid = flat_grid(3, 2, 0.0);
        grid.frames[1].push(0.5);
        let mut adapter = ModelTranscriber::new(Box::new(GridModel { grid }));
        let input = vec![0.0f32; MODEL_WINDOW_SAMPLES];
        assert!(matches!(
            adapter.evaluate(&input),
            Err(AdapterError::MalformedOutput { .. })
        ));
    }

    #[test]
    fn test_rejects_non_finite_activation() {
        let mut grid = flat_grid(3, 2, 0.0);
        grid.onsets[0][1] = f32::NAN;
        let mut adapter = ModelTranscriber::new(Box::new(GridModel { grid }));
        let input = vec![0.0f32; MODEL_WINDOW_SAMPLES];
        assert!(matches!(
            adapter.evaluate(&input),
            Err(AdapterError::MalformedOutput { .. })
        ));
    }

    #[test]
    fn test_sustained_activation_becomes_note() {
        let mut grid = flat_grid(6, 3, 0.0);
        for frame in &mut grid.frames {
            frame[1] = 0.8;
        }
        let mut adapter = ModelTranscriber::new(Box::new(GridModel { grid }));
        let input = vec![0.0f32; MODEL_WINDOW_SAMPLES];
        let notes = adapter.evaluate(&input).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].midi, 41);
        assert!((notes[0].salience - 0.8).abs() < 1e-6);
        assert_eq!(notes[0].end_time, None);
    }

    #[test]
    fn test_warm_up_maps_failures_to_init() {
        struct FailingModel;
        impl PitchModel for FailingModel {
            fn infer(&mut self, _: &[f32]) -> Result<ActivationGrid, AdapterError> {
                Err(AdapterError::EvalFailed {
                    reason: "missing weights".to_string(),
                })
            }
        }
        let mut adapter = ModelTranscriber::new(Box::new(FailingModel));
        assert!(matches!(
            adapter.warm_up(),
            Err(AdapterError::InitFailed { .. })
        ));
    }
}
