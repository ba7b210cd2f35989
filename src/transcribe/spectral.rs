// SpectralPitchModel - FFT harmonic-salience transcription
//
// A self-contained PitchModel for environments without the pretrained
// runtime: short-time FFT over the window, spectral peak picking with
// parabolic refinement, then per-MIDI harmonic summation. A pitch bin is
// active only when a spectral peak sits within a quarter tone of its
// fundamental, which suppresses octave and semitone-neighbor ghosts.
// Onset activations are the positive frame-to-frame salience flux.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use crate::error::AdapterError;
use crate::transcribe::{ActivationGrid, PitchModel};
use crate::verify::pitch::{hz_to_midi, midi_to_hz};

/// FFT window size (2.7 Hz bins at 22050 Hz; resolves semitones down to E2)
pub const FFT_SIZE: usize = 8192;

/// Hop between analysis frames
pub const HOP_SIZE: usize = 2048;

/// Harmonics summed per pitch bin
const HARMONICS: usize = 4;

/// Per-harmonic weight decay
const HARMONIC_DECAY: f32 = 0.6;

/// Peaks below this fraction of the frame maximum are ignored
const PEAK_FLOOR_RATIO: f32 = 0.02;

/// Frames quieter than this RMS produce empty activation rows
const SILENCE_RMS: f32 = 1e-4;

/// Ratio of a quarter tone, used for peak-to-fundamental matching
const QUARTER_TONE: f64 = 0.029_302_236_6; // 2^(1/24) - 1

struct Peak {
    bin: f64,
    mag: f32,
}

/// FFT harmonic-salience model over a fixed MIDI range
pub struct SpectralPitchModel {
    sample_rate: u32,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    midi_low: i32,
    midi_high: i32,
    a4_hz: f64,
}

impl SpectralPitchModel {
    /// Build a model covering `min_f0_hz..=max_f0_hz` at tuning `a4_hz`.
    ///
    /// `sample_rate` is the rate of the buffers passed to `infer`, normally
    /// [`crate::transcribe::MODEL_SAMPLE_RATE`].
    pub fn new(sample_rate: u32, min_f0_hz: f64, max_f0_hz: f64, a4_hz: f64) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);

        // Hann window to reduce spectral leakage
        let window = (0..FFT_SIZE)
            .map(|i| {
                0.5 * (1.0
                    - ((2.0 * std::f32::consts::PI * i as f32) / (FFT_SIZE as f32 - 1.0)).cos())
            })
            .collect();

        let midi_low = hz_to_midi(min_f0_hz, a4_hz).round() as i32;
        let midi_high = hz_to_midi(max_f0_hz, a4_hz).round() as i32;

        Self {
            sample_rate,
            fft,
            window,
            midi_low,
            midi_high,
            a4_hz,
        }
    }

    fn bins(&self) -> usize {
        (self.midi_high - self.midi_low + 1).max(0) as usize
    }

    /// Windowed magnitude spectrum for positive frequencies
    fn magnitude_spectrum(&self, frame: &[f32]) -> Vec<f32> {
        let mut buffer: Vec<Complex<f32>> = frame
            .iter()
            .zip(&self.window)
            .map(|(&s, &w)| Complex::new(s * w, 0.0))
            .collect();
        buffer.resize(FFT_SIZE, Complex::new(0.0, 0.0));

        self.fft.process(&mut buffer);

        buffer[..FFT_SIZE / 2 + 1].iter().map(|c| c.norm()).collect()
    }

    /// Local maxima with parabolic bin refinement
    fn spectral_peaks(spectrum: &[f32]) -> Vec<Peak> {
        let max = spectrum.iter().fold(0.0f32, |a, &b| a.max(b));
        if max <= 0.0 {
            return Vec::new();
        }
        let floor = max * PEAK_FLOOR_RATIO;

        let mut peaks = Vec::new();
        for k in 1..spectrum.len() - 1 {
            let (left, mid, right) = (spectrum[k - 1], spectrum[k], spectrum[k + 1]);
            if mid >= floor && mid > left && mid >= right {
                let denom = left - 2.0 * mid + right;
                let delta = if denom.abs() > f32::EPSILON {
                    (0.5 * (left - right) / denom).clamp(-0.5, 0.5)
                } else {
                    0.0
                };
                peaks.push(Peak {
                    bin: k as f64 + delta as f64,
                    mag: mid,
                });
            }
        }
        peaks
    }

    /// Strongest peak within a quarter tone of `target_bin`, if any
    fn peak_near(peaks: &[Peak], target_bin: f64) -> Option<f32> {
        let tolerance = (target_bin * QUARTER_TONE).max(1.0);
        peaks
            .iter()
            .filter(|p| (p.bin - target_bin).abs() <= tolerance)
            .map(|p| p.mag)
            .fold(None, |best, mag| {
                Some(best.map_or(mag, |b: f32| b.max(mag)))
            })
    }

    /// Harmonic-sum salience for every MIDI row of one frame
    fn frame_salience(&self, spectrum: &[f32]) -> Vec<f32> {
        let peaks = Self::spectral_peaks(spectrum);
        let hz_per_bin = self.sample_rate as f64 / FFT_SIZE as f64;
        let nyquist_bin = (FFT_SIZE / 2) as f64;

        let mut row = vec![0.0f32; self.bins()];
        for (p, slot) in row.iter_mut().enumerate() {
            let f0 = midi_to_hz((self.midi_low + p as i32) as f64, self.a4_hz);
            let f0_bin = f0 / hz_per_bin;
            if f0_bin >= nyquist_bin {
                break;
            }

            // the fundamental must be present; harmonics only reinforce
            let Some(fundamental) = Self::peak_near(&peaks, f0_bin) else {
                continue;
            };

            let mut salience = fundamental;
            let mut weight = 1.0f32;
            for h in 2..=HARMONICS {
                let h_bin = f0_bin * h as f64;
                if h_bin >= nyquist_bin {
                    break;
                }
                weight *= HARMONIC_DECAY;
                if let Some(mag) = Self::peak_near(&peaks, h_bin) {
                    salience += weight * mag;
                }
            }
            *slot = salience;
        }

        // normalize to [0, 1] against the frame's strongest row
        let max = row.iter().fold(0.0f32, |a, &b| a.max(b));
        if max > 0.0 {
            for v in &mut row {
                *v /= max;
            }
        }
        row
    }
}

impl PitchModel for SpectralPitchModel {
    fn infer(&mut self, samples: &[f32]) -> Result<ActivationGrid, AdapterError> {
        let bins = self.bins();
        let mut frames: Vec<Vec<f32>> = Vec::new();
        let mut onsets: Vec<Vec<f32>> = Vec::new();
        let mut prev = vec![0.0f32; bins];

        let frame_slices: Vec<&[f32]> = if samples.len() < FFT_SIZE {
            vec![samples]
        } else {
            (0..=samples.len() - FFT_SIZE)
                .step_by(HOP_SIZE)
                .map(|pos| &samples[pos..pos + FFT_SIZE])
                .collect()
        };

        for frame in frame_slices {
            let rms = {
                let sum: f64 = frame.iter().map(|&x| (x as f64) * (x as f64)).sum();
                (sum / frame.len().max(1) as f64).sqrt() as f32
            };
            let row = if rms < SILENCE_RMS {
                vec![0.0f32; bins]
            } else {
                self.frame_salience(&self.magnitude_spectrum(frame))
            };
            let onset: Vec<f32> = row
                .iter()
                .zip(&prev)
                .map(|(&cur, &old)| (cur - old).max(0.0))
                .collect();
            prev.copy_from_slice(&row);
            frames.push(row);
            onsets.push(onset);
        }

        Ok(ActivationGrid {
            midi_low: self.midi_low,
            hop_seconds: HOP_SIZE as f64 / self.sample_rate as f64,
            frames,
            onsets,
        })
    }
}
