//! Deterministic PCM sources.
//!
//! Synthetic signals are rendered eagerly to a buffer: plucked chords as
//! decaying harmonic stacks, pure tones, seeded white noise, and silence.
//! WAV files load through `hound` with channel averaging, so recorded
//! fixtures and synthetic ones flow through the same pipeline entry.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

use crate::error::AudioError;
use crate::verify::pitch::midi_to_hz;

/// A rendered mono fixture plus the rate it was rendered at
pub struct RenderedFixture {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Deterministic waveform patterns
#[derive(Debug, Clone, PartialEq)]
pub enum TestSignal {
    Silence,
    /// Pure tone
    Sine { freq_hz: f64 },
    /// Sum of plucked notes: `partials` harmonics per note with 1/h
    /// amplitude roll-off, exponential decay at `decay_per_sec` (0 sustains)
    Chord {
        midis: Vec<i32>,
        partials: usize,
        decay_per_sec: f64,
    },
    /// Seeded noise, reproducible across runs
    WhiteNoise { seed: u64 },
}

/// Render a signal at `sample_rate` for `duration_ms`, peak-scaled to
/// `amplitude`.
pub fn render_signal(
    signal: &TestSignal,
    sample_rate: u32,
    duration_ms: u32,
    amplitude: f32,
) -> Vec<f32> {
    let len = (sample_rate as u64 * duration_ms as u64 / 1000) as usize;
    match signal {
        TestSignal::Silence => vec![0.0; len],
        TestSignal::Sine { freq_hz } => (0..len)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                (2.0 * std::f64::consts::PI * freq_hz * t).sin() as f32 * amplitude
            })
            .collect(),
        TestSignal::Chord {
            midis,
            partials,
            decay_per_sec,
        } => {
            let partials = (*partials).max(1);
            let freqs: Vec<f64> = midis.iter().map(|&m| midi_to_hz(m as f64, 440.0)).collect();
            // normalize so the summed peak stays near `amplitude`
            let norm = amplitude / (midis.len().max(1) as f32);
            (0..len)
                .map(|i| {
                    let t = i as f64 / sample_rate as f64;
                    let envelope = (-decay_per_sec * t).exp();
                    let mut sample = 0.0f64;
                    for &f in &freqs {
                        for h in 1..=partials {
                            let hf = f * h as f64;
                            if hf * 2.0 >= sample_rate as f64 {
                                break;
                            }
                            sample += (2.0 * std::f64::consts::PI * hf * t).sin() / h as f64;
                        }
                    }
                    (sample * envelope) as f32 * norm
                })
                .collect()
        }
        TestSignal::WhiteNoise { seed } => {
            let mut rng = StdRng::seed_from_u64(*seed);
            (0..len).map(|_| rng.gen_range(-amplitude..=amplitude)).collect()
        }
    }
}

/// Convenience: a sustained plucked chord of pure partials
pub fn render_chord(midis: &[i32], sample_rate: u32, duration_ms: u32) -> Vec<f32> {
    render_signal(
        &TestSignal::Chord {
            midis: midis.to_vec(),
            partials: 1,
            decay_per_sec: 0.0,
        },
        sample_rate,
        duration_ms,
        0.6,
    )
}

/// Load a WAV file as mono f32, averaging channels
pub fn load_wav<P: AsRef<Path>>(path: P) -> Result<RenderedFixture, AudioError> {
    let reader = hound::WavReader::open(&path).map_err(|e| AudioError::StreamOpenFailed {
        reason: format!("failed to open {:?}: {}", path.as_ref(), e),
    })?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AudioError::StreamFailure {
                reason: format!("wav decode failed: {}", e),
            })?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1u32 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| AudioError::StreamFailure {
                    reason: format!("wav decode failed: {}", e),
                })?
        }
    };

    let samples = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();

    Ok(RenderedFixture {
        samples,
        sample_rate: spec.sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_length() {
        let samples = render_signal(&TestSignal::Silence, 48000, 500, 1.0);
        assert_eq!(samples.len(), 24000);
    }

    #[test]
    fn test_silence_is_zero() {
        let samples = render_signal(&TestSignal::Silence, 48000, 100, 1.0);
        assert!(samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_sine_peak_amplitude() {
        let samples = render_signal(&TestSignal::Sine { freq_hz: 440.0 }, 48000, 100, 0.5);
        let peak = samples.iter().fold(0.0f32, |a, &b| a.max(b.abs()));
        assert!(peak <= 0.5 + 1e-6);
        assert!(peak > 0.45);
    }

    #[test]
    fn test_noise_deterministic_per_seed() {
        let a = render_signal(&TestSignal::WhiteNoise { seed: 7 }, 48000, 50, 0.8);
        let b = render_signal(&TestSignal::WhiteNoise { seed: 7 }, 48000, 50, 0.8);
        let c = render_signal(&TestSignal::WhiteNoise { seed: 8 }, 48000, 50, 0.8);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_chord_decay_envelope() {
        let samples = render_signal(
            &TestSignal::Chord {
                midis: vec![52],
                partials: 3,
                decay_per_sec: 4.0,
            },
            48000,
            1000,
            0.8,
        );
        let early: f32 = samples[..4800].iter().map(|s| s.abs()).sum();
        let late: f32 = samples[43200..].iter().map(|s| s.abs()).sum();
        assert!(late < early * 0.1);
    }

    #[test]
    fn test_chord_sustain_without_decay() {
        let samples = render_chord(&[52, 55, 59], 48000, 500);
        let late_peak = samples[20000..]
            .iter()
            .fold(0.0f32, |a, &b| a.max(b.abs()));
        assert!(late_peak > 0.1);
    }
}
