// LinearResampler - deterministic O(n) rate conversion
//
// Linear interpolation is chosen over a windowed-sinc design for bounded,
// allocation-free per-tick cost; the model's 1.3 s context dominates
// aliasing concerns at guitar fundamentals.

/// Linear-interpolation resampler between two fixed rates
pub struct LinearResampler {
    in_rate: u32,
    out_rate: u32,
}

impl LinearResampler {
    /// # Panics
    /// Panics if either rate is 0.
    pub fn new(in_rate: u32, out_rate: u32) -> Self {
        assert!(in_rate > 0 && out_rate > 0, "sample rates must be positive");
        Self { in_rate, out_rate }
    }

    /// Number of output samples produced for `input_len` input samples
    pub fn output_len(&self, input_len: usize) -> usize {
        (input_len as f64 * self.out_rate as f64 / self.in_rate as f64).round() as usize
    }

    /// Fill `output` by interpolating `input`.
    ///
    /// For each output index `i`, `pos = i * in_rate / out_rate`; the sample
    /// is interpolated between `floor(pos)` and its successor, with boundary
    /// accesses clamped to the last input sample. Equal rates produce an
    /// exact copy. An empty input zero-fills the output.
    pub fn resample(&self, input: &[f32], output: &mut [f32]) {
        if input.is_empty() {
            output.fill(0.0);
            return;
        }

        if self.in_rate == self.out_rate {
            let n = input.len().min(output.len());
            output[..n].copy_from_slice(&input[..n]);
            output[n..].fill(0.0);
            return;
        }

        let step = self.in_rate as f64 / self.out_rate as f64;
        let last = input.len() - 1;
        for (i, slot) in output.iter_mut().enumerate() {
            let pos = i as f64 * step;
            let idx = pos as usize;
            let frac = (pos - idx as f64) as f32;
            let x0 = input[idx.min(last)];
            let x1 = input[(idx + 1).min(last)];
            *slot = x0 + (x1 - x0) * frac;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_when_rates_equal() {
        let resampler = LinearResampler::new(22050, 22050);
        let input: Vec<f32> = (0..64).map(|i| (i as f32).sin()).collect();
        let mut output = vec![0.0f32; 64];
        resampler.resample(&input, &mut output);
        assert_eq!(input, output);
    }

    #[test]
    fn test_output_len() {
        let resampler = LinearResampler::new(44100, 22050);
        assert_eq!(resampler.output_len(44100), 22050);
        let resampler = LinearResampler::new(48000, 22050);
        assert_eq!(resampler.output_len(48000), 22050);
        assert_eq!(resampler.output_len(62400), 28665); // 1.3 s at 48 kHz
    }

    #[test]
    fn test_downsample_ramp_preserves_slope() {
        // A linear ramp is reproduced exactly by linear interpolation
        let resampler = LinearResampler::new(48000, 22050);
        let input: Vec<f32> = (0..480).map(|i| i as f32).collect();
        let mut output = vec![0.0f32; resampler.output_len(480)];
        resampler.resample(&input, &mut output);
        let step = 48000.0 / 22050.0;
        for (i, &y) in output.iter().enumerate() {
            let expected = (i as f64 * step) as f32;
            assert!(
                (y - expected).abs() < 1e-3,
                "index {}: {} vs {}",
                i,
                y,
                expected
            );
        }
    }

    #[test]
    fn test_boundary_clamped() {
        let resampler = LinearResampler::new(44100, 22050);
        let input = vec![1.0f32; 10];
        let mut output = vec![0.0f32; 8]; // over-reads past input end
        resampler.resample(&input, &mut output);
        for &y in &output {
            assert_eq!(y, 1.0);
        }
    }

    #[test]
    fn test_empty_input_zero_fills() {
        let resampler = LinearResampler::new(48000, 22050);
        let mut output = vec![1.0f32; 16];
        resampler.resample(&[], &mut output);
        assert_eq!(output, vec![0.0f32; 16]);
    }

    #[test]
    fn test_monotone_phase() {
        // Output positions map to non-decreasing input positions
        let resampler = LinearResampler::new(44100, 22050);
        let input: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let mut output = vec![0.0f32; 50];
        resampler.resample(&input, &mut output);
        for pair in output.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
    }
}
