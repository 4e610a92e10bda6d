// FFT module - magnitude spectra for spectral fingerprints
//
// Applies a pre-computed Hann window to reduce spectral leakage, runs a
// forward FFT planned once at construction, and returns positive-frequency
// magnitudes.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// FFT processor that computes magnitude spectra from audio windows
pub struct FftProcessor {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    /// Hann window for FFT (pre-computed)
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl FftProcessor {
    /// Create a new FFT processor for windows of `fft_size` samples
    pub fn new(fft_size: usize) -> Self {
        let fft_size = fft_size.max(2);
        let window = (0..fft_size)
            .map(|i| {
                0.5 * (1.0
                    - ((2.0 * std::f32::consts::PI * i as f32) / (fft_size as f32 - 1.0)).cos())
            })
            .collect();

        let fft = FftPlanner::new().plan_fft_forward(fft_size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        Self {
            fft,
            fft_size,
            window,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of positive-frequency bins produced (fft_size / 2 + 1)
    pub fn bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// Compute the magnitude spectrum of `audio` into `out`
    ///
    /// `audio` shorter than the FFT size is zero-padded; longer input is
    /// truncated. `out` receives up to `bins()` magnitudes.
    pub fn magnitude_spectrum_into(&mut self, audio: &[f32], out: &mut [f32]) {
        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = audio.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(sample * self.window[i], 0.0);
        }

        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        for (dst, c) in out.iter_mut().zip(self.buffer[..self.fft_size / 2 + 1].iter()) {
            *dst = c.norm();
        }
    }

    /// Allocating convenience wrapper around [`Self::magnitude_spectrum_into`]
    pub fn compute_magnitude_spectrum(&mut self, audio: &[f32]) -> Vec<f32> {
        let mut out = vec![0.0; self.bins()];
        self.magnitude_spectrum_into(audio, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sine_peaks_at_expected_bin() {
        let mut fft = FftProcessor::new(256);
        let sample_rate = 44_100.0;
        // Bin 20 centre frequency
        let freq = 20.0 * sample_rate / 256.0;
        let audio: Vec<f32> = (0..256)
            .map(|n| (2.0 * std::f32::consts::PI * freq * n as f32 / sample_rate).sin())
            .collect();

        let spectrum = fft.compute_magnitude_spectrum(&audio);
        assert_eq!(spectrum.len(), 129);
        let peak = spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 20);
    }

    #[test]
    fn test_silence_is_zero() {
        let mut fft = FftProcessor::new(256);
        let spectrum = fft.compute_magnitude_spectrum(&[0.0; 100]);
        assert!(spectrum.iter().all(|&m| m == 0.0));
    }
}
