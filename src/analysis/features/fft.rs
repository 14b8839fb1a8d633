// FFT module - windowed magnitude spectra
//
// This module handles FFT computation with a configurable window to reduce
// spectral leakage. The transform is planned once at construction and the
// plan is shared by every frame of every job.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use crate::config::WindowKind;

/// Build a periodic window of `size` samples
///
/// Periodic (rather than symmetric) windows are the usual choice for STFT
/// analysis since consecutive frames overlap.
pub fn build_window(kind: WindowKind, size: usize) -> Vec<f32> {
    let n = size as f32;
    (0..size)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * i as f32 / n;
            match kind {
                WindowKind::Hann => 0.5 - 0.5 * phase.cos(),
                WindowKind::Hamming => 0.54 - 0.46 * phase.cos(),
                WindowKind::Rectangular => 1.0,
            }
        })
        .collect()
}

/// FFT processor that computes magnitude spectra from audio frames
pub struct FftProcessor {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    /// Window applied to each frame (pre-computed)
    window: Vec<f32>,
}

impl FftProcessor {
    /// Create a new FFT processor
    ///
    /// # Arguments
    /// * `fft_size` - FFT size, also the frame length
    /// * `window` - Window function applied before each transform
    pub fn new(fft_size: usize, window: WindowKind) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            fft: planner.plan_fft_forward(fft_size),
            fft_size,
            window: build_window(window, fft_size),
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of bins returned by [`FftProcessor::compute_magnitude_spectrum`]
    pub fn num_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// Compute magnitude spectrum using FFT
    ///
    /// Applies the window, performs the FFT and returns the magnitude of the
    /// positive frequencies only. Frames shorter than the FFT size are
    /// zero-padded; longer frames are truncated.
    ///
    /// # Returns
    /// Magnitude spectrum (size = fft_size / 2 + 1)
    pub fn compute_magnitude_spectrum(&self, frame: &[f32]) -> Vec<f32> {
        let mut buffer: Vec<Complex<f32>> = frame
            .iter()
            .zip(&self.window)
            .map(|(&sample, &w)| Complex::new(sample * w, 0.0))
            .collect();
        buffer.resize(self.fft_size, Complex::new(0.0, 0.0));

        self.fft.process(&mut buffer);

        buffer[..self.num_bins()].iter().map(|c| c.norm()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hann_window_shape() {
        let window = build_window(WindowKind::Hann, 8);
        assert!(window[0].abs() < 1e-6);
        assert!((window[4] - 1.0).abs() < 1e-6);
        assert!(build_window(WindowKind::Rectangular, 4)
            .iter()
            .all(|&w| w == 1.0));
        assert!((build_window(WindowKind::Hamming, 8)[0] - 0.08).abs() < 1e-6);
    }

    #[test]
    fn test_sine_peak_bin() {
        let fft_size = 1024;
        let sample_rate = 22_050.0f32;
        // Choose a frequency that lands exactly on bin 100
        let frequency = 100.0 * sample_rate / fft_size as f32;
        let frame: Vec<f32> = (0..fft_size)
            .map(|i| (2.0 * std::f32::consts::PI * frequency * i as f32 / sample_rate).sin())
            .collect();

        let processor = FftProcessor::new(fft_size, WindowKind::Hann);
        let spectrum = processor.compute_magnitude_spectrum(&frame);
        assert_eq!(spectrum.len(), 513);

        let (peak, _) = spectrum
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |(bi, bm), (i, &m)| if m > bm { (i, m) } else { (bi, bm) });
        assert_eq!(peak, 100);
    }

    #[test]
    fn test_short_frame_is_zero_padded() {
        let processor = FftProcessor::new(256, WindowKind::Rectangular);
        let spectrum = processor.compute_magnitude_spectrum(&[1.0; 16]);
        assert_eq!(spectrum.len(), 129);
        assert!((spectrum[0] - 16.0).abs() < 1e-4);
    }
}
