// Chroma module - pitch-class energy folding
//
// Every FFT bin above DC is assigned to the nearest pitch class (A440
// reference, C as class 0). Per frame, power is summed per class and the
// vector is normalised so its largest entry is 1.

/// Maps FFT bins onto `num_bins` pitch classes
pub struct ChromaFilter {
    /// Pitch class of each FFT bin; `None` for DC
    bin_classes: Vec<Option<usize>>,
    num_bins: usize,
}

impl ChromaFilter {
    pub fn new(sample_rate: u32, fft_size: usize, num_chroma_bins: usize) -> Self {
        let spectrum_len = fft_size / 2 + 1;
        let bin_width_hz = sample_rate as f32 / fft_size as f32;
        let n = num_chroma_bins as f32;
        // A sits 9 semitones above C
        let a_offset = 9.0 * n / 12.0;

        let bin_classes = (0..spectrum_len)
            .map(|bin| {
                if bin == 0 || num_chroma_bins == 0 {
                    return None;
                }
                let frequency = bin as f32 * bin_width_hz;
                let class = (n * (frequency / 440.0).log2() + a_offset).round() as i64;
                Some(class.rem_euclid(num_chroma_bins as i64) as usize)
            })
            .collect();

        Self {
            bin_classes,
            num_bins: num_chroma_bins,
        }
    }

    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    /// Fold a power spectrum into a max-normalised chroma vector
    ///
    /// A silent frame yields all zeros.
    pub fn compute(&self, power: &[f32]) -> Vec<f32> {
        let mut chroma = vec![0.0f32; self.num_bins];
        for (class, &p) in self.bin_classes.iter().zip(power) {
            if let Some(class) = class {
                chroma[*class] += p;
            }
        }

        let peak = chroma.iter().fold(0.0f32, |m, &v| m.max(v));
        if peak > 1e-10 {
            for value in chroma.iter_mut() {
                *value /= peak;
            }
        }
        chroma
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectrum_with_peak_at(hz: f32, sample_rate: u32, fft_size: usize) -> Vec<f32> {
        let bin = (hz * fft_size as f32 / sample_rate as f32).round() as usize;
        let mut power = vec![0.0; fft_size / 2 + 1];
        power[bin] = 1.0;
        power
    }

    #[test]
    fn test_a440_maps_to_class_nine() {
        let filter = ChromaFilter::new(22_050, 4096, 12);
        let chroma = filter.compute(&spectrum_with_peak_at(440.0, 22_050, 4096));
        assert_eq!(chroma.len(), 12);
        assert!((chroma[9] - 1.0).abs() < 1e-6);
        assert_eq!(chroma.iter().filter(|&&v| v > 0.0).count(), 1);
    }

    #[test]
    fn test_octaves_share_a_class() {
        let filter = ChromaFilter::new(22_050, 8192, 12);
        let low = filter.compute(&spectrum_with_peak_at(523.25, 22_050, 8192));
        let high = filter.compute(&spectrum_with_peak_at(1046.5, 22_050, 8192));
        // C5 and C6
        assert!((low[0] - 1.0).abs() < 1e-6);
        assert!((high[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_silence_and_custom_width() {
        let filter = ChromaFilter::new(22_050, 2048, 24);
        assert_eq!(filter.num_bins(), 24);
        let chroma = filter.compute(&vec![0.0; 1025]);
        assert_eq!(chroma, vec![0.0; 24]);
    }
}
