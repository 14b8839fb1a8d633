// Spectral shape descriptors computed per frame from a magnitude spectrum
//
// Bin `i` sits at `i * sample_rate / n_fft` Hz. Silent frames report 0 for
// every descriptor.

pub struct SpectralShape {
    bin_width_hz: f32,
    rolloff_percent: f32,
}

impl SpectralShape {
    /// `rolloff_percent` is the energy fraction used by [`SpectralShape::rolloff`]
    pub fn new(sample_rate: u32, fft_size: usize, rolloff_percent: f32) -> Self {
        Self {
            bin_width_hz: sample_rate as f32 / fft_size as f32,
            rolloff_percent,
        }
    }

    fn bin_hz(&self, bin: usize) -> f32 {
        bin as f32 * self.bin_width_hz
    }

    /// Magnitude-weighted mean frequency in Hz
    pub fn centroid(&self, spectrum: &[f32]) -> f32 {
        let total: f32 = spectrum.iter().sum();
        if total <= 1e-10 {
            return 0.0;
        }
        let weighted: f32 = spectrum
            .iter()
            .enumerate()
            .map(|(bin, &mag)| self.bin_hz(bin) * mag)
            .sum();
        weighted / total
    }

    /// Magnitude-weighted standard deviation around `centroid`, in Hz
    pub fn bandwidth(&self, spectrum: &[f32], centroid: f32) -> f32 {
        let total: f32 = spectrum.iter().sum();
        if total <= 1e-10 {
            return 0.0;
        }
        let spread: f32 = spectrum
            .iter()
            .enumerate()
            .map(|(bin, &mag)| {
                let offset = self.bin_hz(bin) - centroid;
                mag * offset * offset
            })
            .sum();
        (spread / total).sqrt()
    }

    /// Lowest frequency below which `rolloff_percent` of the energy lies
    pub fn rolloff(&self, spectrum: &[f32]) -> f32 {
        let energy: f32 = spectrum.iter().map(|&mag| mag * mag).sum();
        if energy < 1e-10 {
            return 0.0;
        }
        let target = self.rolloff_percent * energy;
        let mut running = 0.0;
        for (bin, &mag) in spectrum.iter().enumerate() {
            running += mag * mag;
            if running >= target {
                return self.bin_hz(bin);
            }
        }
        // Float rounding can leave the target just out of reach
        self.bin_hz(spectrum.len().saturating_sub(1))
    }
}
