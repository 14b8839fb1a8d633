// Mel module - mel filterbank projection and cepstral coefficients
//
// Power spectra are projected onto triangular filters spaced evenly on the
// mel scale, log-compressed, then decorrelated with an orthonormal DCT-II.
// Only the first `n_mfcc` coefficients are kept.

/// Floor applied before the log so silent bands stay finite
const LOG_FLOOR: f32 = 1e-10;

/// Convert frequency in Hz to mel scale
#[inline]
pub fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

/// Convert mel to Hz
#[inline]
pub fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0f32.powf(mel / 2595.0) - 1.0)
}

/// Triangular mel filterbank stored as a dense `[n_mels × num_bins]` matrix
pub struct MelFilterbank {
    weights: Vec<f32>,
    n_mels: usize,
    num_bins: usize,
}

impl MelFilterbank {
    /// Filters span 0 Hz to Nyquist
    pub fn new(sample_rate: u32, fft_size: usize, n_mels: usize) -> Self {
        let num_bins = fft_size / 2 + 1;
        let nyquist = sample_rate as f32 / 2.0;

        let mel_min = hz_to_mel(0.0);
        let mel_max = hz_to_mel(nyquist);

        // n_mels + 2 edges: each filter uses (left, center, right)
        let bin_points: Vec<f32> = (0..n_mels + 2)
            .map(|i| mel_min + (mel_max - mel_min) * i as f32 / (n_mels + 1) as f32)
            .map(mel_to_hz)
            .map(|hz| hz * fft_size as f32 / sample_rate as f32)
            .collect();

        let mut weights = vec![0.0f32; n_mels * num_bins];
        for m in 0..n_mels {
            let left = bin_points[m];
            let center = bin_points[m + 1];
            let right = bin_points[m + 2];

            for b in 0..num_bins {
                let bin = b as f32;
                let weight = if bin >= left && bin <= center {
                    (bin - left) / (center - left + 1e-10)
                } else if bin > center && bin <= right {
                    (right - bin) / (right - center + 1e-10)
                } else {
                    0.0
                };
                weights[m * num_bins + b] = weight;
            }
        }

        Self {
            weights,
            n_mels,
            num_bins,
        }
    }

    pub fn n_mels(&self) -> usize {
        self.n_mels
    }

    /// Project a power spectrum onto the mel bands and take the natural log
    pub fn log_mel(&self, power: &[f32]) -> Vec<f32> {
        self.weights
            .chunks_exact(self.num_bins)
            .map(|filter| {
                let energy: f32 = filter.iter().zip(power).map(|(w, p)| w * p).sum();
                energy.max(LOG_FLOOR).ln()
            })
            .collect()
    }
}

/// Orthonormal DCT-II truncated to the first `n_mfcc` outputs
pub struct Dct {
    basis: Vec<f32>,
    n_in: usize,
    n_out: usize,
}

impl Dct {
    pub fn new(n_in: usize, n_out: usize) -> Self {
        let n = n_in as f32;
        let mut basis = Vec::with_capacity(n_in * n_out);
        for k in 0..n_out {
            let scale = if k == 0 {
                (1.0 / n).sqrt()
            } else {
                (2.0 / n).sqrt()
            };
            for i in 0..n_in {
                let angle = std::f32::consts::PI * k as f32 * (2.0 * i as f32 + 1.0) / (2.0 * n);
                basis.push(scale * angle.cos());
            }
        }
        Self {
            basis,
            n_in,
            n_out,
        }
    }

    pub fn n_out(&self) -> usize {
        self.n_out
    }

    pub fn apply(&self, input: &[f32]) -> Vec<f32> {
        self.basis
            .chunks_exact(self.n_in)
            .map(|row| row.iter().zip(input).map(|(b, x)| b * x).sum())
            .collect()
    }
}
