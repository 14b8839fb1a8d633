// FeatureExtractor - DSP feature extraction for bird call classification
//
// This module turns a decoded PCM buffer into the fixed-shape feature set
// the classifier was trained on. The buffer is truncated or zero-padded to
// `max_length`, framed with `n_fft`/`hop_length` (no centering), windowed
// and transformed once per frame; every descriptor is derived from that
// single spectrum except ZCR, which reads the raw frame.
//
// Module organization:
// - types: Data structures (AudioFeatures)
// - fft: Windowed FFT computation
// - mel: Mel filterbank and DCT (MFCC)
// - spectral: Centroid, bandwidth, rolloff
// - temporal: Zero-crossing rate
// - chroma: Pitch-class folding
// - mod.rs: Coordinator (FeatureExtractor)
//
// References:
// - Davis, S. & Mermelstein, P. (1980). Comparison of parametric representations
//   for monosyllabic word recognition
// - Peeters, G. (2004). A large set of audio features for sound description

mod chroma;
mod fft;
mod mel;
mod spectral;
mod temporal;
mod types;

pub use fft::build_window;
pub use types::AudioFeatures;

use std::sync::atomic::{AtomicU64, Ordering};

use chroma::ChromaFilter;
use fft::FftProcessor;
use mel::{Dct, MelFilterbank};
use spectral::SpectralShape;

use crate::audio::AudioBuffer;
use crate::config::AudioProcessorConfig;
use crate::error::ExtractionError;

/// Progress notifications emitted during extraction
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExtractionProgress {
    /// Fitting the buffer to `max_length` (fraction 0.0 to 1.0)
    Preprocessing { fraction: f32 },
    /// Per-frame loop
    Extracting {
        frames_done: usize,
        frames_total: usize,
    },
}

/// Number of progress notifications emitted across the frame loop
const PROGRESS_STEPS: usize = 20;

/// Truncate or zero-pad `samples` to exactly `length`
pub fn fit_to_length(samples: &[f32], length: usize) -> Vec<f32> {
    let mut fitted = samples[..samples.len().min(length)].to_vec();
    fitted.resize(length, 0.0);
    fitted
}

fn check_finite(frame: usize, feature: &'static str, values: &[f32]) -> Result<(), ExtractionError> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(ExtractionError::NonFinite { frame, feature })
    }
}

/// FeatureExtractor coordinates the DSP feature extraction pipeline
///
/// All filterbanks and the FFT plan are built once from the configuration;
/// `extract` only reads them, so one extractor can serve concurrent jobs.
pub struct FeatureExtractor {
    config: AudioProcessorConfig,
    fft_processor: FftProcessor,
    mel_filterbank: MelFilterbank,
    dct: Dct,
    spectral_shape: SpectralShape,
    chroma_filter: ChromaFilter,
    /// Extractions started over the extractor's lifetime
    extractions: AtomicU64,
}

impl FeatureExtractor {
    /// Create a new FeatureExtractor from a validated configuration
    pub fn new(config: AudioProcessorConfig) -> Self {
        Self {
            fft_processor: FftProcessor::new(config.n_fft, config.window),
            mel_filterbank: MelFilterbank::new(config.sample_rate, config.n_fft, config.n_mels),
            dct: Dct::new(config.n_mels, config.n_mfcc),
            spectral_shape: SpectralShape::new(
                config.sample_rate,
                config.n_fft,
                config.rolloff_percent,
            ),
            chroma_filter: ChromaFilter::new(
                config.sample_rate,
                config.n_fft,
                config.num_chroma_bins,
            ),
            config,
            extractions: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &AudioProcessorConfig {
        &self.config
    }

    /// Number of extractions started so far
    pub fn extraction_count(&self) -> u64 {
        self.extractions.load(Ordering::Relaxed)
    }

    /// Extract features without progress reporting
    pub fn extract(&self, buffer: &AudioBuffer) -> Result<AudioFeatures, ExtractionError> {
        self.extract_with_progress(buffer, |_| true)
    }

    /// Extract all features from a decoded buffer
    ///
    /// `progress` is called while preprocessing and then at regular frame
    /// intervals, ending with `frames_done == frames_total`. Returning
    /// `false` from it stops the extraction.
    ///
    /// # Errors
    /// Any empty or non-finite frame aborts the whole extraction, and a
    /// `false` from `progress` yields [`ExtractionError::Cancelled`].
    pub fn extract_with_progress<F>(
        &self,
        buffer: &AudioBuffer,
        mut progress: F,
    ) -> Result<AudioFeatures, ExtractionError>
    where
        F: FnMut(ExtractionProgress) -> bool,
    {
        self.extractions.fetch_add(1, Ordering::Relaxed);
        let config = &self.config;
        if buffer.sample_rate != config.sample_rate {
            return Err(ExtractionError::SampleRateMismatch {
                expected: config.sample_rate,
                actual: buffer.sample_rate,
            });
        }

        if !progress(ExtractionProgress::Preprocessing { fraction: 0.0 }) {
            return Err(ExtractionError::Cancelled { frame: 0 });
        }
        let signal = fit_to_length(&buffer.samples, config.max_length);
        let frames_total = config.frame_count();
        if frames_total == 0 {
            return Err(ExtractionError::ShapeMismatch {
                reason: format!(
                    "max_length {} yields no frames of {} samples",
                    config.max_length, config.n_fft
                ),
            });
        }
        if !progress(ExtractionProgress::Preprocessing { fraction: 1.0 }) {
            return Err(ExtractionError::Cancelled { frame: 0 });
        }

        let mut features = AudioFeatures {
            mfcc: Vec::with_capacity(frames_total),
            spectral_centroid: Vec::with_capacity(frames_total),
            zero_crossing_rate: Vec::with_capacity(frames_total),
            spectral_rolloff: Vec::with_capacity(frames_total),
            spectral_bandwidth: Vec::with_capacity(frames_total),
            chroma: Vec::with_capacity(frames_total),
        };
        let report_every = (frames_total / PROGRESS_STEPS).max(1);

        for index in 0..frames_total {
            let start = index * config.hop_length;
            let frame = &signal[start..start + config.n_fft];
            check_finite(index, "samples", frame)?;

            let magnitude = self.fft_processor.compute_magnitude_spectrum(frame);
            if magnitude.is_empty() {
                return Err(ExtractionError::EmptySpectrum { frame: index });
            }
            check_finite(index, "spectrum", &magnitude)?;
            let power: Vec<f32> = magnitude.iter().map(|m| m * m).collect();

            let mfcc = self.dct.apply(&self.mel_filterbank.log_mel(&power));
            check_finite(index, "mfcc", &mfcc)?;

            let centroid = self.spectral_shape.centroid(&magnitude);
            let bandwidth = self.spectral_shape.bandwidth(&magnitude, centroid);
            let rolloff = self.spectral_shape.rolloff(&magnitude);
            let zcr = temporal::compute_zcr(frame);
            check_finite(index, "spectral descriptors", &[centroid, bandwidth, rolloff, zcr])?;

            let chroma = self.chroma_filter.compute(&power);
            check_finite(index, "chroma", &chroma)?;

            features.mfcc.push(mfcc);
            features.spectral_centroid.push(centroid);
            features.spectral_bandwidth.push(bandwidth);
            features.spectral_rolloff.push(rolloff);
            features.zero_crossing_rate.push(zcr);
            features.chroma.push(chroma);

            let frames_done = index + 1;
            let report = frames_done % report_every == 0 || frames_done == frames_total;
            if report
                && !progress(ExtractionProgress::Extracting {
                    frames_done,
                    frames_total,
                })
            {
                return Err(ExtractionError::Cancelled { frame: frames_done });
            }
        }

        features.validate_shape(self.dct.n_out(), self.chroma_filter.num_bins())?;
        Ok(features)
    }
}
