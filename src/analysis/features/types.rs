// Types module - Data structures for audio features

use serde::{Deserialize, Serialize};

use crate::error::ExtractionError;

/// Fixed-shape feature set computed from one recording
///
/// Every per-frame sequence has the same frame count. MFCC rows hold exactly
/// `n_mfcc` coefficients and chroma rows exactly `num_chroma_bins` values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatures {
    /// One row of cepstral coefficients per frame
    pub mfcc: Vec<Vec<f32>>,

    /// Spectral centroid per frame, in Hz
    pub spectral_centroid: Vec<f32>,

    /// Zero-crossing rate per frame (0.0 to 1.0)
    pub zero_crossing_rate: Vec<f32>,

    /// Rolloff frequency per frame, in Hz
    pub spectral_rolloff: Vec<f32>,

    /// Spread around the centroid per frame, in Hz
    pub spectral_bandwidth: Vec<f32>,

    /// One max-normalised pitch-class vector per frame
    pub chroma: Vec<Vec<f32>>,
}

impl AudioFeatures {
    pub fn frame_count(&self) -> usize {
        self.mfcc.len()
    }

    /// Check the shape invariants against the expected widths
    pub fn validate_shape(
        &self,
        n_mfcc: usize,
        num_chroma_bins: usize,
    ) -> Result<(), ExtractionError> {
        let frames = self.frame_count();
        let sequences = [
            ("spectral_centroid", self.spectral_centroid.len()),
            ("zero_crossing_rate", self.zero_crossing_rate.len()),
            ("spectral_rolloff", self.spectral_rolloff.len()),
            ("spectral_bandwidth", self.spectral_bandwidth.len()),
            ("chroma", self.chroma.len()),
        ];
        for (name, len) in sequences {
            if len != frames {
                return Err(ExtractionError::ShapeMismatch {
                    reason: format!("{} has {} frames, mfcc has {}", name, len, frames),
                });
            }
        }
        if let Some(row) = self.mfcc.iter().find(|row| row.len() != n_mfcc) {
            return Err(ExtractionError::ShapeMismatch {
                reason: format!("mfcc row width {} != {}", row.len(), n_mfcc),
            });
        }
        if let Some(row) = self.chroma.iter().find(|row| row.len() != num_chroma_bins) {
            return Err(ExtractionError::ShapeMismatch {
                reason: format!("chroma row width {} != {}", row.len(), num_chroma_bins),
            });
        }
        Ok(())
    }
}
