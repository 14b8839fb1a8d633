//! Prototype classifier artifact.
//!
//! A small nearest-prototype model stored as JSON. Each recording is reduced
//! to a fixed summary vector (see [`PrototypeModel::summarize`]), scaled per
//! dimension, and compared with one prototype per class. Probabilities are a
//! softmax over negative squared distances divided by `temperature`.
//!
//! ```json
//! {
//!   "labels": ["turdus_merula", "parus_major"],
//!   "prototypes": [[...], [...]],
//!   "feature_scale": [...],
//!   "temperature": 1.0
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::analysis::features::AudioFeatures;
use crate::analysis::inference::InferenceBackend;
use crate::error::InferenceError;

/// Below this spread a dimension is left unscaled
const MIN_SCALE: f32 = 1e-6;

/// Length of the summary vector for the given feature widths
pub fn summary_len(n_mfcc: usize, num_chroma_bins: usize) -> usize {
    2 * n_mfcc + 4 + num_chroma_bins
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}

fn column_mean(rows: &[Vec<f32>], column: usize) -> f32 {
    if rows.is_empty() {
        return 0.0;
    }
    rows.iter().map(|row| row.get(column).copied().unwrap_or(0.0)).sum::<f32>() / rows.len() as f32
}

fn column_std(rows: &[Vec<f32>], column: usize, mean: f32) -> f32 {
    if rows.is_empty() {
        return 0.0;
    }
    let variance = rows
        .iter()
        .map(|row| {
            let d = row.get(column).copied().unwrap_or(0.0) - mean;
            d * d
        })
        .sum::<f32>()
        / rows.len() as f32;
    variance.sqrt()
}

/// Nearest-prototype classifier loaded from JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrototypeModel {
    pub labels: Vec<String>,
    pub prototypes: Vec<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_scale: Option<Vec<f32>>,
    pub temperature: f32,
}

impl PrototypeModel {
    /// Reduce a feature set to its summary vector
    ///
    /// Layout: MFCC means, MFCC standard deviations, means of centroid,
    /// zero-crossing rate, rolloff and bandwidth, then chroma means.
    pub fn summarize(features: &AudioFeatures) -> Vec<f32> {
        let n_mfcc = features.mfcc.first().map_or(0, Vec::len);
        let n_chroma = features.chroma.first().map_or(0, Vec::len);
        let mut summary = Vec::with_capacity(summary_len(n_mfcc, n_chroma));

        let mfcc_means: Vec<f32> = (0..n_mfcc)
            .map(|c| column_mean(&features.mfcc, c))
            .collect();
        let mfcc_stds: Vec<f32> = mfcc_means
            .iter()
            .enumerate()
            .map(|(c, &m)| column_std(&features.mfcc, c, m))
            .collect();
        summary.extend(mfcc_means);
        summary.extend(mfcc_stds);

        summary.push(mean(&features.spectral_centroid));
        summary.push(mean(&features.zero_crossing_rate));
        summary.push(mean(&features.spectral_rolloff));
        summary.push(mean(&features.spectral_bandwidth));

        summary.extend((0..n_chroma).map(|c| column_mean(&features.chroma, c)));
        summary
    }

    /// Build a model from labelled example summaries
    ///
    /// Each prototype is the mean of its class's examples; the scale of each
    /// dimension is its standard deviation over all examples.
    pub fn fit(
        classes: &[(String, Vec<Vec<f32>>)],
        temperature: f32,
    ) -> Result<Self, InferenceError> {
        let all: Vec<Vec<f32>> = classes
            .iter()
            .flat_map(|(_, examples)| examples.iter().cloned())
            .collect();
        let dims = all.first().map_or(0, Vec::len);

        let prototypes = classes
            .iter()
            .map(|(_, examples)| (0..dims).map(|d| column_mean(examples, d)).collect())
            .collect();
        let feature_scale = (0..dims)
            .map(|d| {
                let std = column_std(&all, d, column_mean(&all, d));
                if std > MIN_SCALE {
                    std
                } else {
                    1.0
                }
            })
            .collect();

        let model = Self {
            labels: classes.iter().map(|(label, _)| label.clone()).collect(),
            prototypes,
            feature_scale: Some(feature_scale),
            temperature,
        };
        model.validate()?;
        Ok(model)
    }

    pub fn from_json_str(json: &str) -> Result<Self, InferenceError> {
        let model: Self =
            serde_json::from_str(json).map_err(|e| InferenceError::ArtifactLoad {
                reason: format!("failed to parse model JSON: {}", e),
            })?;
        model.validate()?;
        Ok(model)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, InferenceError> {
        let contents =
            fs::read_to_string(&path).map_err(|e| InferenceError::ArtifactLoad {
                reason: format!("failed to read {:?}: {}", path.as_ref(), e),
            })?;
        let model = Self::from_json_str(&contents)?;
        log::info!(
            "[PrototypeModel] Loaded {} classes from {:?}",
            model.labels.len(),
            path.as_ref()
        );
        Ok(model)
    }

    pub fn to_json_string(&self) -> Result<String, InferenceError> {
        serde_json::to_string_pretty(self).map_err(|e| InferenceError::ArtifactLoad {
            reason: format!("failed to serialize model: {}", e),
        })
    }

    /// Length of the summary vector the model expects
    pub fn input_len(&self) -> usize {
        self.prototypes.first().map_or(0, Vec::len)
    }

    fn validate(&self) -> Result<(), InferenceError> {
        let invalid = |reason: String| Err(InferenceError::ArtifactLoad { reason });

        if self.labels.is_empty() {
            return invalid("model declares no labels".to_string());
        }
        if self.prototypes.len() != self.labels.len() {
            return invalid(format!(
                "{} prototypes for {} labels",
                self.prototypes.len(),
                self.labels.len()
            ));
        }
        let dims = self.input_len();
        if dims == 0 || self.prototypes.iter().any(|p| p.len() != dims) {
            return invalid("prototypes must share one non-zero length".to_string());
        }
        if self.prototypes.iter().flatten().any(|v| !v.is_finite()) {
            return invalid("prototypes contain non-finite values".to_string());
        }
        if let Some(scale) = &self.feature_scale {
            if scale.len() != dims {
                return invalid(format!("feature_scale has {} entries, expected {}", scale.len(), dims));
            }
            if scale.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
                return invalid("feature_scale entries must be positive".to_string());
            }
        }
        if !(self.temperature.is_finite() && self.temperature > 0.0) {
            return invalid(format!("temperature must be positive (got {})", self.temperature));
        }
        Ok(())
    }

    /// Squared scaled distance from `summary` to each prototype
    fn distances(&self, summary: &[f32]) -> Vec<f32> {
        self.prototypes
            .iter()
            .map(|prototype| {
                prototype
                    .iter()
                    .zip(summary)
                    .enumerate()
                    .map(|(d, (p, x))| {
                        let scale = self
                            .feature_scale
                            .as_ref()
                            .and_then(|s| s.get(d).copied())
                            .unwrap_or(1.0);
                        let z = (x - p) / scale;
                        z * z
                    })
                    .sum()
            })
            .collect()
    }
}

impl InferenceBackend for PrototypeModel {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn run(&self, features: &AudioFeatures) -> Result<Vec<f32>, InferenceError> {
        let summary = Self::summarize(features);
        if summary.len() != self.input_len() {
            return Err(InferenceError::InputShape {
                expected: self.input_len(),
                actual: summary.len(),
            });
        }

        let logits: Vec<f32> = self
            .distances(&summary)
            .into_iter()
            .map(|d| -d / self.temperature)
            .collect();
        let max_logit = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = logits.iter().map(|l| (l - max_logit).exp()).collect();
        let total: f32 = exps.iter().sum();
        if !(total.is_finite() && total > 0.0) {
            return Err(InferenceError::MalformedOutput {
                reason: "softmax normaliser is not finite".to_string(),
            });
        }
        Ok(exps.into_iter().map(|e| e / total).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features_with(mfcc: Vec<Vec<f32>>, scalar: f32, chroma: Vec<Vec<f32>>) -> AudioFeatures {
        let frames = mfcc.len();
        AudioFeatures {
            mfcc,
            spectral_centroid: vec![scalar; frames],
            zero_crossing_rate: vec![scalar; frames],
            spectral_rolloff: vec![scalar; frames],
            spectral_bandwidth: vec![scalar; frames],
            chroma,
        }
    }

    #[test]
    fn test_summarize_layout() {
        let features = features_with(
            vec![vec![1.0, 10.0], vec![3.0, 10.0]],
            5.0,
            vec![vec![0.0, 1.0, 0.5], vec![1.0, 1.0, 0.5]],
        );
        let summary = PrototypeModel::summarize(&features);
        assert_eq!(summary.len(), summary_len(2, 3));
        assert_eq!(&summary[..4], &[2.0, 10.0, 1.0, 0.0]);
        assert_eq!(&summary[4..8], &[5.0; 4]);
        assert_eq!(&summary[8..], &[0.5, 1.0, 0.5]);
    }

    #[test]
    fn test_softmax_prefers_nearest_prototype() {
        let model = PrototypeModel {
            labels: vec!["near".to_string(), "far".to_string()],
            prototypes: vec![vec![0.0; 7], vec![3.0; 7]],
            feature_scale: None,
            temperature: 1.0,
        };
        let features = features_with(vec![vec![0.0]; 4], 0.0, vec![vec![0.0]; 4]);
        let probs = model.run(&features).unwrap();
        assert_eq!(probs.len(), 2);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(probs[0] > 0.99);
    }

    #[test]
    fn test_input_shape_mismatch() {
        let model = PrototypeModel {
            labels: vec!["a".to_string()],
            prototypes: vec![vec![0.0; 10]],
            feature_scale: None,
            temperature: 1.0,
        };
        let features = features_with(vec![vec![0.0]; 2], 0.0, vec![vec![0.0]; 2]);
        assert!(matches!(
            model.run(&features),
            Err(InferenceError::InputShape {
                expected: 10,
                actual: 7
            })
        ));
    }

    #[test]
    fn test_fit_and_json_roundtrip() {
        let classes = vec![
            ("a".to_string(), vec![vec![0.0, 1.0], vec![2.0, 1.0]]),
            ("b".to_string(), vec![vec![10.0, 1.0]]),
        ];
        let model = PrototypeModel::fit(&classes, 0.5).unwrap();
        assert_eq!(model.prototypes, vec![vec![1.0, 1.0], vec![10.0, 1.0]]);
        let scale = model.feature_scale.clone().unwrap();
        assert!(scale[0] > 1.0);
        // Constant dimension is left unscaled
        assert_eq!(scale[1], 1.0);

        let json = model.to_json_string().unwrap();
        assert_eq!(PrototypeModel::from_json_str(&json).unwrap(), model);
    }

    #[test]
    fn test_rejects_invalid_artifacts() {
        assert!(PrototypeModel::from_json_str("not json").is_err());
        assert!(PrototypeModel::from_json_str(
            r#"{"labels":["a","b"],"prototypes":[[1.0]],"temperature":1.0}"#
        )
        .is_err());
        assert!(PrototypeModel::from_json_str(
            r#"{"labels":["a"],"prototypes":[[1.0]],"temperature":0.0}"#
        )
        .is_err());
        assert!(PrototypeModel::from_json_str(
            r#"{"labels":["a"],"prototypes":[[1.0]],"feature_scale":[-1.0],"temperature":1.0}"#
        )
        .is_err());
        assert!(PrototypeModel::load_from_file("/nonexistent/model.json").is_err());
    }
}
