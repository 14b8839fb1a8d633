// InferenceEngine - call contract around the pre-trained classifier
//
// The classifier is an opaque artifact behind the `InferenceBackend` trait.
// The engine owns a backend, checks every output it returns (label count,
// finiteness, non-negativity, normalisation) and turns the raw vector into
// a `PredictionResult`. Malformed output never leaves this module.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::analysis::features::AudioFeatures;
use crate::error::InferenceError;

/// Allowed deviation of the probability sum from 1
pub const PROBABILITY_TOLERANCE: f32 = 1e-3;

/// Trait implemented by classifier backends.
///
/// `run` returns one probability per label, in the order of `labels()`.
pub trait InferenceBackend: Send + Sync {
    fn labels(&self) -> &[String];
    fn run(&self, features: &AudioFeatures) -> Result<Vec<f32>, InferenceError>;
}

/// Top class plus the full probability mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub label: String,
    /// Probability of `label`, in [0, 1]
    pub confidence: f32,
    pub probabilities: BTreeMap<String, f32>,
}

impl PredictionResult {
    /// Validate a raw output vector and pick the most probable label
    ///
    /// Ties resolve to the label listed first.
    pub fn from_probabilities(labels: &[String], output: &[f32]) -> Result<Self, InferenceError> {
        if output.len() != labels.len() {
            return Err(InferenceError::LabelCount {
                expected: labels.len(),
                actual: output.len(),
            });
        }
        if let Some(p) = output.iter().find(|p| !p.is_finite()) {
            return Err(InferenceError::MalformedOutput {
                reason: format!("non-finite probability {}", p),
            });
        }
        if let Some(p) = output.iter().find(|&&p| p < 0.0) {
            return Err(InferenceError::MalformedOutput {
                reason: format!("negative probability {}", p),
            });
        }
        let sum: f32 = output.iter().sum();
        if (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(InferenceError::MalformedOutput {
                reason: format!("probabilities sum to {}", sum),
            });
        }

        let mut best = 0;
        for (i, &p) in output.iter().enumerate() {
            if p > output[best] {
                best = i;
            }
        }

        Ok(Self {
            label: labels[best].clone(),
            confidence: output[best].min(1.0),
            probabilities: labels.iter().cloned().zip(output.iter().copied()).collect(),
        })
    }

    /// Labels ordered from most to least probable
    pub fn ranked(&self) -> Vec<(&str, f32)> {
        let mut ranked: Vec<(&str, f32)> = self
            .probabilities
            .iter()
            .map(|(label, &p)| (label.as_str(), p))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }
}

/// Validating wrapper around an [`InferenceBackend`]
#[derive(Clone)]
pub struct InferenceEngine {
    backend: Arc<dyn InferenceBackend>,
}

impl std::fmt::Debug for InferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceEngine")
            .field("labels", &self.backend.labels())
            .finish()
    }
}

impl InferenceEngine {
    /// Wrap a backend after checking its label set
    pub fn new(backend: Arc<dyn InferenceBackend>) -> Result<Self, InferenceError> {
        let labels = backend.labels();
        if labels.is_empty() {
            return Err(InferenceError::ArtifactLoad {
                reason: "model declares no labels".to_string(),
            });
        }
        let mut seen = HashSet::new();
        if let Some(dup) = labels.iter().find(|label| !seen.insert(label.as_str())) {
            return Err(InferenceError::ArtifactLoad {
                reason: format!("duplicate label {:?}", dup),
            });
        }
        Ok(Self { backend })
    }

    pub fn labels(&self) -> &[String] {
        self.backend.labels()
    }

    /// Run the classifier and validate its output
    pub fn predict(&self, features: &AudioFeatures) -> Result<PredictionResult, InferenceError> {
        let output = self.backend.run(features)?;
        let result = PredictionResult::from_probabilities(self.backend.labels(), &output)?;
        log::debug!(
            "[InferenceEngine] top label {} ({:.3})",
            result.label,
            result.confidence
        );
        Ok(result)
    }
}
