// ResultResolver - confidence gating and catalog matching
//
// Pure decision step between inference and the caller. A prediction below
// the confidence threshold completes normally without a species record; a
// confident prediction is matched against the catalog, and a missing record
// is a distinct normal outcome rather than an error.

use serde::{Deserialize, Serialize};

use crate::analysis::inference::PredictionResult;
use crate::catalog::SpeciesRecord;
use crate::error::{ErrorCode, ErrorKind, PipelineError};

/// Minimum top-class probability for a result to be shown as a match
pub const CONFIDENCE_THRESHOLD: f32 = 0.8;

/// How a completed job should be presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOutcome {
    /// Confident match with a catalog record
    Identified,
    /// Top class below the threshold ("no identification found")
    NoConfidentMatch,
    /// Confident class with no catalog record ("species not found in catalog")
    NotInCatalog,
}

/// Pipeline output consumed by the caller
///
/// Serialises to the identify payload: `bird_data`, `confidence`,
/// `scientific_nm` and `error`, plus the presentation fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bird_data: Option<SpeciesRecord>,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scientific_nm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<MatchOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl PredictData {
    /// Result stored for a failed job
    pub fn failed(err: &PipelineError) -> Self {
        Self {
            error: Some(err.message()),
            error_kind: Some(err.kind()),
            ..Self::default()
        }
    }

    /// Whether a species card should be shown
    pub fn is_match(&self) -> bool {
        self.outcome == Some(MatchOutcome::Identified) && self.bird_data.is_some()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Applies the confidence gate and maps the top class to a catalog record
#[derive(Debug, Clone, Copy)]
pub struct ResultResolver {
    threshold: f32,
}

impl Default for ResultResolver {
    fn default() -> Self {
        Self {
            threshold: CONFIDENCE_THRESHOLD,
        }
    }
}

impl ResultResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Whether `prediction` clears the gate and needs a catalog lookup
    pub fn needs_lookup(&self, prediction: &PredictionResult) -> bool {
        prediction.confidence >= self.threshold
    }

    /// Resolve a prediction into caller-facing data
    ///
    /// `lookup` is only invoked when the confidence clears the threshold.
    pub fn resolve<F>(&self, prediction: &PredictionResult, lookup: F) -> PredictData
    where
        F: FnOnce(&str) -> Option<SpeciesRecord>,
    {
        let mut data = PredictData {
            confidence: prediction.confidence,
            class_name: Some(prediction.label.clone()),
            ..PredictData::default()
        };

        if !self.needs_lookup(prediction) {
            data.outcome = Some(MatchOutcome::NoConfidentMatch);
            return data;
        }

        match lookup(&prediction.label) {
            Some(record) => {
                data.scientific_nm = Some(record.scientific_name.clone());
                data.bird_data = Some(record);
                data.outcome = Some(MatchOutcome::Identified);
            }
            None => {
                data.outcome = Some(MatchOutcome::NotInCatalog);
            }
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn prediction(label: &str, confidence: f32) -> PredictionResult {
        let mut probabilities = BTreeMap::new();
        probabilities.insert(label.to_string(), confidence);
        probabilities.insert("other".to_string(), 1.0 - confidence);
        PredictionResult {
            label: label.to_string(),
            confidence,
            probabilities,
        }
    }

    fn blackbird() -> SpeciesRecord {
        SpeciesRecord::new("turdus_merula", "Turdus merula", "Common blackbird")
    }

    #[test]
    fn test_below_threshold_skips_lookup() {
        let mut called = false;
        let data = ResultResolver::new().resolve(&prediction("turdus_merula", 0.5), |_| {
            called = true;
            Some(blackbird())
        });
        assert!(!called);
        assert!(data.bird_data.is_none());
        assert_eq!(data.outcome, Some(MatchOutcome::NoConfidentMatch));
        assert_eq!(data.class_name.as_deref(), Some("turdus_merula"));
        assert!(!data.is_error());
        assert!(!data.is_match());
    }

    #[test]
    fn test_confident_match() {
        let data = ResultResolver::new().resolve(&prediction("turdus_merula", 0.95), |id| {
            assert_eq!(id, "turdus_merula");
            Some(blackbird())
        });
        assert!(data.is_match());
        assert_eq!(data.scientific_nm.as_deref(), Some("Turdus merula"));
        assert!((data.confidence - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let data = ResultResolver::new().resolve(&prediction("turdus_merula", 0.8), |_| {
            Some(blackbird())
        });
        assert_eq!(data.outcome, Some(MatchOutcome::Identified));
    }

    #[test]
    fn test_confident_but_not_catalogued() {
        let data = ResultResolver::new().resolve(&prediction("unknown_species", 0.95), |_| None);
        assert!(data.bird_data.is_none());
        assert_eq!(data.outcome, Some(MatchOutcome::NotInCatalog));
        assert!(!data.is_error());
    }

    #[test]
    fn test_payload_shape() {
        let data = ResultResolver::new().resolve(&prediction("turdus_merula", 0.9), |_| {
            Some(blackbird())
        });
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["bird_data"]["id"], "turdus_merula");
        assert_eq!(json["scientific_nm"], "Turdus merula");
        assert_eq!(json["outcome"], "identified");
        assert!(json.get("error").is_none());

        let failed = PredictData::failed(&PipelineError::Timeout { timeout_ms: 5 });
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["error_kind"], "timeout");
        assert!(json.get("bird_data").is_none());
    }
}
