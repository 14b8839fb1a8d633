// Feature extraction and inference error types

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Extraction error code constants
///
/// Error code range: 4001-4005
pub struct ExtractionErrorCodes {}

impl ExtractionErrorCodes {
    /// A frame produced an empty spectrum
    pub const EMPTY_SPECTRUM: i32 = 4001;

    /// A frame produced NaN or infinite values
    pub const NON_FINITE: i32 = 4002;

    /// Buffer sample rate differs from the configured rate
    pub const SAMPLE_RATE_MISMATCH: i32 = 4003;

    /// Produced features violate the fixed shape
    pub const SHAPE_MISMATCH: i32 = 4004;

    /// The caller stopped the extraction through its progress callback
    pub const CANCELLED: i32 = 4005;
}

/// Inference error code constants
///
/// Error code range: 5001-5004
pub struct InferenceErrorCodes {}

impl InferenceErrorCodes {
    /// Model artifact missing or unreadable
    pub const ARTIFACT_LOAD: i32 = 5001;

    /// Output length differs from the label set
    pub const LABEL_COUNT: i32 = 5002;

    /// Output contains non-finite, negative or unnormalised probabilities
    pub const MALFORMED_OUTPUT: i32 = 5003;

    /// Input features do not match what the model expects
    pub const INPUT_SHAPE: i32 = 5004;
}

/// Log an extraction error with structured context
pub fn log_extraction_error(err: &ExtractionError, context: &str) {
    error!(
        "Extraction error in {}: code={}, component=FeatureExtractor, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Log an inference error with structured context
pub fn log_inference_error(err: &InferenceError, context: &str) {
    error!(
        "Inference error in {}: code={}, component=InferenceEngine, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors raised by the feature extractor
///
/// Extraction never returns partial features: any of these aborts the job.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionError {
    EmptySpectrum { frame: usize },
    NonFinite { frame: usize, feature: &'static str },
    SampleRateMismatch { expected: u32, actual: u32 },
    ShapeMismatch { reason: String },
    /// Stopped at `frame` because the progress callback asked to
    Cancelled { frame: usize },
}

impl ErrorCode for ExtractionError {
    fn code(&self) -> i32 {
        match self {
            ExtractionError::EmptySpectrum { .. } => ExtractionErrorCodes::EMPTY_SPECTRUM,
            ExtractionError::NonFinite { .. } => ExtractionErrorCodes::NON_FINITE,
            ExtractionError::SampleRateMismatch { .. } => {
                ExtractionErrorCodes::SAMPLE_RATE_MISMATCH
            }
            ExtractionError::ShapeMismatch { .. } => ExtractionErrorCodes::SHAPE_MISMATCH,
            ExtractionError::Cancelled { .. } => ExtractionErrorCodes::CANCELLED,
        }
    }

    fn message(&self) -> String {
        match self {
            ExtractionError::EmptySpectrum { frame } => {
                format!("Empty spectrum at frame {}", frame)
            }
            ExtractionError::NonFinite { frame, feature } => {
                format!("Non-finite {} at frame {}", feature, frame)
            }
            ExtractionError::SampleRateMismatch { expected, actual } => format!(
                "Buffer sample rate {} Hz does not match configured {} Hz",
                actual, expected
            ),
            ExtractionError::ShapeMismatch { reason } => {
                format!("Feature shape mismatch: {}", reason)
            }
            ExtractionError::Cancelled { frame } => {
                format!("Extraction cancelled at frame {}", frame)
            }
        }
    }
}

impl fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ExtractionError (code {}): {}",
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for ExtractionError {}

/// Errors raised by the inference engine or its backing artifact
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceError {
    ArtifactLoad { reason: String },
    LabelCount { expected: usize, actual: usize },
    MalformedOutput { reason: String },
    InputShape { expected: usize, actual: usize },
}

impl ErrorCode for InferenceError {
    fn code(&self) -> i32 {
        match self {
            InferenceError::ArtifactLoad { .. } => InferenceErrorCodes::ARTIFACT_LOAD,
            InferenceError::LabelCount { .. } => InferenceErrorCodes::LABEL_COUNT,
            InferenceError::MalformedOutput { .. } => InferenceErrorCodes::MALFORMED_OUTPUT,
            InferenceError::InputShape { .. } => InferenceErrorCodes::INPUT_SHAPE,
        }
    }

    fn message(&self) -> String {
        match self {
            InferenceError::ArtifactLoad { reason } => {
                format!("Failed to load model artifact: {}", reason)
            }
            InferenceError::LabelCount { expected, actual } => format!(
                "Model returned {} probabilities for {} labels",
                actual, expected
            ),
            InferenceError::MalformedOutput { reason } => {
                format!("Malformed model output: {}", reason)
            }
            InferenceError::InputShape { expected, actual } => format!(
                "Model expects {} input features, got {}",
                expected, actual
            ),
        }
    }
}

impl fmt::Display for InferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InferenceError (code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for InferenceError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_error_codes() {
        assert_eq!(
            ExtractionError::EmptySpectrum { frame: 0 }.code(),
            ExtractionErrorCodes::EMPTY_SPECTRUM
        );
        assert_eq!(
            ExtractionError::NonFinite {
                frame: 3,
                feature: "spectrum"
            }
            .code(),
            ExtractionErrorCodes::NON_FINITE
        );
        assert_eq!(
            ExtractionError::SampleRateMismatch {
                expected: 22050,
                actual: 44100
            }
            .code(),
            ExtractionErrorCodes::SAMPLE_RATE_MISMATCH
        );
    }

    #[test]
    fn test_inference_error_messages() {
        let err = InferenceError::LabelCount {
            expected: 3,
            actual: 2,
        };
        assert_eq!(err.code(), InferenceErrorCodes::LABEL_COUNT);
        assert_eq!(err.message(), "Model returned 2 probabilities for 3 labels");

        let err = InferenceError::ArtifactLoad {
            reason: "missing".to_string(),
        };
        assert!(format!("{}", err).contains("5001"));
    }
}
