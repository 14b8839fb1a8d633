// Catalog and orchestration error types

use crate::config::ConfigError;
use crate::error::{DecodeError, ErrorCode, ExtractionError, InferenceError};
use log::error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Catalog error code constants
///
/// Error code range: 6001-6002
pub struct CatalogErrorCodes {}

impl CatalogErrorCodes {
    /// Record store could not be reached
    pub const UNAVAILABLE: i32 = 6001;

    /// Record store answered with data that could not be interpreted
    pub const MALFORMED_RECORD: i32 = 6002;
}

/// Pipeline error code constants
///
/// Error code range: 7001-7004
pub struct PipelineErrorCodes {}

impl PipelineErrorCodes {
    /// Job exceeded its wall-clock bound
    pub const TIMEOUT: i32 = 7001;

    /// Job was replaced by a newer submission
    pub const SUPERSEDED: i32 = 7002;

    /// Worker ended without a terminal message
    pub const WORKER_LOST: i32 = 7003;

    /// Lock poisoning, missing runtime or similar internal fault
    pub const INTERNAL: i32 = 7004;
}

/// Log a pipeline error with structured context
pub fn log_pipeline_error(err: &PipelineError, context: &str) {
    error!(
        "Pipeline error in {}: code={}, kind={}, component=PipelineOrchestrator, message={}",
        context,
        err.code(),
        err.kind(),
        err.message()
    );
}

/// Errors raised by the species record store
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogError {
    Unavailable { reason: String },
    MalformedRecord { reason: String },
}

impl ErrorCode for CatalogError {
    fn code(&self) -> i32 {
        match self {
            CatalogError::Unavailable { .. } => CatalogErrorCodes::UNAVAILABLE,
            CatalogError::MalformedRecord { .. } => CatalogErrorCodes::MALFORMED_RECORD,
        }
    }

    fn message(&self) -> String {
        match self {
            CatalogError::Unavailable { reason } => {
                format!("Species catalog unavailable: {}", reason)
            }
            CatalogError::MalformedRecord { reason } => {
                format!("Malformed species record: {}", reason)
            }
        }
    }
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CatalogError (code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for CatalogError {}

/// Stable failure kind carried by terminal error events
///
/// Callers branch on this rather than on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedFormat,
    FileTooLarge,
    CorruptAudio,
    Extraction,
    Inference,
    CatalogUnavailable,
    Timeout,
    Internal,
}

impl ErrorKind {
    /// Transport failures warrant "retry upload" rather than "try a different recording"
    pub fn is_transport(&self) -> bool {
        matches!(self, ErrorKind::CatalogUnavailable)
    }

    /// Failures detected before any decoding work
    pub fn is_validation(&self) -> bool {
        matches!(self, ErrorKind::UnsupportedFormat | ErrorKind::FileTooLarge)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedFormat => "unsupported_format",
            ErrorKind::FileTooLarge => "file_too_large",
            ErrorKind::CorruptAudio => "corrupt_audio",
            ErrorKind::Extraction => "extraction",
            ErrorKind::Inference => "inference",
            ErrorKind::CatalogUnavailable => "catalog_unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any failure that terminates a job or prevents an orchestrator from starting
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    Decode(DecodeError),
    Extraction(ExtractionError),
    Inference(InferenceError),
    Catalog(CatalogError),
    Config(ConfigError),
    Timeout { timeout_ms: u64 },
    Superseded { generation: u64 },
    WorkerLost { reason: String },
    Internal { reason: String },
}

impl PipelineError {
    /// Map the failure onto its stable kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Decode(DecodeError::UnsupportedFormat { .. }) => {
                ErrorKind::UnsupportedFormat
            }
            PipelineError::Decode(DecodeError::FileTooLarge { .. }) => ErrorKind::FileTooLarge,
            PipelineError::Decode(_) => ErrorKind::CorruptAudio,
            PipelineError::Extraction(_) => ErrorKind::Extraction,
            PipelineError::Inference(_) => ErrorKind::Inference,
            PipelineError::Catalog(_) => ErrorKind::CatalogUnavailable,
            PipelineError::Timeout { .. } => ErrorKind::Timeout,
            PipelineError::Config(_)
            | PipelineError::Superseded { .. }
            | PipelineError::WorkerLost { .. }
            | PipelineError::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub(crate) fn internal(reason: impl Into<String>) -> Self {
        PipelineError::Internal {
            reason: reason.into(),
        }
    }
}

impl ErrorCode for PipelineError {
    fn code(&self) -> i32 {
        match self {
            PipelineError::Decode(err) => err.code(),
            PipelineError::Extraction(err) => err.code(),
            PipelineError::Inference(err) => err.code(),
            PipelineError::Catalog(err) => err.code(),
            PipelineError::Config(err) => err.code(),
            PipelineError::Timeout { .. } => PipelineErrorCodes::TIMEOUT,
            PipelineError::Superseded { .. } => PipelineErrorCodes::SUPERSEDED,
            PipelineError::WorkerLost { .. } => PipelineErrorCodes::WORKER_LOST,
            PipelineError::Internal { .. } => PipelineErrorCodes::INTERNAL,
        }
    }

    fn message(&self) -> String {
        match self {
            PipelineError::Decode(err) => err.message(),
            PipelineError::Extraction(err) => err.message(),
            PipelineError::Inference(err) => err.message(),
            PipelineError::Catalog(err) => err.message(),
            PipelineError::Config(err) => err.message(),
            PipelineError::Timeout { timeout_ms } => {
                format!("Identification timed out after {} ms", timeout_ms)
            }
            PipelineError::Superseded { generation } => {
                format!("Job {} was superseded by a newer submission", generation)
            }
            PipelineError::WorkerLost { reason } => {
                format!("Pipeline worker stopped unexpectedly: {}", reason)
            }
            PipelineError::Internal { reason } => format!("Internal pipeline error: {}", reason),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PipelineError (code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for PipelineError {}

/// Serialisable summary of a terminal job failure
///
/// Carried by error events and returned to callers awaiting a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineFailure {
    pub kind: ErrorKind,
    pub code: i32,
    pub message: String,
}

impl From<&PipelineError> for PipelineFailure {
    fn from(err: &PipelineError) -> Self {
        Self {
            kind: err.kind(),
            code: err.code(),
            message: err.message(),
        }
    }
}

impl From<PipelineError> for PipelineFailure {
    fn from(err: PipelineError) -> Self {
        Self::from(&err)
    }
}

impl PipelineFailure {
    /// Whether the job lost to a newer submission rather than failing
    pub fn is_superseded(&self) -> bool {
        self.code == PipelineErrorCodes::SUPERSEDED
    }
}

impl ErrorCode for PipelineFailure {
    fn code(&self) -> i32 {
        self.code
    }

    fn message(&self) -> String {
        self.message.clone()
    }
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PipelineFailure::{} (code {}): {}",
            self.kind, self.code, self.message
        )
    }
}

impl std::error::Error for PipelineFailure {}

impl From<DecodeError> for PipelineError {
    fn from(err: DecodeError) -> Self {
        PipelineError::Decode(err)
    }
}

impl From<ExtractionError> for PipelineError {
    fn from(err: ExtractionError) -> Self {
        PipelineError::Extraction(err)
    }
}

impl From<InferenceError> for PipelineError {
    fn from(err: InferenceError) -> Self {
        PipelineError::Inference(err)
    }
}

impl From<CatalogError> for PipelineError {
    fn from(err: CatalogError) -> Self {
        PipelineError::Catalog(err)
    }
}

impl From<ConfigError> for PipelineError {
    fn from(err: ConfigError) -> Self {
        PipelineError::Config(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err: PipelineError = DecodeError::UnsupportedFormat {
            file_name: "a.txt".to_string(),
            mime_type: None,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
        assert!(err.kind().is_validation());

        let err: PipelineError = DecodeError::CorruptAudio {
            reason: "no samples".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::CorruptAudio);

        let err: PipelineError = CatalogError::Unavailable {
            reason: "offline".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::CatalogUnavailable);
        assert!(err.kind().is_transport());

        assert_eq!(
            PipelineError::Timeout { timeout_ms: 10 }.kind(),
            ErrorKind::Timeout
        );
        assert!(!ErrorKind::Timeout.is_transport());
    }

    #[test]
    fn test_codes_delegate_to_inner_error() {
        let err: PipelineError = ExtractionError::EmptySpectrum { frame: 2 }.into();
        assert_eq!(err.code(), 4001);
        assert_eq!(PipelineError::Timeout { timeout_ms: 1 }.code(), 7001);
        assert_eq!(PipelineError::internal("poisoned").code(), 7004);
    }

    #[test]
    fn test_failure_summary() {
        let failure = PipelineFailure::from(PipelineError::Superseded { generation: 3 });
        assert!(failure.is_superseded());
        assert_eq!(failure.kind, ErrorKind::Internal);

        let failure = PipelineFailure::from(PipelineError::Timeout { timeout_ms: 9 });
        assert!(!failure.is_superseded());
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["kind"], "timeout");
        assert_eq!(json["code"], 7001);
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::CatalogUnavailable).unwrap();
        assert_eq!(json, "\"catalog_unavailable\"");
        assert_eq!(ErrorKind::FileTooLarge.to_string(), "file_too_large");
    }
}
