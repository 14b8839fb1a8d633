// Error types for the bird call identification pipeline
//
// Every stage has its own error family with stable numeric codes. Terminal
// pipeline failures carry an `ErrorKind` so callers can pick a presentation
// ("try a different recording" vs. "retry upload") without parsing text.

mod analysis;
mod decode;
mod pipeline;

pub use analysis::{
    log_extraction_error, log_inference_error, ExtractionError, ExtractionErrorCodes,
    InferenceError, InferenceErrorCodes,
};
pub use decode::{log_decode_error, DecodeError, DecodeErrorCodes};
pub use pipeline::{
    log_pipeline_error, CatalogError, CatalogErrorCodes, ErrorKind, PipelineError,
    PipelineErrorCodes, PipelineFailure,
};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the CLI, HTTP and event-stream surfaces.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
