// Decode error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Decode error code constants
///
/// Error code range: 3001-3005
pub struct DecodeErrorCodes {}

impl DecodeErrorCodes {
    /// File type is not on the audio allow-list
    pub const UNSUPPORTED_FORMAT: i32 = 3001;

    /// File exceeds the configured size limit
    pub const FILE_TOO_LARGE: i32 = 3002;

    /// Decoding produced no usable samples or metadata
    pub const CORRUPT_AUDIO: i32 = 3003;

    /// Reading the source file failed
    pub const IO_FAILURE: i32 = 3004;

    /// Resampling to the pipeline rate failed
    pub const RESAMPLE_FAILED: i32 = 3005;
}

/// Log a decode error with structured context
pub fn log_decode_error(err: &DecodeError, context: &str) {
    error!(
        "Decode error in {}: code={}, component=AudioDecoder, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors raised while validating or decoding an input file
///
/// `UnsupportedFormat` and `FileTooLarge` are raised before any decoding
/// work is attempted.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Extension/MIME type not accepted
    UnsupportedFormat {
        file_name: String,
        mime_type: Option<String>,
    },

    /// File larger than the configured limit
    FileTooLarge { size_bytes: u64, max_bytes: u64 },

    /// Container or codec data could not be turned into samples
    CorruptAudio { reason: String },

    /// File could not be read
    Io { details: String },

    /// Resampler construction or processing failed
    ResampleFailed { reason: String },
}

impl ErrorCode for DecodeError {
    fn code(&self) -> i32 {
        match self {
            DecodeError::UnsupportedFormat { .. } => DecodeErrorCodes::UNSUPPORTED_FORMAT,
            DecodeError::FileTooLarge { .. } => DecodeErrorCodes::FILE_TOO_LARGE,
            DecodeError::CorruptAudio { .. } => DecodeErrorCodes::CORRUPT_AUDIO,
            DecodeError::Io { .. } => DecodeErrorCodes::IO_FAILURE,
            DecodeError::ResampleFailed { .. } => DecodeErrorCodes::RESAMPLE_FAILED,
        }
    }

    fn message(&self) -> String {
        match self {
            DecodeError::UnsupportedFormat {
                file_name,
                mime_type,
            } => match mime_type {
                Some(mime) => format!(
                    "Unsupported audio format: {} ({}). Use WAV, MP3, OGG or M4A.",
                    file_name, mime
                ),
                None => format!(
                    "Unsupported audio format: {}. Use WAV, MP3, OGG or M4A.",
                    file_name
                ),
            },
            DecodeError::FileTooLarge {
                size_bytes,
                max_bytes,
            } => format!(
                "File too large: {} bytes (limit {} bytes)",
                size_bytes, max_bytes
            ),
            DecodeError::CorruptAudio { reason } => format!("Corrupt audio: {}", reason),
            DecodeError::Io { details } => format!("Failed to read audio file: {}", details),
            DecodeError::ResampleFailed { reason } => format!("Resampling failed: {}", reason),
        }
    }
}

impl DecodeError {
    /// Whether this error was raised by cheap pre-decode validation
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DecodeError::UnsupportedFormat { .. } | DecodeError::FileTooLarge { .. }
        )
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DecodeError (code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for DecodeError {}

impl From<std::io::Error> for DecodeError {
    fn from(err: std::io::Error) -> Self {
        DecodeError::Io {
            details: err.to_string(),
        }
    }
}
