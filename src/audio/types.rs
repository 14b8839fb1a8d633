// Audio types - submitted input files and decoded sample buffers

use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::config::DecoderConfig;
use crate::error::DecodeError;

/// Container/codec families accepted by the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    Wav,
    Mp3,
    Ogg,
    M4a,
}

/// MIME types that carry no format information and defer to the extension
const GENERIC_MIME_TYPES: &[&str] = &["application/octet-stream", "binary/octet-stream"];

impl AudioFormat {
    /// Resolve a MIME type (parameters such as `; codecs=...` are ignored)
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "audio/wav" | "audio/x-wav" | "audio/wave" | "audio/vnd.wave" => Some(Self::Wav),
            "audio/mpeg" | "audio/mp3" | "audio/mpeg3" | "audio/x-mpeg-3" => Some(Self::Mp3),
            "audio/ogg" | "application/ogg" | "audio/vorbis" => Some(Self::Ogg),
            "audio/mp4" | "audio/m4a" | "audio/x-m4a" | "audio/aac" => Some(Self::M4a),
            _ => None,
        }
    }

    /// Resolve a file extension, case-insensitively
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "wav" | "wave" => Some(Self::Wav),
            "mp3" => Some(Self::Mp3),
            "ogg" | "oga" => Some(Self::Ogg),
            "m4a" | "mp4" | "aac" => Some(Self::M4a),
            _ => None,
        }
    }

    /// Detect the format of a submission, MIME type first
    ///
    /// A specific MIME type that is not an accepted audio type rejects the
    /// file even when its extension looks valid.
    pub fn detect(file_name: &str, mime_type: Option<&str>) -> Result<Self, DecodeError> {
        let unsupported = || DecodeError::UnsupportedFormat {
            file_name: file_name.to_string(),
            mime_type: mime_type.map(str::to_string),
        };

        if let Some(mime) = mime_type.map(str::trim).filter(|m| !m.is_empty()) {
            let generic = GENERIC_MIME_TYPES
                .iter()
                .any(|g| mime.eq_ignore_ascii_case(g));
            if !generic {
                return Self::from_mime(mime).ok_or_else(unsupported);
            }
        }

        Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
            .ok_or_else(unsupported)
    }

    /// Extension passed to the container probe as a hint
    pub fn extension_hint(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::Ogg => "ogg",
            Self::M4a => "m4a",
        }
    }
}

/// A submitted recording, not yet validated
#[derive(Debug, Clone, PartialEq)]
pub struct AudioInput {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub data: Vec<u8>,
}

impl AudioInput {
    pub fn new(file_name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: None,
            data,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }

    /// Read a recording from disk
    ///
    /// The extension and the on-disk size are checked before the file is
    /// read, so unsupported or oversize files are never loaded.
    pub fn from_path<P: AsRef<Path>>(path: P, limits: &DecoderConfig) -> Result<Self, DecodeError> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();

        AudioFormat::detect(&file_name, None)?;

        let size_bytes = fs::metadata(path)?.len();
        if size_bytes > limits.max_file_bytes {
            return Err(DecodeError::FileTooLarge {
                size_bytes,
                max_bytes: limits.max_file_bytes,
            });
        }

        let data = fs::read(path)?;
        Ok(Self::new(file_name, data))
    }
}

/// Decoded mono PCM samples at the pipeline sample rate
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}
