//! Configuration management for the identification pipeline
//!
//! This module provides runtime configuration loading from JSON files so the
//! DSP parameters can be tuned against a trained model artifact without
//! recompilation. The configuration is frozen once an orchestrator is built.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::ErrorCode;

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub audio: AudioProcessorConfig,
    #[serde(default)]
    pub decoder: DecoderConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Window function applied to each frame before its transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    Hann,
    Hamming,
    Rectangular,
}

/// Feature extraction parameters
///
/// These must match the parameters the classifier artifact was trained with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioProcessorConfig {
    /// Target sample rate in Hz; decoded audio is resampled to this rate
    pub sample_rate: u32,
    /// Number of mel bands in the filterbank
    pub n_mels: usize,
    /// Number of cepstral coefficients kept per frame
    pub n_mfcc: usize,
    /// FFT size (also the frame length) in samples
    pub n_fft: usize,
    /// Stride between consecutive frames in samples
    pub hop_length: usize,
    /// Fixed input length in samples (truncate or zero-pad)
    pub max_length: usize,
    /// Number of pitch classes in the chroma vector
    pub num_chroma_bins: usize,
    /// Fraction of spectral energy below the rolloff frequency
    pub rolloff_percent: f32,
    /// Window applied before each FFT
    pub window: WindowKind,
}

impl Default for AudioProcessorConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22_050,
            n_mels: 128,
            n_mfcc: 13,
            n_fft: 2048,
            hop_length: 512,
            // 5 seconds at the default sample rate
            max_length: 22_050 * 5,
            num_chroma_bins: 12,
            rolloff_percent: 0.85,
            window: WindowKind::Hann,
        }
    }
}

impl AudioProcessorConfig {
    /// Number of frames produced for a `max_length` input
    pub fn frame_count(&self) -> usize {
        if self.max_length < self.n_fft || self.hop_length == 0 {
            return 0;
        }
        1 + (self.max_length - self.n_fft) / self.hop_length
    }

    /// Number of magnitude bins per frame
    pub fn num_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }
}

/// Input validation limits applied before decoding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Maximum accepted file size in bytes
    pub max_file_bytes: u64,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 50 * 1024 * 1024,
        }
    }
}

/// Orchestrator behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Wall-clock bound for one job before it fails with a timeout
    pub job_timeout_ms: u64,
    /// Buffer size of the event broadcast channel
    pub event_channel_capacity: usize,
    /// Length of the synthetic signal run during warm-up, in milliseconds
    pub warm_up_signal_ms: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            job_timeout_ms: 30_000,
            event_channel_capacity: 64,
            warm_up_signal_ms: 500,
        }
    }
}

/// Configuration rejected by [`AppConfig::validate`] or unreadable on disk
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError {
    pub reason: String,
}

impl ConfigError {
    fn invalid(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl ErrorCode for ConfigError {
    fn code(&self) -> i32 {
        8001
    }

    fn message(&self) -> String {
        format!("Invalid configuration: {}", self.reason)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConfigError (code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for ConfigError {}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// Missing or unparsable files fall back to [`AppConfig::default`] with a warning.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match Self::try_load_from_file(&path) {
            Ok(config) => {
                log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                config
            }
            Err(err) => {
                log::warn!(
                    "[Config] {} ({:?}). Using defaults.",
                    err.reason,
                    path.as_ref()
                );
                Self::default()
            }
        }
    }

    /// Load and validate configuration from a JSON file
    pub fn try_load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(&path)
            .map_err(|err| ConfigError::invalid(format!("failed to read config file: {}", err)))?;
        let config: AppConfig = serde_json::from_str(&contents)
            .map_err(|err| ConfigError::invalid(format!("failed to parse JSON: {}", err)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants the pipeline relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        let audio = &self.audio;
        if audio.sample_rate == 0 {
            return Err(ConfigError::invalid("sample_rate must be > 0"));
        }
        if audio.n_fft == 0 || !audio.n_fft.is_power_of_two() {
            return Err(ConfigError::invalid(format!(
                "n_fft must be a power of two (got {})",
                audio.n_fft
            )));
        }
        if audio.hop_length == 0 {
            return Err(ConfigError::invalid("hop_length must be > 0"));
        }
        if audio.max_length < audio.n_fft {
            return Err(ConfigError::invalid(format!(
                "max_length ({}) must be at least n_fft ({})",
                audio.max_length, audio.n_fft
            )));
        }
        if audio.n_mels == 0 || audio.n_mfcc == 0 || audio.n_mfcc > audio.n_mels {
            return Err(ConfigError::invalid(format!(
                "n_mfcc ({}) must be in 1..=n_mels ({})",
                audio.n_mfcc, audio.n_mels
            )));
        }
        if audio.num_chroma_bins == 0 {
            return Err(ConfigError::invalid("num_chroma_bins must be > 0"));
        }
        if !(audio.rolloff_percent > 0.0 && audio.rolloff_percent < 1.0) {
            return Err(ConfigError::invalid(format!(
                "rolloff_percent must be in (0, 1) (got {})",
                audio.rolloff_percent
            )));
        }
        if self.decoder.max_file_bytes == 0 {
            return Err(ConfigError::invalid("max_file_bytes must be > 0"));
        }
        if self.pipeline.job_timeout_ms == 0 {
            return Err(ConfigError::invalid("job_timeout_ms must be > 0"));
        }
        if self.pipeline.event_channel_capacity == 0 {
            return Err(ConfigError::invalid("event_channel_capacity must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.audio.sample_rate, 22_050);
        assert_eq!(config.audio.n_mfcc, 13);
        assert_eq!(config.audio.num_chroma_bins, 12);
        assert_eq!(config.decoder.max_file_bytes, 50 * 1024 * 1024);
        assert_eq!(config.pipeline.job_timeout_ms, 30_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = AppConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{ "audio": { "n_mfcc": 20, "window": "hamming" } }"#).unwrap();
        assert_eq!(parsed.audio.n_mfcc, 20);
        assert_eq!(parsed.audio.window, WindowKind::Hamming);
        assert_eq!(parsed.audio.n_fft, 2048);
        assert_eq!(parsed.pipeline, PipelineConfig::default());
    }

    #[test]
    fn test_frame_count() {
        let audio = AudioProcessorConfig {
            n_fft: 1024,
            hop_length: 256,
            max_length: 1024 + 256 * 9,
            ..AudioProcessorConfig::default()
        };
        assert_eq!(audio.frame_count(), 10);
        assert_eq!(audio.num_bins(), 513);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.audio.n_fft = 1000;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.audio.n_mfcc = config.audio.n_mels + 1;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.audio.max_length = 16;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.pipeline.job_timeout_ms = 0;
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), 8001);
        assert!(err.message().contains("job_timeout_ms"));
    }

    #[test]
    fn test_load_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load_from_file("/nonexistent/birdcall_config.json");
        assert_eq!(config, AppConfig::default());
        assert!(AppConfig::try_load_from_file("/nonexistent/birdcall_config.json").is_err());
    }
}
