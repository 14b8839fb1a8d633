//! Integration tests for reading recordings from disk
//!
//! Covers:
//! - Extension and size checks before the file is read
//! - Decoding a WAV file written to disk into a fixed-length feature set

use std::fs;
use std::path::PathBuf;

use birdcall_id::analysis::FeatureExtractor;
use birdcall_id::audio::{AudioDecoder, AudioInput};
use birdcall_id::config::{AppConfig, DecoderConfig};
use birdcall_id::error::DecodeError;
use birdcall_id::testing::{synth, wav};

/// Per-test scratch file, removed on drop
struct ScratchFile(PathBuf);

impl ScratchFile {
    fn new(name: &str, contents: &[u8]) -> Self {
        let path = std::env::temp_dir().join(format!("birdcall_{}_{}", std::process::id(), name));
        fs::write(&path, contents).expect("write scratch file");
        Self(path)
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.0);
    }
}

#[test]
fn test_text_file_is_rejected_by_extension() {
    let file = ScratchFile::new("notes.txt", b"not audio");
    let err = AudioInput::from_path(&file.0, &DecoderConfig::default()).unwrap_err();
    assert!(matches!(err, DecodeError::UnsupportedFormat { .. }), "{:?}", err);
}

#[test]
fn test_oversize_file_is_rejected_by_metadata() {
    let file = ScratchFile::new("too_big.wav", &vec![0u8; 4096]);
    let limits = DecoderConfig {
        max_file_bytes: 1024,
    };
    let err = AudioInput::from_path(&file.0, &limits).unwrap_err();
    assert_eq!(
        err,
        DecodeError::FileTooLarge {
            size_bytes: 4096,
            max_bytes: 1024
        }
    );
}

#[test]
fn test_missing_file_is_an_io_error() {
    let path = std::env::temp_dir().join("birdcall_definitely_missing.wav");
    let err = AudioInput::from_path(&path, &DecoderConfig::default()).unwrap_err();
    assert!(matches!(err, DecodeError::Io { .. }), "{:?}", err);
}

/// A 44.1 kHz recording longer than the fixed length is resampled and
/// truncated before extraction
#[test]
fn test_wav_on_disk_decodes_to_fixed_frame_count() {
    let mut config = AppConfig::default();
    config.audio.n_fft = 512;
    config.audio.hop_length = 256;
    config.audio.n_mels = 40;
    config.audio.max_length = 22_050;

    let samples = synth::sine(3_000.0, 1.5, 44_100, 0.5);
    let bytes = wav::encode_mono_i16(&samples, 44_100).expect("encode wav");
    let file = ScratchFile::new("long_call.wav", &bytes);

    let input = AudioInput::from_path(&file.0, &config.decoder).expect("read wav");
    assert_eq!(input.file_name, format!("birdcall_{}_long_call.wav", std::process::id()));

    let decoder = AudioDecoder::new(config.audio.sample_rate, config.decoder.clone());
    let buffer = decoder.decode(input).expect("decode");
    assert_eq!(buffer.sample_rate, 22_050);
    let expected = 33_075_i64;
    assert!(
        (buffer.len() as i64 - expected).abs() < 600,
        "resampled length {}",
        buffer.len()
    );

    let features = FeatureExtractor::new(config.audio.clone())
        .extract(&buffer)
        .expect("extract");
    assert_eq!(features.frame_count(), config.audio.frame_count());
    assert_eq!(features.mfcc[0].len(), config.audio.n_mfcc);
}
