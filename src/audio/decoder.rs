// AudioDecoder - validates submissions and decodes them to mono PCM
//
// Validation (format allow-list, size limit) runs before any container
// probing. Decoding uses symphonia over an in-memory cursor; the source
// bytes are dropped as soon as decoding finishes. With a sample limit set,
// packets stop being read once enough source frames exist to fill it.

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::resampler;
use super::types::{AudioBuffer, AudioFormat, AudioInput};
use crate::config::DecoderConfig;
use crate::error::DecodeError;

/// Extra source frames decoded past the limit so the resampler's filter
/// tail does not eat into the kept samples
const LIMIT_MARGIN_FRAMES: usize = 2048;

/// Decodes submitted recordings to mono samples at a fixed rate
#[derive(Debug, Clone)]
pub struct AudioDecoder {
    target_sample_rate: u32,
    limits: DecoderConfig,
    max_samples: Option<usize>,
}

impl AudioDecoder {
    pub fn new(target_sample_rate: u32, limits: DecoderConfig) -> Self {
        Self {
            target_sample_rate,
            limits,
            max_samples: None,
        }
    }

    /// Keep at most `max_samples` output samples and stop decoding early
    pub fn with_sample_limit(mut self, max_samples: usize) -> Self {
        self.max_samples = Some(max_samples);
        self
    }

    pub fn sample_limit(&self) -> Option<usize> {
        self.max_samples
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    pub fn limits(&self) -> &DecoderConfig {
        &self.limits
    }

    /// Cheap pre-decode checks: accepted format and size limit
    pub fn validate(&self, input: &AudioInput) -> Result<AudioFormat, DecodeError> {
        let format = AudioFormat::detect(&input.file_name, input.mime_type.as_deref())?;
        let size_bytes = input.size_bytes();
        if size_bytes > self.limits.max_file_bytes {
            return Err(DecodeError::FileTooLarge {
                size_bytes,
                max_bytes: self.limits.max_file_bytes,
            });
        }
        Ok(format)
    }

    /// Validate and decode a submission
    pub fn decode(&self, input: AudioInput) -> Result<AudioBuffer, DecodeError> {
        let format = self.validate(&input)?;
        self.decode_validated(input, format)
    }

    /// Decode a submission that already passed [`AudioDecoder::validate`]
    pub fn decode_validated(
        &self,
        input: AudioInput,
        format: AudioFormat,
    ) -> Result<AudioBuffer, DecodeError> {
        let AudioInput {
            file_name, data, ..
        } = input;
        tracing::debug!(
            file = %file_name,
            format = ?format,
            bytes = data.len(),
            "decoding submission"
        );

        let target_rate = self.target_sample_rate;
        let source_limit = |source_rate: u32| {
            self.max_samples
                .map(|max| source_frames_for(max, source_rate, target_rate))
        };
        let (samples, source_rate) = decode_to_mono(data, format, source_limit)?;
        if samples.is_empty() {
            return Err(DecodeError::CorruptAudio {
                reason: format!("{} contains no audio samples", file_name),
            });
        }

        let mut samples = resampler::resample(samples, source_rate, target_rate)?;
        if let Some(max) = self.max_samples {
            samples.truncate(max);
        }
        let buffer = AudioBuffer::new(samples, self.target_sample_rate);

        tracing::debug!(
            file = %file_name,
            source_rate,
            samples = buffer.len(),
            duration_ms = buffer.duration().as_millis() as u64,
            "decoded submission"
        );
        Ok(buffer)
    }
}

fn corrupt(reason: impl Into<String>) -> DecodeError {
    DecodeError::CorruptAudio {
        reason: reason.into(),
    }
}

/// Source frames needed to produce `max_samples` at `target_rate`, plus margin
fn source_frames_for(max_samples: usize, source_rate: u32, target_rate: u32) -> usize {
    if target_rate == 0 {
        return max_samples.saturating_add(LIMIT_MARGIN_FRAMES);
    }
    let frames = (max_samples as u64 * source_rate as u64).div_ceil(target_rate as u64);
    (frames as usize).saturating_add(LIMIT_MARGIN_FRAMES)
}

/// Decode the first audio track and downmix it to mono
///
/// `frame_limit` maps the track's sample rate to the number of mono frames
/// worth decoding; `None` decodes to the end of the stream.
fn decode_to_mono<L>(
    data: Vec<u8>,
    format: AudioFormat,
    frame_limit: L,
) -> Result<(Vec<f32>, u32), DecodeError>
where
    L: FnOnce(u32) -> Option<usize>,
{
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(format.extension_hint());

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| corrupt(format!("failed to probe container: {}", e)))?;
    let mut reader = probed.format;

    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| corrupt("no audio track found"))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| corrupt("sample rate metadata missing"))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| corrupt(format!("unsupported codec: {}", e)))?;

    let frame_limit = frame_limit(sample_rate);
    let mut mono: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        if let Some(limit) = frame_limit {
            if mono.len() >= limit {
                tracing::debug!(frames = mono.len(), limit, "sample limit reached, stopping decode");
                break;
            }
        }
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(corrupt(format!("failed to read packet: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::warn!("Decode error (skipping packet): {}", e);
                continue;
            }
            Err(e) => return Err(corrupt(format!("fatal decode error: {}", e))),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let needs_alloc = sample_buf
            .as_ref()
            .map_or(true, |buf| buf.capacity() < decoded.capacity());
        if needs_alloc {
            sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }
        if let Some(buf) = sample_buf.as_mut() {
            buf.copy_interleaved_ref(decoded);
            downmix_into(buf.samples(), channels, &mut mono);
        }
    }

    Ok((mono, sample_rate))
}

/// Average interleaved channels into `out`
fn downmix_into(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels == 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    let scale = 1.0 / channels as f32;
    out.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * scale),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{synth, wav};

    fn decoder() -> AudioDecoder {
        AudioDecoder::new(22_050, DecoderConfig::default())
    }

    #[test]
    fn test_downmix_stereo() {
        let mut out = Vec::new();
        downmix_into(&[1.0, 0.0, 0.5, 0.5, 0.0, 1.0], 2, &mut out);
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_rejects_text_file_before_decoding() {
        let input = AudioInput::new("notes.txt", b"not audio".to_vec());
        let err = decoder().decode(input).unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_rejects_oversize_file() {
        let decoder = AudioDecoder::new(22_050, DecoderConfig { max_file_bytes: 16 });
        let input = AudioInput::new("call.wav", vec![0u8; 17]);
        let err = decoder.validate(&input).unwrap_err();
        assert_eq!(
            err,
            DecodeError::FileTooLarge {
                size_bytes: 17,
                max_bytes: 16
            }
        );
    }

    #[test]
    fn test_garbage_wav_is_corrupt() {
        let input = AudioInput::new("call.wav", vec![0x42; 512]);
        let err = decoder().decode(input).unwrap_err();
        assert!(matches!(err, DecodeError::CorruptAudio { .. }));
    }

    #[test]
    fn test_decodes_wav_at_pipeline_rate() {
        let samples = synth::sine(2_000.0, 1.0, 22_050, 0.5);
        let bytes = wav::encode_mono_i16(&samples, 22_050).unwrap();
        let buffer = decoder()
            .decode(AudioInput::new("call.wav", bytes))
            .unwrap();
        assert_eq!(buffer.sample_rate, 22_050);
        assert_eq!(buffer.len(), 22_050);
        assert!((buffer.samples[100] - samples[100]).abs() < 1e-3);
    }

    #[test]
    fn test_decodes_and_resamples_stereo_wav() {
        let samples = synth::sine(1_000.0, 0.5, 44_100, 0.5);
        let bytes = wav::encode_stereo_i16(&samples, &samples, 44_100).unwrap();
        let buffer = decoder()
            .decode(AudioInput::new("call.wav", bytes))
            .unwrap();
        assert_eq!(buffer.sample_rate, 22_050);
        let expected = 22_050 / 2;
        assert!((buffer.len() as i64 - expected as i64).abs() < 600);
    }

    #[test]
    fn test_empty_wav_is_corrupt() {
        let bytes = wav::encode_mono_i16(&[], 22_050).unwrap();
        let err = decoder()
            .decode(AudioInput::new("silence.wav", bytes))
            .unwrap_err();
        assert!(matches!(err, DecodeError::CorruptAudio { .. }));
    }

    #[test]
    fn test_source_frames_cover_limit() {
        assert_eq!(source_frames_for(22_050, 22_050, 22_050), 22_050 + LIMIT_MARGIN_FRAMES);
        assert_eq!(source_frames_for(22_050, 8_000, 22_050), 8_000 + LIMIT_MARGIN_FRAMES);
        // Rounds up so the resampled output still reaches the limit
        assert_eq!(source_frames_for(3, 2, 3), 2 + LIMIT_MARGIN_FRAMES);
        assert_eq!(source_frames_for(1, 44_100, 22_050), 2 + LIMIT_MARGIN_FRAMES);
    }

    #[test]
    fn test_long_recording_decodes_to_bounded_buffer() {
        let samples = synth::sine(1_500.0, 120.0, 8_000, 0.5);
        let bytes = wav::encode_mono_i16(&samples, 8_000).unwrap();
        let buffer = decoder()
            .with_sample_limit(22_050)
            .decode(AudioInput::new("dawn_chorus.wav", bytes))
            .unwrap();
        assert_eq!(buffer.sample_rate, 22_050);
        assert_eq!(buffer.len(), 22_050);
    }

    #[test]
    fn test_sample_limit_keeps_leading_samples() {
        let samples = synth::sine(2_000.0, 30.0, 22_050, 0.5);
        let bytes = wav::encode_mono_i16(&samples, 22_050).unwrap();
        let buffer = decoder()
            .with_sample_limit(11_025)
            .decode(AudioInput::new("call.wav", bytes))
            .unwrap();
        assert_eq!(buffer.len(), 11_025);
        assert!((buffer.samples[11_000] - samples[11_000]).abs() < 1e-3);
    }

    #[test]
    fn test_short_recording_is_unaffected_by_limit() {
        let samples = synth::sine(2_000.0, 0.5, 22_050, 0.5);
        let bytes = wav::encode_mono_i16(&samples, 22_050).unwrap();
        let buffer = decoder()
            .with_sample_limit(110_250)
            .decode(AudioInput::new("call.wav", bytes))
            .unwrap();
        assert_eq!(buffer.len(), 11_025);
    }
}
