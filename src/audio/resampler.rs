// Resampler - converts decoded audio to the pipeline sample rate
//
// Uses rubato's windowed-sinc resampler. Input is fed in fixed-size chunks
// with the final chunk zero-padded, then the output is trimmed to the
// duration-preserving length.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::DecodeError;

const CHUNK_SIZE: usize = 1024;

/// Resample mono audio from `source_rate` to `target_rate`
///
/// Returns the input unchanged when the rates already match.
pub fn resample(
    samples: Vec<f32>,
    source_rate: u32,
    target_rate: u32,
) -> Result<Vec<f32>, DecodeError> {
    if source_rate == target_rate || samples.is_empty() {
        return Ok(samples);
    }
    if source_rate == 0 || target_rate == 0 {
        return Err(DecodeError::ResampleFailed {
            reason: format!("invalid rates {} -> {}", source_rate, target_rate),
        });
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = target_rate as f64 / source_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, CHUNK_SIZE, 1).map_err(
        |e| DecodeError::ResampleFailed {
            reason: format!("failed to create resampler: {}", e),
        },
    )?;

    let expected_len = (samples.len() as f64 * ratio) as usize;
    let mut output = Vec::with_capacity(expected_len + CHUNK_SIZE);
    let mut chunk = vec![0.0f32; CHUNK_SIZE];

    for block in samples.chunks(CHUNK_SIZE) {
        chunk[..block.len()].copy_from_slice(block);
        chunk[block.len()..].fill(0.0);

        let resampled = resampler
            .process(&[chunk.as_slice()], None)
            .map_err(|e| DecodeError::ResampleFailed {
                reason: e.to_string(),
            })?;
        if let Some(channel) = resampled.first() {
            output.extend_from_slice(channel);
        }
    }

    output.truncate(expected_len);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_rate_is_passthrough() {
        let samples = vec![0.1, -0.2, 0.3];
        assert_eq!(resample(samples.clone(), 22_050, 22_050).unwrap(), samples);
    }

    #[test]
    fn test_downsample_preserves_duration() {
        let source_rate = 44_100;
        let samples: Vec<f32> = (0..source_rate)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / source_rate as f32).sin())
            .collect();

        let output = resample(samples, source_rate as u32, 22_050).unwrap();
        let ratio = output.len() as f32 / 22_050.0;
        assert!(
            (ratio - 1.0).abs() < 0.05,
            "expected ~22050 samples, got {}",
            output.len()
        );
        assert!(output.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_zero_rate_rejected() {
        let err = resample(vec![0.0; 4], 0, 22_050).unwrap_err();
        assert!(matches!(err, DecodeError::ResampleFailed { .. }));
    }
}
