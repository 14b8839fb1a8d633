// In-memory WAV encoding for fixtures and warm-up signals

use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Encode mono samples in [-1, 1] as a 16-bit PCM WAV file
pub fn encode_mono_i16(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(to_i16(sample))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Encode two equal-length channels as an interleaved 16-bit stereo WAV file
pub fn encode_stereo_i16(
    left: &[f32],
    right: &[f32],
    sample_rate: u32,
) -> Result<Vec<u8>, hound::Error> {
    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for (&l, &r) in left.iter().zip(right) {
            writer.write_sample(to_i16(l))?;
            writer.write_sample(to_i16(r))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Encode mono samples as a 32-bit float WAV file
pub fn encode_mono_f32(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_wav_reads_back() {
        let samples = vec![0.0, 0.5, -0.5, 1.0];
        let bytes = encode_mono_i16(&samples, 22_050).unwrap();
        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().sample_rate, 22_050);
        assert_eq!(reader.len(), 4);
    }
}
