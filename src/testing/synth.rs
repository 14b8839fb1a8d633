//! Deterministic synthetic signals.
//!
//! Used by the warm-up pass (a short tone pushed through extraction and
//! inference) and by tests that need reproducible "recordings" of a species
//! call without shipping audio files.

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

fn sample_count(duration_secs: f32, sample_rate: u32) -> usize {
    (duration_secs.max(0.0) * sample_rate as f32).round() as usize
}

/// Pure sine tone
pub fn sine(frequency_hz: f32, duration_secs: f32, sample_rate: u32, amplitude: f32) -> Vec<f32> {
    let step = 2.0 * PI * frequency_hz / sample_rate as f32;
    (0..sample_count(duration_secs, sample_rate))
        .map(|i| amplitude * (step * i as f32).sin())
        .collect()
}

/// Linear frequency sweep from `start_hz` to `end_hz`
pub fn chirp(
    start_hz: f32,
    end_hz: f32,
    duration_secs: f32,
    sample_rate: u32,
    amplitude: f32,
) -> Vec<f32> {
    let n = sample_count(duration_secs, sample_rate);
    let sr = sample_rate as f32;
    let sweep_rate = if duration_secs > 0.0 {
        (end_hz - start_hz) / duration_secs
    } else {
        0.0
    };
    (0..n)
        .map(|i| {
            let t = i as f32 / sr;
            let phase = 2.0 * PI * (start_hz * t + 0.5 * sweep_rate * t * t);
            amplitude * phase.sin()
        })
        .collect()
}

/// Uniform white noise from a fixed seed
pub fn white_noise(duration_secs: f32, sample_rate: u32, amplitude: f32, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..sample_count(duration_secs, sample_rate))
        .map(|_| amplitude * rng.gen_range(-1.0f32..1.0))
        .collect()
}

/// Add `other` into `signal` sample by sample
pub fn mix_into(signal: &mut [f32], other: &[f32]) {
    for (s, o) in signal.iter_mut().zip(other) {
        *s += *o;
    }
}

/// Shape of a synthetic bird call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallPattern {
    /// Steady whistle with a quieter second harmonic.
    Whistle { frequency_hz: f32 },
    /// Carrier tone amplitude-modulated at `rate_hz`.
    Trill { carrier_hz: f32, rate_hz: f32 },
    /// Repeating downward or upward sweep.
    Sweep {
        start_hz: f32,
        end_hz: f32,
        period_secs: f32,
    },
    /// Band of noise, e.g. a harsh alarm call.
    Rasp { seed: u64 },
}

impl CallPattern {
    /// Render the call at peak amplitude `amplitude`
    pub fn render(&self, duration_secs: f32, sample_rate: u32, amplitude: f32) -> Vec<f32> {
        match *self {
            CallPattern::Whistle { frequency_hz } => {
                let mut signal = sine(frequency_hz, duration_secs, sample_rate, amplitude * 0.8);
                let harmonic = sine(
                    frequency_hz * 2.0,
                    duration_secs,
                    sample_rate,
                    amplitude * 0.2,
                );
                mix_into(&mut signal, &harmonic);
                signal
            }
            CallPattern::Trill {
                carrier_hz,
                rate_hz,
            } => {
                let carrier = sine(carrier_hz, duration_secs, sample_rate, amplitude);
                let step = 2.0 * PI * rate_hz / sample_rate as f32;
                carrier
                    .into_iter()
                    .enumerate()
                    .map(|(i, s)| s * 0.5 * (1.0 + (step * i as f32).sin()))
                    .collect()
            }
            CallPattern::Sweep {
                start_hz,
                end_hz,
                period_secs,
            } => {
                let period = chirp(start_hz, end_hz, period_secs, sample_rate, amplitude);
                let n = sample_count(duration_secs, sample_rate);
                if period.is_empty() {
                    return vec![0.0; n];
                }
                period.iter().copied().cycle().take(n).collect()
            }
            CallPattern::Rasp { seed } => {
                white_noise(duration_secs, sample_rate, amplitude, seed)
            }
        }
    }
}
