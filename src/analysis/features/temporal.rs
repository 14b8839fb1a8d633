// Temporal module - Time-domain feature extraction
//
// Zero-crossing rate is computed on the raw (unwindowed) frame.

/// Compute zero-crossing rate (ZCR)
///
/// Formula: ZCR = (1 / (N - 1)) × Σ [sign(x[n]) ≠ sign(x[n-1])]
///
/// High ZCR indicates high-frequency or noise-like content, low ZCR
/// indicates low-frequency or tonal content.
///
/// # Returns
/// Zero-crossing rate (0.0 to 1.0)
pub fn compute_zcr(frame: &[f32]) -> f32 {
    if frame.len() < 2 {
        return 0.0;
    }

    let crossings = frame
        .windows(2)
        .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
        .count();

    crossings as f32 / (frame.len() - 1) as f32
}
