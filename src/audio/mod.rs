// Audio module - input validation, decoding and resampling

pub mod decoder;
pub mod resampler;
pub mod types;

// Re-export commonly used types for convenience
pub use decoder::AudioDecoder;
pub use types::{AudioBuffer, AudioFormat, AudioInput};
