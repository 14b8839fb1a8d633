// Birdcall ID Core - bird call identification pipeline
// Decode, DSP feature extraction, inference and confidence gating with
// single-flight job control

// Module declarations
pub mod analysis;
pub mod audio;
pub mod catalog;
pub mod config;
pub mod error;
#[cfg(feature = "http")]
pub mod http;
pub mod pipeline;
pub mod telemetry;
pub mod testing;

// Re-exports for convenience
pub use analysis::{MatchOutcome, PredictData, CONFIDENCE_THRESHOLD};
pub use audio::AudioInput;
pub use catalog::{InMemoryCatalog, SpeciesCatalog, SpeciesRecord};
pub use config::AppConfig;
pub use error::{ErrorCode, ErrorKind, PipelineError, PipelineFailure};
pub use pipeline::{JobEvent, PipelineEvent, PipelineOrchestrator, ProgressInfo, Stage};
