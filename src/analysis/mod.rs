// Analysis module - feature extraction, inference and result resolution
//
// Pipeline: FeatureExtractor → InferenceEngine → ResultResolver
//
// Every stage here is synchronous and free of shared mutable state; the
// pipeline module decides where and when they run.

pub mod features;
pub mod inference;
pub mod model;
pub mod resolver;

pub use features::{AudioFeatures, ExtractionProgress, FeatureExtractor};
pub use inference::{InferenceBackend, InferenceEngine, PredictionResult};
pub use model::PrototypeModel;
pub use resolver::{MatchOutcome, PredictData, ResultResolver, CONFIDENCE_THRESHOLD};
