// Identification pipeline: job control, progress protocol and warm-up
//
// Module organization:
// - progress: Stage ordering and monotonic percent tracking
// - channel: Worker/orchestrator message protocol and subscriber events
// - worker: Blocking decode/extract/infer stages
// - upload: Transport-side upload progress, separate from job progress
// - warmup: Single-flight warm-up gate
// - orchestrator: PipelineOrchestrator

mod channel;
mod orchestrator;
mod progress;
mod upload;
mod warmup;
mod worker;

pub use channel::{JobEvent, PipelineEvent, WorkerMessage, WorkerPayload};
pub use orchestrator::PipelineOrchestrator;
pub use progress::{ProgressInfo, ProgressTracker, Stage};
pub use upload::{UploadMeter, UploadProgress};
pub use warmup::WarmUpStatus;
