// Message protocol between the job worker and the orchestrator
//
// The worker only ever talks to the orchestrator through `WorkerMessage`s on
// a per-job channel. The orchestrator checks each message's generation
// against the current one and republishes surviving messages to subscribers
// as `JobEvent`s.

use serde::{Deserialize, Serialize};

use crate::analysis::{PredictData, PredictionResult};
use crate::error::{PipelineError, PipelineFailure};

use super::progress::ProgressInfo;

/// Worker-side payload; the terminal variants end the job
#[derive(Debug, Clone)]
pub enum WorkerPayload {
    Progress(ProgressInfo),
    Error(PipelineError),
    Complete(PredictionResult),
}

/// One message from the worker, tagged with the job generation it belongs to
#[derive(Debug, Clone)]
pub struct WorkerMessage {
    pub generation: u64,
    pub payload: WorkerPayload,
}

impl WorkerMessage {
    pub fn new(generation: u64, payload: WorkerPayload) -> Self {
        Self {
            generation,
            payload,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self.payload, WorkerPayload::Progress(_))
    }
}

/// Event delivered to subscribers
///
/// Serialises as `{"type": "progress", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum PipelineEvent {
    Progress(ProgressInfo),
    Error(PipelineFailure),
    Complete(PredictData),
}

impl PipelineEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PipelineEvent::Progress(_))
    }
}

/// A pipeline event together with the job that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    pub generation: u64,
    pub event: PipelineEvent,
}
