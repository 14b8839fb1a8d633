//! Core telemetry event types describing pipeline activity exposed to the
//! CLI and HTTP surfaces.

use serde::{Deserialize, Serialize};

use crate::analysis::MatchOutcome;
use crate::error::ErrorKind;

/// Result of one warm-up attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WarmUpOutcome {
    Succeeded,
    Failed,
}

/// Metric events covering job lifecycle and warm-up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MetricEvent {
    JobStarted {
        generation: u64,
        file_name: String,
    },
    JobCompleted {
        generation: u64,
        confidence: f32,
        outcome: MatchOutcome,
        elapsed_ms: u64,
    },
    JobFailed {
        generation: u64,
        kind: ErrorKind,
        elapsed_ms: u64,
    },
    /// A worker message arrived for a generation that is no longer current
    StaleMessageDropped {
        generation: u64,
        current: u64,
    },
    WarmUp {
        outcome: WarmUpOutcome,
        elapsed_ms: u64,
    },
}
