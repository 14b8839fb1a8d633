// Progress tracking for identification jobs
//
// Stages are strictly ordered and each owns a slice of the job-wide percent
// range, so percent never decreases across a job and reaches 100 only when
// the job completes.

use serde::{Deserialize, Serialize};

/// Pipeline stage, in execution order
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// No job started, or results cleared
    #[default]
    Idle,
    /// Validating and decoding the input file
    Loading,
    /// Fitting the buffer to the fixed length
    Preprocessing,
    /// Per-frame feature loop
    Extracting,
    /// Running the classifier and resolving the result
    Predicting,
    Complete,
    Error,
}

impl Stage {
    /// Job-wide percent range covered by this stage
    pub fn percent_range(&self) -> (u8, u8) {
        match self {
            Stage::Idle => (0, 0),
            Stage::Loading => (0, 10),
            Stage::Preprocessing => (10, 20),
            Stage::Extracting => (20, 80),
            Stage::Predicting => (80, 95),
            Stage::Complete => (100, 100),
            Stage::Error => (0, 0),
        }
    }

    /// Whether a job in this stage is still running
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Stage::Loading | Stage::Preprocessing | Stage::Extracting | Stage::Predicting
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Complete | Stage::Error)
    }

    /// Get human-readable name for display
    pub fn display_name(&self) -> &'static str {
        match self {
            Stage::Idle => "Idle",
            Stage::Loading => "Loading",
            Stage::Preprocessing => "Preprocessing",
            Stage::Extracting => "Extracting features",
            Stage::Predicting => "Predicting",
            Stage::Complete => "Complete",
            Stage::Error => "Error",
        }
    }
}

/// One progress update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressInfo {
    pub stage: Stage,
    /// Job-wide percent (0 to 100)
    pub percent: u8,
    pub message: String,
}

impl ProgressInfo {
    pub fn complete() -> Self {
        Self {
            stage: Stage::Complete,
            percent: 100,
            message: "Identification complete".to_string(),
        }
    }
}

/// Maps per-stage fractions onto monotonic job-wide progress
///
/// Updates for an earlier stage, and repeats of the last reported value,
/// are swallowed.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    stage: Stage,
    percent: u8,
    emitted: bool,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            stage: Stage::Loading,
            percent: 0,
            emitted: false,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    /// Record progress `fraction` (0.0 to 1.0) through `stage`
    ///
    /// Returns the update to publish, or `None` when nothing changed.
    pub fn advance(
        &mut self,
        stage: Stage,
        fraction: f32,
        message: impl Into<String>,
    ) -> Option<ProgressInfo> {
        if !(stage.is_active() || stage == Stage::Complete) || stage < self.stage {
            return None;
        }

        let (lo, hi) = stage.percent_range();
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let mapped = lo + (fraction * (hi - lo) as f32).round() as u8;
        let percent = mapped.max(self.percent);

        if self.emitted && stage == self.stage && percent == self.percent {
            return None;
        }

        self.stage = stage;
        self.percent = percent;
        self.emitted = true;
        Some(ProgressInfo {
            stage,
            percent,
            message: message.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        assert!(Stage::Loading < Stage::Preprocessing);
        assert!(Stage::Preprocessing < Stage::Extracting);
        assert!(Stage::Extracting < Stage::Predicting);
        assert!(Stage::Predicting < Stage::Complete);
        assert!(Stage::Extracting.is_active());
        assert!(Stage::Error.is_terminal());
        assert!(!Stage::Idle.is_active());
    }

    #[test]
    fn test_percent_is_monotonic_across_stages() {
        let mut tracker = ProgressTracker::new();
        let mut last = 0;
        let updates = [
            (Stage::Loading, 0.0),
            (Stage::Loading, 1.0),
            (Stage::Preprocessing, 0.5),
            (Stage::Extracting, 0.1),
            (Stage::Extracting, 0.6),
            (Stage::Predicting, 0.0),
            (Stage::Predicting, 1.0),
        ];
        for (stage, fraction) in updates {
            if let Some(info) = tracker.advance(stage, fraction, "step") {
                assert!(info.percent >= last);
                assert!(info.percent < 100);
                last = info.percent;
            }
        }
        let done = tracker.advance(Stage::Complete, 1.0, "done").unwrap();
        assert_eq!(done.percent, 100);
    }

    #[test]
    fn test_regressions_are_swallowed() {
        let mut tracker = ProgressTracker::new();
        tracker.advance(Stage::Extracting, 0.5, "half").unwrap();
        assert!(tracker.advance(Stage::Preprocessing, 1.0, "late").is_none());
        assert!(tracker.advance(Stage::Extracting, 0.5, "repeat").is_none());
        // Lower fraction in the same stage keeps the higher percent
        assert!(tracker.advance(Stage::Extracting, 0.1, "lower").is_none());
        assert_eq!(tracker.percent(), 50);
        assert!(tracker.advance(Stage::Error, 0.0, "bad").is_none());
    }

    #[test]
    fn test_first_update_is_always_emitted() {
        let mut tracker = ProgressTracker::new();
        let info = tracker.advance(Stage::Loading, 0.0, "Decoding audio").unwrap();
        assert_eq!(info.percent, 0);
        assert_eq!(info.stage, Stage::Loading);
    }
}
