//! Pipeline telemetry.
//!
//! A process-wide [`TelemetryHub`] counts job outcomes, keeps a short
//! history of [`MetricEvent`]s for the health endpoint, and rebroadcasts
//! every event to live subscribers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::analysis::MatchOutcome;
use crate::error::ErrorKind;

pub mod events;

pub use events::{MetricEvent, WarmUpOutcome};

static HUB: Lazy<TelemetryHub> = Lazy::new(TelemetryHub::default);

/// Access the global telemetry hub.
pub fn hub() -> &'static TelemetryHub {
    &HUB
}

fn lock_recovering<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Running totals since process start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub started: u64,
    pub identified: u64,
    pub no_confident_match: u64,
    pub not_in_catalog: u64,
    pub failed: u64,
    pub stale_dropped: u64,
}

/// Job latency over the most recent settled jobs
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub jobs: usize,
    pub mean_ms: f32,
    pub p95_ms: u64,
    pub max_ms: u64,
}

/// Hub state for HTTP/CLI reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub counts: JobCounts,
    pub latency: LatencySummary,
    pub recent: Vec<MetricEvent>,
}

#[derive(Default)]
struct Counters {
    started: AtomicU64,
    identified: AtomicU64,
    no_confident_match: AtomicU64,
    not_in_catalog: AtomicU64,
    failed: AtomicU64,
    stale_dropped: AtomicU64,
}

impl Counters {
    fn load(&self) -> JobCounts {
        JobCounts {
            started: self.started.load(Ordering::Relaxed),
            identified: self.identified.load(Ordering::Relaxed),
            no_confident_match: self.no_confident_match.load(Ordering::Relaxed),
            not_in_catalog: self.not_in_catalog.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            stale_dropped: self.stale_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Bounded window of settled-job durations
struct LatencyWindow {
    elapsed_ms: VecDeque<u64>,
    capacity: usize,
}

impl LatencyWindow {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            elapsed_ms: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, elapsed_ms: u64) {
        if self.elapsed_ms.len() == self.capacity {
            self.elapsed_ms.pop_front();
        }
        self.elapsed_ms.push_back(elapsed_ms);
    }

    fn summary(&self) -> LatencySummary {
        if self.elapsed_ms.is_empty() {
            return LatencySummary::default();
        }
        let mut sorted: Vec<u64> = self.elapsed_ms.iter().copied().collect();
        sorted.sort_unstable();
        let jobs = sorted.len();
        // Nearest-rank percentile
        let rank = ((jobs as f32 * 0.95).ceil() as usize).clamp(1, jobs);
        LatencySummary {
            jobs,
            mean_ms: sorted.iter().sum::<u64>() as f32 / jobs as f32,
            p95_ms: sorted[rank - 1],
            max_ms: sorted[jobs - 1],
        }
    }
}

pub struct TelemetryHub {
    counters: Counters,
    latency: Mutex<LatencyWindow>,
    recent: Mutex<VecDeque<MetricEvent>>,
    recent_capacity: usize,
    live: broadcast::Sender<MetricEvent>,
}

impl TelemetryHub {
    pub fn new(recent_capacity: usize, latency_window: usize) -> Self {
        let (live, _) = broadcast::channel(64);
        Self {
            counters: Counters::default(),
            latency: Mutex::new(LatencyWindow::new(latency_window)),
            recent: Mutex::new(VecDeque::with_capacity(recent_capacity)),
            recent_capacity,
            live,
        }
    }

    /// Live feed of every recorded event
    pub fn subscribe(&self) -> broadcast::Receiver<MetricEvent> {
        self.live.subscribe()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            counts: self.counters.load(),
            latency: lock_recovering(&self.latency).summary(),
            recent: lock_recovering(&self.recent).iter().cloned().collect(),
        }
    }

    pub fn record_job_started(&self, generation: u64, file_name: &str) {
        self.counters.started.fetch_add(1, Ordering::Relaxed);
        self.emit(MetricEvent::JobStarted {
            generation,
            file_name: file_name.to_string(),
        });
    }

    pub fn record_job_completed(
        &self,
        generation: u64,
        confidence: f32,
        outcome: MatchOutcome,
        elapsed_ms: u64,
    ) {
        let counter = match outcome {
            MatchOutcome::Identified => &self.counters.identified,
            MatchOutcome::NoConfidentMatch => &self.counters.no_confident_match,
            MatchOutcome::NotInCatalog => &self.counters.not_in_catalog,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        lock_recovering(&self.latency).push(elapsed_ms);
        self.emit(MetricEvent::JobCompleted {
            generation,
            confidence,
            outcome,
            elapsed_ms,
        });
    }

    pub fn record_job_failed(&self, generation: u64, kind: ErrorKind, elapsed_ms: u64) {
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
        lock_recovering(&self.latency).push(elapsed_ms);
        self.emit(MetricEvent::JobFailed {
            generation,
            kind,
            elapsed_ms,
        });
    }

    pub fn record_stale_message(&self, generation: u64, current: u64) {
        self.counters.stale_dropped.fetch_add(1, Ordering::Relaxed);
        self.emit(MetricEvent::StaleMessageDropped { generation, current });
    }

    pub fn record_warm_up(&self, outcome: WarmUpOutcome, elapsed_ms: u64) {
        self.emit(MetricEvent::WarmUp {
            outcome,
            elapsed_ms,
        });
    }

    fn emit(&self, event: MetricEvent) {
        if self.recent_capacity > 0 {
            let mut recent = lock_recovering(&self.recent);
            while recent.len() >= self.recent_capacity {
                recent.pop_front();
            }
            recent.push_back(event.clone());
        }
        // Nobody listening is the common case
        let _ = self.live.send(event);
    }
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new(64, 32)
    }
}
