// Single-flight warm-up gate
//
// Lifecycle: created with the orchestrator in `Idle`, moves to `Warming` for
// the one attempt allowed at a time, and settles in `Done` after a successful
// attempt. A failed attempt returns to `Idle` so a later call may retry.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarmUpStatus {
    Idle,
    Warming,
    Done,
}

pub(crate) struct WarmUpGate {
    in_flight: AtomicBool,
    done: AtomicBool,
    status: watch::Sender<WarmUpStatus>,
}

impl WarmUpGate {
    pub(crate) fn new() -> Self {
        let (status, _) = watch::channel(WarmUpStatus::Idle);
        Self {
            in_flight: AtomicBool::new(false),
            done: AtomicBool::new(false),
            status,
        }
    }

    /// Claim the attempt; false while warming or after success
    pub(crate) fn try_begin(&self) -> bool {
        if self.done.load(Ordering::Acquire) {
            return false;
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        // Another attempt may have succeeded between the two checks
        if self.done.load(Ordering::Acquire) {
            self.in_flight.store(false, Ordering::Release);
            return false;
        }
        self.status.send_replace(WarmUpStatus::Warming);
        true
    }

    pub(crate) fn finish(&self, success: bool) {
        if success {
            self.done.store(true, Ordering::Release);
            self.status.send_replace(WarmUpStatus::Done);
        } else {
            self.status.send_replace(WarmUpStatus::Idle);
        }
        self.in_flight.store(false, Ordering::Release);
    }

    pub(crate) fn status(&self) -> WarmUpStatus {
        *self.status.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<WarmUpStatus> {
        self.status.subscribe()
    }
}
