// Upload progress for recordings arriving over a transport
//
// Counts bytes received against the size the client declared. This is a
// separate signal from job progress: upload percent says how much of the
// file has arrived, job percent says how far decoding and inference have
// got, and neither feeds the other.

use serde::{Deserialize, Serialize};

/// Report granularity when the client did not declare a size
const UNKNOWN_TOTAL_REPORT_BYTES: u64 = 64 * 1024;

/// Bytes of one upload received so far
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadProgress {
    pub file_name: String,
    pub bytes_received: u64,
    /// Declared size, when the client sent one
    pub bytes_total: Option<u64>,
    /// Set on the final update, once the body is fully read
    pub done: bool,
}

impl UploadProgress {
    /// Share of the declared size received, if a size was declared
    pub fn fraction(&self) -> Option<f32> {
        match self.bytes_total {
            Some(0) => Some(1.0),
            Some(total) => Some((self.bytes_received as f32 / total as f32).min(1.0)),
            None => None,
        }
    }
}

/// Turns body chunks into throttled [`UploadProgress`] updates
///
/// With a declared size an update is produced each time the whole percent
/// moves; without one, every [`UNKNOWN_TOTAL_REPORT_BYTES`].
#[derive(Debug)]
pub struct UploadMeter {
    file_name: String,
    bytes_total: Option<u64>,
    bytes_received: u64,
    last_mark: Option<u64>,
}

impl UploadMeter {
    pub fn new(file_name: impl Into<String>, bytes_total: Option<u64>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes_total,
            bytes_received: 0,
            last_mark: None,
        }
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Count `len` more bytes; returns an update when the reported value moved
    pub fn record(&mut self, len: usize) -> Option<UploadProgress> {
        self.bytes_received = self.bytes_received.saturating_add(len as u64);
        let mark = self.mark();
        if self.last_mark == Some(mark) {
            return None;
        }
        self.last_mark = Some(mark);
        Some(self.update(false))
    }

    /// Final update for a fully read body
    pub fn finish(self) -> UploadProgress {
        self.update(true)
    }

    fn mark(&self) -> u64 {
        match self.bytes_total {
            Some(total) if total > 0 => self.bytes_received.min(total) * 100 / total,
            _ => self.bytes_received / UNKNOWN_TOTAL_REPORT_BYTES,
        }
    }

    fn update(&self, done: bool) -> UploadProgress {
        UploadProgress {
            file_name: self.file_name.clone(),
            bytes_received: self.bytes_received,
            bytes_total: self.bytes_total,
            done,
        }
    }
}
