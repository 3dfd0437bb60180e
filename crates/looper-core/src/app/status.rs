//! Status - per-loop counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Snapshot of what a loop has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopCounts {
    /// Items currently in the queue (due or not).
    pub pending: u64,
    /// Items that ran to completion.
    pub executed: u64,
    /// Items that panicked (the loop kept going).
    pub panicked: u64,
    /// Submissions refused because the loop was stopping or stopped.
    pub rejected: u64,
    /// Items still queued when the loop terminated.
    pub dropped: u64,
}

impl LoopCounts {
    /// Items that were dequeued and started.
    pub fn started(&self) -> u64 {
        self.executed + self.panicked
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    executed: AtomicU64,
    panicked: AtomicU64,
    rejected: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    pub(crate) fn executed(&self) {
        self.executed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn panicked(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dropped(&self, n: usize) {
        self.dropped.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, pending: usize) -> LoopCounts {
        LoopCounts {
            pending: pending as u64,
            executed: self.executed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}
