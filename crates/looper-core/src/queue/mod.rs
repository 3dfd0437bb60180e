//! Queue module: the delay-aware work queue a loop drains.

mod memory;

pub use memory::{MAX_DELAY, WorkQueue};

use thiserror::Error;

use crate::domain::WorkItem;

/// The queue no longer accepts items; the pushed item was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("work queue is closed")]
pub struct QueueClosed;

/// Result of one consumer step.
#[derive(Debug)]
pub enum Poll {
    /// An eligible item, removed from the queue.
    Ready(WorkItem),

    /// Nothing eligible right now.
    Pending,

    /// Closed and drained as far as the close mode allows.
    Finished,
}
