//! Errors surfaced by loops and handles.
//!
//! Delivery is at-most-once: nothing here is retried internally, the caller
//! decides what to do with a failure.

use thiserror::Error;

use super::ids::LoopId;

#[derive(Debug, Error)]
pub enum LoopError {
    /// Handle derivation before the loop published readiness.
    #[error("loop {0} is not ready yet")]
    NotReady(LoopId),

    /// Submission to a loop that is stopping or stopped. The item was dropped.
    #[error("loop {0} has terminated")]
    LoopTerminated(LoopId),

    #[error("thread '{thread}' already owns loop {existing}")]
    DuplicateLoopOnThread { thread: String, existing: LoopId },

    #[error("main loop already prepared: {0}")]
    MainLoopExists(LoopId),

    #[error("invalid loop config: {0}")]
    InvalidConfig(String),

    #[error("failed to spawn loop thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("loop thread '{0}' panicked")]
    ThreadPanicked(String),
}

impl LoopError {
    /// Retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, LoopError::NotReady(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_loop() {
        let id = LoopId::generate();
        let msg = LoopError::NotReady(id).to_string();
        assert!(msg.contains(&id.to_string()));
        assert!(msg.contains("not ready"));
    }

    #[test]
    fn only_not_ready_is_transient() {
        let id = LoopId::generate();
        assert!(LoopError::NotReady(id).is_transient());
        assert!(!LoopError::LoopTerminated(id).is_transient());
        assert!(!LoopError::MainLoopExists(id).is_transient());
    }
}
