//! Loop lifecycle state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle of a Loop.
///
/// State transitions:
/// - Uninitialized -> Preparing -> Ready -> Running -> Stopping -> Terminated
/// - Ready -> Stopping (quit before the drain loop started)
/// - Preparing -> Terminated (preparation failed, e.g. duplicate loop on thread)
///
/// Variants are declared in lifecycle order so `Ord` follows the transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    /// Created, loop thread not started yet.
    Uninitialized,

    /// Loop thread is constructing its queue.
    Preparing,

    /// Queue exists; handles may be bound.
    Ready,

    /// Drain loop is executing items.
    Running,

    /// Quit requested; no new submissions are accepted.
    Stopping,

    /// Drain loop exited; pending items were discarded.
    Terminated,
}

impl LoopState {
    /// Can handles be bound and items submitted?
    pub fn accepts_work(self) -> bool {
        matches!(self, LoopState::Ready | LoopState::Running)
    }

    /// Has the readiness signal not been published yet?
    pub fn is_pending(self) -> bool {
        matches!(self, LoopState::Uninitialized | LoopState::Preparing)
    }

    /// Stopping or terminated.
    pub fn is_shutting_down(self) -> bool {
        matches!(self, LoopState::Stopping | LoopState::Terminated)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LoopState::Terminated)
    }

    /// Is `next` a legal successor of `self`?
    pub fn can_transition_to(self, next: LoopState) -> bool {
        use LoopState::*;
        matches!(
            (self, next),
            (Uninitialized, Preparing)
                | (Preparing, Ready)
                | (Preparing, Terminated)
                | (Ready, Running)
                | (Ready, Stopping)
                | (Running, Stopping)
                | (Running, Terminated)
                | (Stopping, Terminated)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::uninitialized(LoopState::Uninitialized, false, true)]
    #[case::preparing(LoopState::Preparing, false, true)]
    #[case::ready(LoopState::Ready, true, false)]
    #[case::running(LoopState::Running, true, false)]
    #[case::stopping(LoopState::Stopping, false, false)]
    #[case::terminated(LoopState::Terminated, false, false)]
    fn classifies_states(#[case] state: LoopState, #[case] accepts: bool, #[case] pending: bool) {
        assert_eq!(state.accepts_work(), accepts);
        assert_eq!(state.is_pending(), pending);
    }

    #[test]
    fn ordering_follows_lifecycle() {
        assert!(LoopState::Preparing < LoopState::Ready);
        assert!(LoopState::Running < LoopState::Stopping);
        assert!(LoopState::Stopping < LoopState::Terminated);
    }

    #[test]
    fn rejects_backwards_transitions() {
        assert!(LoopState::Preparing.can_transition_to(LoopState::Ready));
        assert!(!LoopState::Terminated.can_transition_to(LoopState::Running));
        assert!(!LoopState::Stopping.can_transition_to(LoopState::Ready));
        assert!(!LoopState::Ready.can_transition_to(LoopState::Ready));
    }
}
