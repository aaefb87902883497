use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a single position tracked by a strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Entry order submitted
    Opening,
    /// Entry filled, original protective levels in place
    Open,
    /// Stop has been ratcheted at least once
    Trailing,
    /// Partial profit taken, remainder still trailing
    PartiallyClosed,
    /// Fully exited
    Closed,
    /// Entry order failed, no position exists
    Rejected,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Opening => "OPENING",
            LifecycleState::Open => "OPEN",
            LifecycleState::Trailing => "TRAILING",
            LifecycleState::PartiallyClosed => "PARTIALLY_CLOSED",
            LifecycleState::Closed => "CLOSED",
            LifecycleState::Rejected => "REJECTED",
        }
    }

    /// Check if this state can transition to another state
    pub fn can_transition_to(&self, target: LifecycleState) -> bool {
        use LifecycleState::*;

        match (self, target) {
            (Opening, Open) => true,
            (Opening, Rejected) => true,

            (Open, Trailing) => true,
            (Open, PartiallyClosed) => true,
            (Open, Closed) => true,

            // Stop keeps tightening
            (Trailing, Trailing) => true,
            (Trailing, PartiallyClosed) => true,
            (Trailing, Closed) => true,

            // The remainder keeps trailing after the partial close
            (PartiallyClosed, PartiallyClosed) => true,
            (PartiallyClosed, Closed) => true,

            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Closed | LifecycleState::Rejected)
    }

    /// Whether the partial close has already been taken
    pub fn partial_taken(&self) -> bool {
        matches!(self, LifecycleState::PartiallyClosed | LifecycleState::Closed)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert!(LifecycleState::Opening.can_transition_to(LifecycleState::Open));
        assert!(LifecycleState::Opening.can_transition_to(LifecycleState::Rejected));
        assert!(LifecycleState::Open.can_transition_to(LifecycleState::Trailing));
        assert!(LifecycleState::Trailing.can_transition_to(LifecycleState::Trailing));
        assert!(LifecycleState::Trailing.can_transition_to(LifecycleState::PartiallyClosed));
        assert!(LifecycleState::PartiallyClosed.can_transition_to(LifecycleState::Closed));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for target in [
            LifecycleState::Opening,
            LifecycleState::Open,
            LifecycleState::Trailing,
            LifecycleState::PartiallyClosed,
        ] {
            assert!(!LifecycleState::Closed.can_transition_to(target));
            assert!(!LifecycleState::Rejected.can_transition_to(target));
        }
        assert!(LifecycleState::Rejected.is_terminal());
    }

    #[test]
    fn test_partial_close_cannot_revert() {
        assert!(!LifecycleState::PartiallyClosed.can_transition_to(LifecycleState::Open));
        assert!(!LifecycleState::PartiallyClosed.can_transition_to(LifecycleState::Trailing));
        assert!(LifecycleState::PartiallyClosed.partial_taken());
        assert!(!LifecycleState::Trailing.partial_taken());
    }
}
