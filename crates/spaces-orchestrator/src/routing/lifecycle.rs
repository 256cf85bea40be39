//! Media activation state machine.
//!
//! Each space has a single active-routing slot whose state moves as follows:
//!
//! ```text
//!   Deactivated ──▶ Activating ──▶ Active | Failed
//!        ▲            ▲    │            │
//!        │            └────┼────────────┤   (re)activate
//!        └─────────────────┴────────────┘   deactivate
//! ```
//!
//! The slot is last-writer-wins: a new activation may take over a slot that
//! is still `Activating`, and so may a deactivation. A slot left `Activating`
//! by an interrupted run therefore never blocks the space.

use spaces_core::SpaceId;
use spaces_store::ActivationState;

use crate::error::{OrchestratorError, Result};

/// Validates a state transition and returns the target state if valid.
///
/// # Errors
///
/// Returns `OrchestratorError::InvalidActivation` if the transition is not allowed.
pub fn validate_transition(
    space_id: &SpaceId,
    from: ActivationState,
    to: ActivationState,
) -> Result<ActivationState> {
    if is_valid_transition(from, to) {
        Ok(to)
    } else {
        Err(OrchestratorError::InvalidActivation {
            space_id: *space_id,
            from,
            to,
        })
    }
}

/// Check if a state transition is valid according to the state machine.
#[must_use]
pub const fn is_valid_transition(from: ActivationState, to: ActivationState) -> bool {
    use ActivationState::{Activating, Active, Deactivated, Failed};

    matches!(
        (from, to),
        (_, Activating)
            | (Activating, Active | Failed)
            | (Activating | Active | Failed, Deactivated)
    )
}

/// Returns the list of valid target states from the given state.
#[must_use]
pub fn valid_transitions_from(state: ActivationState) -> Vec<ActivationState> {
    use ActivationState::{Activating, Active, Deactivated, Failed};

    match state {
        Deactivated => vec![Activating],
        Activating => vec![Activating, Active, Failed, Deactivated],
        Active | Failed => vec![Activating, Deactivated],
    }
}

/// Returns true if the slot reports a routing to callers.
#[must_use]
pub const fn exposes_routing(state: ActivationState) -> bool {
    matches!(state, ActivationState::Active | ActivationState::Activating)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        use ActivationState::*;

        assert!(is_valid_transition(Deactivated, Activating));
        assert!(is_valid_transition(Activating, Active));
        assert!(is_valid_transition(Activating, Failed));
        // Reactivation from a settled state
        assert!(is_valid_transition(Active, Activating));
        assert!(is_valid_transition(Failed, Activating));
        assert!(is_valid_transition(Active, Deactivated));
        assert!(is_valid_transition(Failed, Deactivated));
        // An unfinished activation can be taken over or dropped
        assert!(is_valid_transition(Activating, Activating));
        assert!(is_valid_transition(Activating, Deactivated));
    }

    #[test]
    fn invalid_transitions() {
        use ActivationState::*;

        assert!(!is_valid_transition(Deactivated, Active));
        assert!(!is_valid_transition(Deactivated, Failed));
        assert!(!is_valid_transition(Active, Failed));
        assert!(!is_valid_transition(Failed, Active));
        assert!(!is_valid_transition(Deactivated, Deactivated));
    }

    #[test]
    fn validate_transition_err() {
        let space_id = SpaceId::generate();
        let result = validate_transition(&space_id, ActivationState::Deactivated, ActivationState::Failed);

        match result {
            Err(OrchestratorError::InvalidActivation { from, to, .. }) => {
                assert_eq!(from, ActivationState::Deactivated);
                assert_eq!(to, ActivationState::Failed);
            }
            _ => panic!("expected InvalidActivation error"),
        }
    }

    #[test]
    fn transitions_table_matches_predicate() {
        use ActivationState::*;

        for from in [Deactivated, Activating, Active, Failed] {
            for to in valid_transitions_from(from) {
                assert!(is_valid_transition(from, to), "{from:?} -> {to:?}");
            }
        }
    }

    #[test]
    fn exposed_states() {
        assert!(exposes_routing(ActivationState::Active));
        assert!(exposes_routing(ActivationState::Activating));
        assert!(!exposes_routing(ActivationState::Failed));
        assert!(!exposes_routing(ActivationState::Deactivated));
    }
}
