//! State machine trait for lifecycle status enums.

use super::ValidationError;

/// A closed set of states with explicitly enumerated edges.
///
/// Implementors list every state and the legal edges; validated transitions,
/// terminal detection and reverse lookups come for free.
///
/// ```ignore
/// let next = PaymentStatus::Processing.transition_to(PaymentStatus::Completed)?;
/// ```
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug + 'static {
    /// Every state, in declaration order.
    fn all() -> &'static [Self];

    /// Returns true if transition from self to target is a legal edge.
    fn can_transition_to(&self, target: &Self) -> bool;

    /// All legal targets from the current state.
    fn valid_transitions(&self) -> Vec<Self> {
        Self::all()
            .iter()
            .copied()
            .filter(|candidate| self.can_transition_to(candidate))
            .collect()
    }

    /// All states that have a legal edge into `target`.
    fn sources_of(target: Self) -> Vec<Self> {
        Self::all()
            .iter()
            .copied()
            .filter(|source| source.can_transition_to(&target))
            .collect()
    }

    /// Performs transition with validation, returning error if the edge does not exist.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(ValidationError::invalid_format(
                "state_transition",
                format!("Cannot transition from {:?} to {:?}", self, target),
            ))
        }
    }

    /// True when no outgoing edge exists.
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}
