//! Shared state-machine machinery for entity status transitions.
//!
//! Every entity status is a closed enum paired with an explicit transition
//! table. A transition to a status not reachable from the current one fails
//! with [`TransitionError::InvalidTransition`] and performs no mutation.

use thiserror::Error;

/// Error raised by an illegal state change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The requested status is not reachable from the current status.
    #[error("invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: &'static str,
        to: &'static str,
    },
}

impl TransitionError {
    pub fn invalid(entity: &'static str, from: &'static str, to: &'static str) -> Self {
        Self::InvalidTransition { entity, from, to }
    }
}

/// A status enum with an explicit directed transition graph.
pub trait StatusGraph: Copy + PartialEq + 'static {
    /// Entity name used in error messages ("stream", "chunk", ...).
    const ENTITY: &'static str;

    /// Stable string form of the status.
    fn as_str(&self) -> &'static str;

    /// Statuses directly reachable from `self`.
    fn successors(&self) -> &'static [Self];

    /// A terminal status rejects all further transitions.
    fn is_terminal(&self) -> bool {
        self.successors().is_empty()
    }

    /// Check whether `to` is reachable from `self` in one step.
    fn can_transition_to(&self, to: Self) -> bool {
        self.successors().contains(&to)
    }

    /// Validate a single transition step.
    fn check_transition(&self, to: Self) -> Result<(), TransitionError> {
        if self.can_transition_to(to) {
            Ok(())
        } else {
            Err(TransitionError::invalid(
                Self::ENTITY,
                self.as_str(),
                to.as_str(),
            ))
        }
    }
}
