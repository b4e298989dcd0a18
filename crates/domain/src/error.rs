//! Domain error types.

use common::AggregateId;
use thiserror::Error;

use crate::aggregate::AggregateKind;

/// Errors raised by aggregate rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// The aggregate is in a state that forbids membership edits.
    #[error("{kind} {aggregate_id} is {state}; membership can no longer change")]
    MembershipFrozen {
        kind: AggregateKind,
        aggregate_id: AggregateId,
        state: String,
    },

    /// A status string did not name a known task status.
    #[error("Invalid task status: {0}")]
    InvalidStatus(String),
}
