//! Membership error types.

use common::AggregateId;
use domain::{AggregateKind, DomainError};
use membership_store::StoreError;
use resilience::RemoteError;
use thiserror::Error;

/// Errors returned by membership operations.
#[derive(Debug, Error)]
pub enum MembershipError {
    /// A peer could not be reached: its breaker is open or retries ran out.
    #[error("Remote service unavailable: {0}")]
    RemoteUnavailable(#[from] RemoteError),

    /// The eligibility peer does not list the candidate.
    #[error("{username} is not eligible to join {kind} {aggregate_id}")]
    NotEligible {
        kind: AggregateKind,
        aggregate_id: AggregateId,
        username: String,
    },

    /// The candidate is already on the roster.
    #[error("{username} is already a member of {kind} {aggregate_id}")]
    AlreadyMember {
        kind: AggregateKind,
        aggregate_id: AggregateId,
        username: String,
    },

    /// The aggregate's state forbids membership changes.
    #[error("{0}")]
    InvalidState(#[from] DomainError),

    /// The aggregate does not exist.
    #[error("{kind} not found: {aggregate_id}")]
    NotFound {
        kind: AggregateKind,
        aggregate_id: AggregateId,
    },

    /// A store or driver failure not otherwise classified.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MembershipError {
    /// Returns true for expected business outcomes, as opposed to failures.
    pub fn is_business_outcome(&self) -> bool {
        matches!(
            self,
            MembershipError::NotEligible { .. }
                | MembershipError::AlreadyMember { .. }
                | MembershipError::InvalidState(_)
                | MembershipError::NotFound { .. }
        )
    }

    /// Returns true if a circuit breaker refused the call.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, MembershipError::RemoteUnavailable(err) if err.is_circuit_open())
    }

    /// Returns a short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            MembershipError::RemoteUnavailable(_) => "remote_unavailable",
            MembershipError::NotEligible { .. } => "not_eligible",
            MembershipError::AlreadyMember { .. } => "already_member",
            MembershipError::InvalidState(_) => "invalid_state",
            MembershipError::NotFound { .. } => "not_found",
            MembershipError::Internal(_) => "internal",
        }
    }
}

impl From<StoreError> for MembershipError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, id } => MembershipError::NotFound {
                kind,
                aggregate_id: id,
            },
            other => MembershipError::Internal(other.to_string()),
        }
    }
}

/// Convenience type alias for membership results.
pub type Result<T> = std::result::Result<T, MembershipError>;
