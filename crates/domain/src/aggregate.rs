//! The aggregate abstraction shared by projects and tasks.

use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::member::Member;

/// Which kind of document owns a member roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateKind {
    Project,
    Task,
}

impl AggregateKind {
    /// Returns the kind as a lowercase label, used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateKind::Project => "project",
            AggregateKind::Task => "task",
        }
    }
}

impl std::fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An aggregate that owns an insertion-ordered roster of members.
///
/// Stores and the membership orchestrator are generic over this trait so
/// project and task membership share one implementation.
pub trait Membered: Clone + Send + Sync + 'static {
    /// The kind of aggregate.
    fn kind() -> AggregateKind;

    /// Returns the aggregate's identifier.
    fn id(&self) -> &AggregateId;

    /// Returns the human readable name used in notifications.
    fn name(&self) -> &str;

    /// Returns the current members in insertion order.
    fn members(&self) -> &[Member];

    /// Returns the roster for in-place edits.
    fn members_mut(&mut self) -> &mut Vec<Member>;

    /// Returns a description of the state that freezes the roster, if any.
    ///
    /// A frozen aggregate rejects every membership mutation.
    fn frozen_state(&self) -> Option<String>;

    /// Returns the aggregate whose roster decides who may join this one.
    ///
    /// Projects answer with their own id; tasks answer with their project.
    fn eligibility_scope(&self) -> &AggregateId;

    /// Returns true if a member with this username is on the roster.
    fn has_member(&self, username: &str) -> bool {
        self.members().iter().any(|m| m.is(username))
    }

    /// Fails with `MembershipFrozen` if the roster may not change.
    fn ensure_editable(&self) -> Result<(), DomainError> {
        match self.frozen_state() {
            Some(state) => Err(DomainError::MembershipFrozen {
                kind: Self::kind(),
                aggregate_id: self.id().clone(),
                state,
            }),
            None => Ok(()),
        }
    }
}
