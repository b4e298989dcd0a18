//! Project aggregate.

use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::{AggregateKind, Membered};
use crate::member::Member;

/// A project document with its member roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: AggregateId,
    pub name: String,
    /// Username of the managing user.
    #[serde(default)]
    pub manager: String,
    /// Once set, the roster is frozen.
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub members: Vec<Member>,
}

impl Project {
    /// Creates an open project with an empty roster.
    pub fn new(id: impl Into<AggregateId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            manager: String::new(),
            closed: false,
            members: Vec::new(),
        }
    }

    /// Sets the managing user.
    pub fn with_manager(mut self, manager: impl Into<String>) -> Self {
        self.manager = manager.into();
        self
    }

    /// Seeds the roster.
    pub fn with_members(mut self, members: impl IntoIterator<Item = Member>) -> Self {
        self.members = members.into_iter().collect();
        self
    }

    /// Marks the project closed.
    pub fn closed(mut self) -> Self {
        self.closed = true;
        self
    }
}

impl Membered for Project {
    fn kind() -> AggregateKind {
        AggregateKind::Project
    }

    fn id(&self) -> &AggregateId {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn members(&self) -> &[Member] {
        &self.members
    }

    fn members_mut(&mut self) -> &mut Vec<Member> {
        &mut self.members
    }

    fn frozen_state(&self) -> Option<String> {
        self.closed.then(|| "closed".to_string())
    }

    fn eligibility_scope(&self) -> &AggregateId {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DomainError;

    #[test]
    fn test_open_project_is_editable() {
        let project = Project::new("P1", "Apollo");
        assert!(project.ensure_editable().is_ok());
        assert_eq!(project.eligibility_scope().as_str(), "P1");
    }

    #[test]
    fn test_closed_project_is_frozen() {
        let project = Project::new("P1", "Apollo").closed();
        let err = project.ensure_editable().unwrap_err();
        assert!(matches!(
            err,
            DomainError::MembershipFrozen { kind: AggregateKind::Project, ref state, .. } if state == "closed"
        ));
    }

    #[test]
    fn test_has_member_matches_username_only() {
        let project = Project::new("P1", "Apollo")
            .with_members([Member::new("alice", "Alice", "Smith")]);
        assert!(project.has_member("alice"));
        assert!(!project.has_member("bob"));
    }
}
