//! Task aggregate and its status lifecycle.

use std::str::FromStr;

use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::{AggregateKind, Membered};
use crate::error::DomainError;
use crate::member::Member;

/// The status of a task.
///
/// ```text
/// Pending ──► InProgress ──► Finished
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    /// Terminal; the roster is frozen.
    Finished,
}

impl TaskStatus {
    /// Returns true if this is the terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Finished)
    }

    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Finished => "FINISHED",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TaskStatus::Pending),
            "IN_PROGRESS" => Ok(TaskStatus::InProgress),
            "FINISHED" => Ok(TaskStatus::Finished),
            other => Err(DomainError::InvalidStatus(other.to_string())),
        }
    }
}

/// A task document. Tasks draw their members from the owning project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: AggregateId,
    #[serde(rename = "project")]
    pub project_id: AggregateId,
    pub name: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub members: Vec<Member>,
}

impl Task {
    /// Creates a pending task with an empty roster.
    pub fn new(
        id: impl Into<AggregateId>,
        project_id: impl Into<AggregateId>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            project_id: project_id.into(),
            name: name.into(),
            status: TaskStatus::Pending,
            members: Vec::new(),
        }
    }

    /// Sets the status.
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    /// Seeds the roster.
    pub fn with_members(mut self, members: impl IntoIterator<Item = Member>) -> Self {
        self.members = members.into_iter().collect();
        self
    }
}

impl Membered for Task {
    fn kind() -> AggregateKind {
        AggregateKind::Task
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
        self.status
            .is_terminal()
            .then(|| self.status.as_str().to_string())
    }

    fn eligibility_scope(&self) -> &AggregateId {
        &self.project_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status_is_pending() {
        assert_eq!(TaskStatus::default(), TaskStatus::Pending);
    }

    #[test]
    fn test_terminal_status() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
        assert!(TaskStatus::Finished.is_terminal());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("IN_PROGRESS".parse::<TaskStatus>(), Ok(TaskStatus::InProgress));
        assert_eq!(
            "DONE".parse::<TaskStatus>(),
            Err(DomainError::InvalidStatus("DONE".to_string()))
        );
    }

    #[test]
    fn test_status_serializes_as_wire_name() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
    }

    #[test]
    fn test_task_eligibility_comes_from_project() {
        let task = Task::new("T1", "P1", "Write docs");
        assert_eq!(task.eligibility_scope().as_str(), "P1");
    }

    #[test]
    fn test_finished_task_is_frozen() {
        let task = Task::new("T1", "P1", "Write docs").with_status(TaskStatus::Finished);
        let err = task.ensure_editable().unwrap_err();
        assert_eq!(
            err.to_string(),
            "task T1 is FINISHED; membership can no longer change"
        );
    }
}
