//! Integration tests for the membership orchestrator.

use common::AggregateId;
use domain::{Member, Project, Task, TaskStatus};
use futures_util::future::join_all;
use membership_saga::{
    AddMember, InMemoryEligibilityService, InMemoryNotifier, MembershipChange, MembershipError,
    MembershipStep, NotificationDispatch, NotificationOutcome, NotificationRequest,
    OrchestratorSettings, ProjectMembership, RemoveMember, TaskMembership,
};
use membership_store::{InMemoryMembershipStore, MembershipStore};
use resilience::RemoteError;

type ProjectOrchestrator = ProjectMembership<
    InMemoryMembershipStore<Project>,
    InMemoryEligibilityService,
    InMemoryNotifier,
>;

type TaskOrchestrator =
    TaskMembership<InMemoryMembershipStore<Task>, InMemoryEligibilityService, InMemoryNotifier>;

fn alice() -> Member {
    Member::new("alice", "Alice", "Smith")
}

fn bob() -> Member {
    Member::new("bob", "Bob", "Jones")
}

fn carol() -> Member {
    Member::new("carol", "Carol", "White")
}

struct ProjectHarness {
    orchestrator: ProjectOrchestrator,
    store: InMemoryMembershipStore<Project>,
    eligibility: InMemoryEligibilityService,
    notifier: InMemoryNotifier,
}

impl ProjectHarness {
    fn new(projects: impl IntoIterator<Item = Project>) -> Self {
        let store = InMemoryMembershipStore::with_documents(projects);
        let eligibility = InMemoryEligibilityService::new();
        let notifier = InMemoryNotifier::new();
        eligibility.set_eligible("P1", vec![alice(), bob()]);

        let orchestrator =
            ProjectMembership::new(store.clone(), eligibility.clone(), notifier.clone());

        Self {
            orchestrator,
            store,
            eligibility,
            notifier,
        }
    }

    fn apollo() -> Self {
        Self::new([Project::new("P1", "Apollo").with_manager("maria")])
    }

    async fn members(&self) -> Vec<String> {
        self.store
            .get_members(&AggregateId::from("P1"))
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.username)
            .collect()
    }
}

struct TaskHarness {
    orchestrator: TaskOrchestrator,
    store: InMemoryMembershipStore<Task>,
    eligibility: InMemoryEligibilityService,
    notifier: InMemoryNotifier,
}

impl TaskHarness {
    fn new(task: Task) -> Self {
        let store = InMemoryMembershipStore::with_documents([task]);
        let eligibility = InMemoryEligibilityService::new();
        let notifier = InMemoryNotifier::new();
        eligibility.set_eligible("P1", vec![alice(), carol()]);

        let orchestrator = TaskMembership::new(store.clone(), eligibility.clone(), notifier.clone());

        Self {
            orchestrator,
            store,
            eligibility,
            notifier,
        }
    }
}

#[tokio::test]
async fn test_add_eligible_member() {
    let h = ProjectHarness::apollo();

    let report = h
        .orchestrator
        .add_member(AddMember::new("P1", "alice"))
        .await
        .unwrap();

    assert_eq!(report.change, MembershipChange::Added);
    assert_eq!(report.notification, NotificationOutcome::Delivered);
    assert_eq!(
        report.steps,
        vec![
            MembershipStep::Start,
            MembershipStep::EligibilityChecked,
            MembershipStep::UniquenessChecked,
            MembershipStep::Mutated,
            MembershipStep::Notified,
            MembershipStep::Done,
        ]
    );

    let members = h.store.get_members(&AggregateId::from("P1")).await.unwrap();
    assert_eq!(members, vec![alice()]);
    assert!(
        h.store
            .member_exists(&AggregateId::from("P1"), "alice")
            .await
            .unwrap()
    );
    assert_eq!(
        h.notifier.sent(),
        vec![NotificationRequest::new(
            "alice",
            "You are added to project Apollo"
        )]
    );
}

#[tokio::test]
async fn test_stored_snapshot_is_peer_record() {
    let h = ProjectHarness::apollo();
    h.eligibility
        .set_eligible("P1", vec![Member::new("alice", "Alicia", "Smith-Jones")]);

    h.orchestrator
        .add_member(AddMember::new("P1", "alice"))
        .await
        .unwrap();

    let members = h.store.get_members(&AggregateId::from("P1")).await.unwrap();
    assert_eq!(members[0].display_name, "Alicia");
    assert_eq!(members[0].display_surname, "Smith-Jones");
}

#[tokio::test]
async fn test_add_existing_member_is_rejected() {
    let h = ProjectHarness::new([Project::new("P1", "Apollo").with_members([alice()])]);

    let err = h
        .orchestrator
        .add_member(AddMember::new("P1", "alice"))
        .await
        .unwrap_err();

    assert!(matches!(err, MembershipError::AlreadyMember { .. }));
    assert_eq!(h.members().await, vec!["alice"]);
    assert_eq!(h.store.mutation_count().await, 0);
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_ineligible_candidate_never_mutates() {
    let h = ProjectHarness::apollo();

    let err = h
        .orchestrator
        .add_member(AddMember::new("P1", "mallory"))
        .await
        .unwrap_err();

    assert!(matches!(err, MembershipError::NotEligible { .. }));
    assert_eq!(h.store.mutation_count().await, 0);
    assert!(h.members().await.is_empty());
    assert_eq!(h.notifier.attempt_count(), 0);
}

#[tokio::test]
async fn test_concurrent_identical_adds_leave_one_entry() {
    let h = ProjectHarness::apollo();

    let results = join_all(
        (0..10).map(|_| h.orchestrator.add_member(AddMember::new("P1", "alice"))),
    )
    .await;

    let added = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(MembershipError::AlreadyMember { .. })))
        .count();
    assert_eq!(added, 1);
    assert_eq!(rejected, 9);
    assert_eq!(h.members().await, vec!["alice"]);
    assert_eq!(h.notifier.sent().len(), 1);
}

#[tokio::test]
async fn test_missing_project_is_not_found() {
    let h = ProjectHarness::apollo();

    let err = h
        .orchestrator
        .add_member(AddMember::new("P404", "alice"))
        .await
        .unwrap_err();

    assert!(matches!(err, MembershipError::NotFound { .. }));
    assert_eq!(h.eligibility.call_count(), 0);
}

#[tokio::test]
async fn test_closed_project_rejects_add_before_remote_call() {
    let h = ProjectHarness::new([Project::new("P1", "Apollo").closed()]);

    let err = h
        .orchestrator
        .add_member(AddMember::new("P1", "alice"))
        .await
        .unwrap_err();

    assert!(matches!(err, MembershipError::InvalidState(_)));
    assert_eq!(h.eligibility.call_count(), 0);
    assert_eq!(h.store.mutation_count().await, 0);
}

#[tokio::test]
async fn test_closed_project_rejects_remove() {
    let h = ProjectHarness::new([Project::new("P1", "Apollo")
        .with_members([alice()])
        .closed()]);

    let err = h
        .orchestrator
        .remove_member(RemoveMember::new("P1", "alice"))
        .await
        .unwrap_err();

    assert!(matches!(err, MembershipError::InvalidState(_)));
    assert_eq!(h.members().await, vec!["alice"]);
}

#[tokio::test]
async fn test_eligibility_outage_is_remote_unavailable() {
    let h = ProjectHarness::apollo();
    h.eligibility.set_failure(Some(RemoteError::CircuitOpen {
        service: "users".to_string(),
    }));

    let err = h
        .orchestrator
        .add_member(AddMember::new("P1", "alice"))
        .await
        .unwrap_err();

    assert!(matches!(err, MembershipError::RemoteUnavailable(_)));
    assert!(err.is_circuit_open());
    assert_eq!(h.store.mutation_count().await, 0);
}

#[tokio::test]
async fn test_notification_failure_keeps_mutation() {
    let h = ProjectHarness::apollo();
    h.notifier.set_failure(Some(RemoteError::UnexpectedStatus {
        service: "notifications".to_string(),
        status: 500,
    }));

    let report = h
        .orchestrator
        .add_member(AddMember::new("P1", "alice"))
        .await
        .unwrap();

    assert_eq!(report.change, MembershipChange::Added);
    assert!(report.notification.is_failed());
    assert_eq!(h.members().await, vec!["alice"]);
    assert_eq!(h.notifier.attempt_count(), 1);
}

#[tokio::test]
async fn test_store_outage_is_internal() {
    let h = ProjectHarness::apollo();
    h.store.set_unavailable(true).await;

    let err = h
        .orchestrator
        .add_member(AddMember::new("P1", "alice"))
        .await
        .unwrap_err();

    assert!(matches!(err, MembershipError::Internal(_)));
}

#[tokio::test]
async fn test_remove_member() {
    let h = ProjectHarness::new([Project::new("P1", "Apollo").with_members([
        alice(),
        bob(),
        carol(),
    ])]);

    let report = h
        .orchestrator
        .remove_member(RemoveMember::new("P1", "bob"))
        .await
        .unwrap();

    assert_eq!(report.change, MembershipChange::Removed);
    assert_eq!(h.members().await, vec!["alice", "carol"]);
    assert_eq!(
        h.notifier.sent(),
        vec![NotificationRequest::new(
            "bob",
            "You are deleted from project Apollo"
        )]
    );
    assert_eq!(h.eligibility.call_count(), 0);
}

#[tokio::test]
async fn test_remove_non_member_is_noop() {
    let h = ProjectHarness::new([Project::new("P1", "Apollo").with_members([alice()])]);

    let report = h
        .orchestrator
        .remove_member(RemoveMember::new("P1", "bob"))
        .await
        .unwrap();

    assert_eq!(report.change, MembershipChange::Unchanged);
    assert_eq!(report.notification, NotificationOutcome::Skipped);
    assert_eq!(report.steps, vec![MembershipStep::Start, MembershipStep::Done]);
    assert_eq!(h.members().await, vec!["alice"]);
    assert_eq!(h.store.mutation_count().await, 0);
    assert_eq!(h.notifier.attempt_count(), 0);
}

#[tokio::test]
async fn test_task_draws_members_from_its_project() {
    let h = TaskHarness::new(Task::new("T1", "P1", "Design"));

    h.orchestrator
        .add_member(AddMember::new("T1", "carol"))
        .await
        .unwrap();
    let err = h
        .orchestrator
        .add_member(AddMember::new("T1", "bob"))
        .await
        .unwrap_err();

    assert!(matches!(err, MembershipError::NotEligible { .. }));
    let members = h.store.get_members(&AggregateId::from("T1")).await.unwrap();
    assert_eq!(members, vec![carol()]);
    assert_eq!(
        h.notifier.sent(),
        vec![NotificationRequest::new("carol", "You are added to task Design")]
    );
}

#[tokio::test]
async fn test_finished_task_rejects_removal() {
    let h = TaskHarness::new(
        Task::new("T1", "P1", "Design")
            .with_status(TaskStatus::Finished)
            .with_members([carol()]),
    );

    let err = h
        .orchestrator
        .remove_member(RemoveMember::new("T1", "carol"))
        .await
        .unwrap_err();

    assert!(matches!(err, MembershipError::InvalidState(_)));
    assert_eq!(
        err.to_string(),
        "task T1 is FINISHED; membership can no longer change"
    );
    let members = h.store.get_members(&AggregateId::from("T1")).await.unwrap();
    assert_eq!(members, vec![carol()]);
    assert_eq!(h.notifier.attempt_count(), 0);
    assert_eq!(h.eligibility.call_count(), 0);
}

#[tokio::test]
async fn test_in_progress_task_allows_removal() {
    let h = TaskHarness::new(
        Task::new("T1", "P1", "Design")
            .with_status(TaskStatus::InProgress)
            .with_members([alice(), carol()]),
    );

    h.orchestrator
        .remove_member(RemoveMember::new("T1", "alice"))
        .await
        .unwrap();

    let members = h.store.get_members(&AggregateId::from("T1")).await.unwrap();
    assert_eq!(members, vec![carol()]);
}

#[tokio::test]
async fn test_list_candidates_excludes_current_members() {
    let h = TaskHarness::new(Task::new("T1", "P1", "Design").with_members([alice()]));

    let candidates = h
        .orchestrator
        .list_candidates(&AggregateId::from("T1"), None)
        .await
        .unwrap();

    assert_eq!(candidates, vec![carol()]);
}

#[tokio::test]
async fn test_get_members_of_missing_task() {
    let h = TaskHarness::new(Task::new("T1", "P1", "Design"));

    let err = h
        .orchestrator
        .get_members(&AggregateId::from("T404"))
        .await
        .unwrap_err();

    assert!(matches!(err, MembershipError::NotFound { .. }));
}

#[tokio::test]
async fn test_notify_members_counts_failures() {
    let h = TaskHarness::new(Task::new("T1", "P1", "Design").with_members([alice(), carol()]));

    let report = h
        .orchestrator
        .notify_members(&AggregateId::from("T1"), "Task Design was updated", None)
        .await
        .unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 0);

    h.notifier.set_failure(Some(RemoteError::Timeout {
        service: "notifications".to_string(),
        timeout_ms: 5000,
    }));
    let report = h
        .orchestrator
        .notify_members(&AggregateId::from("T1"), "Task Design was updated", None)
        .await
        .unwrap();
    assert_eq!(report.delivered, 0);
    assert_eq!(report.failed, 2);
}

#[tokio::test]
async fn test_background_dispatch() {
    let store = InMemoryMembershipStore::with_documents([Project::new("P1", "Apollo")]);
    let eligibility = InMemoryEligibilityService::new();
    eligibility.set_eligible("P1", vec![alice()]);
    let notifier = InMemoryNotifier::new();
    let orchestrator = ProjectMembership::new(store, eligibility, notifier.clone()).with_settings(
        OrchestratorSettings {
            dispatch: NotificationDispatch::Background,
        },
    );

    let report = orchestrator
        .add_member(AddMember::new("P1", "alice"))
        .await
        .unwrap();
    assert_eq!(report.notification, NotificationOutcome::Dispatched);
    assert_eq!(
        report.steps,
        vec![
            MembershipStep::Start,
            MembershipStep::EligibilityChecked,
            MembershipStep::UniquenessChecked,
            MembershipStep::Mutated,
            MembershipStep::Done,
        ]
    );

    for _ in 0..100 {
        if !notifier.sent().is_empty() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(
        notifier.sent(),
        vec![NotificationRequest::new(
            "alice",
            "You are added to project Apollo"
        )]
    );
}
