//! Membership orchestrator driving the add and remove sagas.

use std::marker::PhantomData;
use std::sync::Arc;

use common::AggregateId;
use domain::{DomainError, Member, Membered, Project, Task};
use membership_store::{AddOutcome, MembershipStore, RemoveOutcome};
use tokio::time::Instant;

use crate::error::{MembershipError, Result};
use crate::services::eligibility::{Eligibility, EligibilityQuery, EligibilityService};
use crate::services::notification::{NotificationRequest, Notifier};
use crate::state::{MembershipChange, MembershipStep, NotificationOutcome};

/// Command to add a candidate to an aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddMember {
    pub aggregate_id: AggregateId,
    pub username: String,
    /// Bounds every remote call made on behalf of this command.
    pub deadline: Option<Instant>,
}

impl AddMember {
    pub fn new(aggregate_id: impl Into<AggregateId>, username: impl Into<String>) -> Self {
        Self {
            aggregate_id: aggregate_id.into(),
            username: username.into(),
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Command to remove a member from an aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveMember {
    pub aggregate_id: AggregateId,
    pub username: String,
    pub deadline: Option<Instant>,
}

impl RemoveMember {
    pub fn new(aggregate_id: impl Into<AggregateId>, username: impl Into<String>) -> Self {
        Self {
            aggregate_id: aggregate_id.into(),
            username: username.into(),
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// How the post-mutation notification is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotificationDispatch {
    /// Wait for delivery; a failure is logged and reported, never returned.
    #[default]
    Await,
    /// Spawn delivery on a background task and return immediately.
    Background,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrchestratorSettings {
    pub dispatch: NotificationDispatch,
}

/// Result of a successful membership operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipReport {
    pub aggregate_id: AggregateId,
    pub username: String,
    pub change: MembershipChange,
    pub notification: NotificationOutcome,
    /// Steps taken, in order. `Notified` means delivery settled, either
    /// way; a background dispatch that has not run yet leaves it out.
    pub steps: Vec<MembershipStep>,
}

/// Result of notifying every member of an aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Coordinates eligibility, roster and notification for one aggregate type.
///
/// Steps run strictly in order: eligibility, uniqueness, mutation,
/// notification. The roster mutation is the point of no return, and the
/// store's conditional append makes concurrent duplicate adds lose with
/// `AlreadyMember` instead of producing a second entry.
pub struct MembershipOrchestrator<A, S, E, N>
where
    A: Membered,
    S: MembershipStore<A>,
    E: EligibilityService,
    N: Notifier,
{
    store: S,
    eligibility: E,
    notifier: Arc<N>,
    settings: OrchestratorSettings,
    _aggregate: PhantomData<fn() -> A>,
}

/// Orchestrator for project membership.
pub type ProjectMembership<S, E, N> = MembershipOrchestrator<Project, S, E, N>;

/// Orchestrator for task membership.
pub type TaskMembership<S, E, N> = MembershipOrchestrator<Task, S, E, N>;

impl<A, S, E, N> MembershipOrchestrator<A, S, E, N>
where
    A: Membered,
    S: MembershipStore<A>,
    E: EligibilityService,
    N: Notifier,
{
    pub fn new(store: S, eligibility: E, notifier: N) -> Self {
        Self {
            store,
            eligibility,
            notifier: Arc::new(notifier),
            settings: OrchestratorSettings::default(),
            _aggregate: PhantomData,
        }
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Adds a candidate to the aggregate's roster.
    ///
    /// The stored snapshot is the eligibility peer's record for the
    /// candidate. Fails without touching the roster if the aggregate is
    /// missing or frozen, the candidate is not eligible, or is already a
    /// member.
    #[tracing::instrument(
        skip(self, command),
        fields(
            aggregate = %A::kind(),
            aggregate_id = %command.aggregate_id,
            username = %command.username
        )
    )]
    pub async fn add_member(&self, command: AddMember) -> Result<MembershipReport> {
        let started = std::time::Instant::now();
        let mut steps = vec![MembershipStep::Start];
        let result = self.run_add(&command, &mut steps).await;
        self.record("add", started, &steps, &result);
        result.map(|(change, notification)| MembershipReport {
            aggregate_id: command.aggregate_id,
            username: command.username,
            change,
            notification,
            steps,
        })
    }

    /// Removes a member from the aggregate's roster.
    ///
    /// Removing someone who is not a member succeeds with
    /// `MembershipChange::Unchanged` and sends no notification.
    #[tracing::instrument(
        skip(self, command),
        fields(
            aggregate = %A::kind(),
            aggregate_id = %command.aggregate_id,
            username = %command.username
        )
    )]
    pub async fn remove_member(&self, command: RemoveMember) -> Result<MembershipReport> {
        let started = std::time::Instant::now();
        let mut steps = vec![MembershipStep::Start];
        let result = self.run_remove(&command, &mut steps).await;
        self.record("remove", started, &steps, &result);
        result.map(|(change, notification)| MembershipReport {
            aggregate_id: command.aggregate_id,
            username: command.username,
            change,
            notification,
            steps,
        })
    }

    /// Returns the eligible candidates who are not yet members.
    #[tracing::instrument(skip(self, deadline), fields(aggregate = %A::kind()))]
    pub async fn list_candidates(
        &self,
        aggregate_id: &AggregateId,
        deadline: Option<Instant>,
    ) -> Result<Vec<Member>> {
        let aggregate = self.load(aggregate_id).await?;
        let eligible = self
            .eligibility
            .eligible_members(aggregate.eligibility_scope(), deadline)
            .await?;
        Ok(eligible
            .into_iter()
            .filter(|candidate| !aggregate.has_member(&candidate.username))
            .collect())
    }

    /// Returns the roster in insertion order.
    pub async fn get_members(&self, aggregate_id: &AggregateId) -> Result<Vec<Member>> {
        Ok(self.store.get_members(aggregate_id).await?)
    }

    /// Sends `message` to every current member, best effort.
    ///
    /// Failed deliveries are logged and counted; they never fail the call.
    #[tracing::instrument(skip(self, message, deadline), fields(aggregate = %A::kind()))]
    pub async fn notify_members(
        &self,
        aggregate_id: &AggregateId,
        message: &str,
        deadline: Option<Instant>,
    ) -> Result<BroadcastReport> {
        let members = self.store.get_members(aggregate_id).await?;
        let mut report = BroadcastReport::default();
        for member in members {
            let request = NotificationRequest::new(member.username, message);
            match self.notifier.notify(&request, deadline).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    metrics::counter!("membership_notifications_failed_total").increment(1);
                    tracing::warn!(
                        recipient = %request.recipient_username,
                        error = %e,
                        "Notification failed"
                    );
                }
            }
        }
        Ok(report)
    }

    async fn run_add(
        &self,
        command: &AddMember,
        steps: &mut Vec<MembershipStep>,
    ) -> Result<(MembershipChange, NotificationOutcome)> {
        let aggregate = self.load(&command.aggregate_id).await?;
        aggregate.ensure_editable()?;

        // 1. Eligibility
        let query = EligibilityQuery {
            scope: aggregate.eligibility_scope().clone(),
            candidate_username: command.username.clone(),
            deadline: command.deadline,
        };
        let member = match self.eligibility.check(&query).await? {
            Eligibility::Eligible(member) => member,
            Eligibility::NotEligible => {
                return Err(MembershipError::NotEligible {
                    kind: A::kind(),
                    aggregate_id: command.aggregate_id.clone(),
                    username: command.username.clone(),
                });
            }
        };
        steps.push(MembershipStep::EligibilityChecked);

        // 2. Uniqueness
        if self
            .store
            .member_exists(&command.aggregate_id, &command.username)
            .await?
        {
            return Err(self.already_member(command));
        }
        steps.push(MembershipStep::UniquenessChecked);

        // 3. Mutation
        match self.store.add_member(&command.aggregate_id, member).await? {
            AddOutcome::Added => {}
            AddOutcome::AlreadyMember => return Err(self.already_member(command)),
            AddOutcome::Frozen => return Err(self.frozen(&command.aggregate_id).await),
        }
        steps.push(MembershipStep::Mutated);
        tracing::info!("Member added");

        // 4. Notification
        let request = NotificationRequest::added_to(
            A::kind(),
            aggregate.name(),
            command.username.clone(),
        );
        let notification = self.dispatch(request, command.deadline).await;
        if notification != NotificationOutcome::Dispatched {
            steps.push(MembershipStep::Notified);
        }
        steps.push(MembershipStep::Done);

        Ok((MembershipChange::Added, notification))
    }

    async fn run_remove(
        &self,
        command: &RemoveMember,
        steps: &mut Vec<MembershipStep>,
    ) -> Result<(MembershipChange, NotificationOutcome)> {
        let aggregate = self.load(&command.aggregate_id).await?;
        aggregate.ensure_editable()?;

        if !self
            .store
            .member_exists(&command.aggregate_id, &command.username)
            .await?
        {
            tracing::debug!("Not a member, nothing to remove");
            steps.push(MembershipStep::Done);
            return Ok((MembershipChange::Unchanged, NotificationOutcome::Skipped));
        }
        steps.push(MembershipStep::UniquenessChecked);

        match self
            .store
            .remove_member(&command.aggregate_id, &command.username)
            .await?
        {
            RemoveOutcome::Removed => {}
            RemoveOutcome::NotMember => {
                steps.push(MembershipStep::Done);
                return Ok((MembershipChange::Unchanged, NotificationOutcome::Skipped));
            }
            RemoveOutcome::Frozen => return Err(self.frozen(&command.aggregate_id).await),
        }
        steps.push(MembershipStep::Mutated);
        tracing::info!("Member removed");

        let request = NotificationRequest::removed_from(
            A::kind(),
            aggregate.name(),
            command.username.clone(),
        );
        let notification = self.dispatch(request, command.deadline).await;
        if notification != NotificationOutcome::Dispatched {
            steps.push(MembershipStep::Notified);
        }
        steps.push(MembershipStep::Done);

        Ok((MembershipChange::Removed, notification))
    }

    async fn load(&self, aggregate_id: &AggregateId) -> Result<A> {
        self.store
            .find(aggregate_id)
            .await?
            .ok_or_else(|| MembershipError::NotFound {
                kind: A::kind(),
                aggregate_id: aggregate_id.clone(),
            })
    }

    async fn dispatch(
        &self,
        request: NotificationRequest,
        deadline: Option<Instant>,
    ) -> NotificationOutcome {
        match self.settings.dispatch {
            NotificationDispatch::Await => match self.notifier.notify(&request, deadline).await {
                Ok(()) => NotificationOutcome::Delivered,
                Err(e) => {
                    metrics::counter!("membership_notifications_failed_total").increment(1);
                    tracing::warn!(
                        recipient = %request.recipient_username,
                        error = %e,
                        "Notification failed; membership change stands"
                    );
                    NotificationOutcome::Failed(e.to_string())
                }
            },
            NotificationDispatch::Background => {
                let notifier = Arc::clone(&self.notifier);
                tokio::spawn(async move {
                    if let Err(e) = notifier.notify(&request, None).await {
                        metrics::counter!("membership_notifications_failed_total").increment(1);
                        tracing::warn!(
                            recipient = %request.recipient_username,
                            error = %e,
                            "Background notification failed"
                        );
                    }
                });
                NotificationOutcome::Dispatched
            }
        }
    }

    fn already_member(&self, command: &AddMember) -> MembershipError {
        MembershipError::AlreadyMember {
            kind: A::kind(),
            aggregate_id: command.aggregate_id.clone(),
            username: command.username.clone(),
        }
    }

    /// Builds the error for a mutation refused because the aggregate froze
    /// after it was loaded.
    async fn frozen(&self, aggregate_id: &AggregateId) -> MembershipError {
        let state = match self.store.find(aggregate_id).await {
            Ok(Some(aggregate)) => aggregate.frozen_state(),
            Ok(None) => {
                return MembershipError::NotFound {
                    kind: A::kind(),
                    aggregate_id: aggregate_id.clone(),
                };
            }
            Err(e) => return e.into(),
        };
        MembershipError::InvalidState(DomainError::MembershipFrozen {
            kind: A::kind(),
            aggregate_id: aggregate_id.clone(),
            state: state.unwrap_or_else(|| "frozen".to_string()),
        })
    }

    fn record(
        &self,
        operation: &'static str,
        started: std::time::Instant,
        steps: &[MembershipStep],
        result: &Result<(MembershipChange, NotificationOutcome)>,
    ) {
        let aggregate = A::kind().as_str();
        let last_step = steps.last().copied().unwrap_or_default();
        metrics::counter!(
            "membership_operations_total",
            "operation" => operation,
            "aggregate" => aggregate
        )
        .increment(1);
        metrics::histogram!(
            "membership_operation_duration_seconds",
            "operation" => operation,
            "aggregate" => aggregate
        )
        .record(started.elapsed().as_secs_f64());

        if let Err(e) = result {
            metrics::counter!(
                "membership_operation_failures_total",
                "operation" => operation,
                "aggregate" => aggregate,
                "reason" => e.reason()
            )
            .increment(1);
            if e.is_business_outcome() {
                tracing::info!(failed_after = %last_step, error = %e, "Membership {operation} rejected");
            } else {
                tracing::error!(failed_after = %last_step, error = %e, "Membership {operation} failed");
            }
        }
    }
}
