//! Eligibility service trait, HTTP adapters and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use common::AggregateId;
use domain::Member;
use reqwest::StatusCode;
use resilience::{RemoteClient, RemoteError, RemoteRequest};
use serde_json::json;
use tokio::time::Instant;

/// Asks whether a candidate may join the aggregate identified by `scope`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibilityQuery {
    /// The aggregate whose roster decides eligibility.
    pub scope: AggregateId,
    pub candidate_username: String,
    pub deadline: Option<Instant>,
}

/// Answer to an [`EligibilityQuery`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    /// Eligible; carries the peer's record for the candidate.
    Eligible(Member),
    NotEligible,
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible(_))
    }
}

/// Trait for eligibility lookups against a peer service.
#[async_trait]
pub trait EligibilityService: Send + Sync {
    /// Returns everyone the peer considers eligible for `scope`.
    async fn eligible_members(
        &self,
        scope: &AggregateId,
        deadline: Option<Instant>,
    ) -> Result<Vec<Member>, RemoteError>;

    /// Checks a single candidate.
    async fn check(&self, query: &EligibilityQuery) -> Result<Eligibility, RemoteError> {
        let members = self.eligible_members(&query.scope, query.deadline).await?;
        Ok(members
            .into_iter()
            .find(|m| m.is(&query.candidate_username))
            .map_or(Eligibility::NotEligible, Eligibility::Eligible))
    }
}

#[async_trait]
impl<T: EligibilityService + ?Sized> EligibilityService for Arc<T> {
    async fn eligible_members(
        &self,
        scope: &AggregateId,
        deadline: Option<Instant>,
    ) -> Result<Vec<Member>, RemoteError> {
        (**self).eligible_members(scope, deadline).await
    }

    async fn check(&self, query: &EligibilityQuery) -> Result<Eligibility, RemoteError> {
        (**self).check(query).await
    }
}

/// Project eligibility from the users service.
///
/// `POST /projects/{id}/availableMembers` with `{"projectId": id}` returns
/// the active users with a member role who may join the project.
#[derive(Debug, Clone)]
pub struct AvailableMembersClient {
    client: RemoteClient,
}

impl AvailableMembersClient {
    pub fn new(client: RemoteClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EligibilityService for AvailableMembersClient {
    #[tracing::instrument(skip(self, deadline), fields(service = %self.client.service()))]
    async fn eligible_members(
        &self,
        scope: &AggregateId,
        deadline: Option<Instant>,
    ) -> Result<Vec<Member>, RemoteError> {
        let request = RemoteRequest::post(
            format!("/projects/{scope}/availableMembers"),
            json!({ "projectId": scope }),
        )
        .accept([StatusCode::OK, StatusCode::CREATED])
        .with_deadline(deadline);
        self.client.call_json(request).await
    }
}

/// Task eligibility from the projects service.
///
/// A task only draws members from its project, so `scope` is the project
/// id and the answer is the project's current roster.
#[derive(Debug, Clone)]
pub struct ProjectRosterClient {
    client: RemoteClient,
}

impl ProjectRosterClient {
    pub fn new(client: RemoteClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EligibilityService for ProjectRosterClient {
    #[tracing::instrument(skip(self, deadline), fields(service = %self.client.service()))]
    async fn eligible_members(
        &self,
        scope: &AggregateId,
        deadline: Option<Instant>,
    ) -> Result<Vec<Member>, RemoteError> {
        let request =
            RemoteRequest::get(format!("/projects/members/{scope}")).with_deadline(deadline);
        self.client.call_json(request).await
    }
}

#[derive(Debug, Default)]
struct InMemoryEligibilityState {
    eligible: HashMap<AggregateId, Vec<Member>>,
    calls: usize,
    failure: Option<RemoteError>,
}

/// In-memory eligibility service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEligibilityService {
    state: Arc<Mutex<InMemoryEligibilityState>>,
}

impl InMemoryEligibilityService {
    /// Creates a service that considers nobody eligible.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the eligible members for a scope.
    pub fn set_eligible(&self, scope: impl Into<AggregateId>, members: Vec<Member>) {
        self.lock().eligible.insert(scope.into(), members);
    }

    /// Makes every call fail with `failure` until cleared with `None`.
    pub fn set_failure(&self, failure: Option<RemoteError>) {
        self.lock().failure = failure;
    }

    /// Returns how many lookups were made.
    pub fn call_count(&self) -> usize {
        self.lock().calls
    }

    fn lock(&self) -> MutexGuard<'_, InMemoryEligibilityState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl EligibilityService for InMemoryEligibilityService {
    async fn eligible_members(
        &self,
        scope: &AggregateId,
        _deadline: Option<Instant>,
    ) -> Result<Vec<Member>, RemoteError> {
        let mut state = self.lock();
        state.calls += 1;
        if let Some(failure) = &state.failure {
            return Err(failure.clone());
        }
        Ok(state.eligible.get(scope).cloned().unwrap_or_default())
    }
}
