//! Member roster endpoints, shared by projects and tasks.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::AggregateId;
use domain::{Member, Membered, Project, Task};
use membership_saga::{AddMember, RemoveMember};
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::{AppState, Orchestrator};

/// Picks the orchestrator for an aggregate type.
pub trait RosterRoute: Membered {
    fn orchestrator(state: &AppState) -> &Orchestrator<Self>;
}

impl RosterRoute for Project {
    fn orchestrator(state: &AppState) -> &Orchestrator<Self> {
        &state.projects
    }
}

impl RosterRoute for Task {
    fn orchestrator(state: &AppState) -> &Orchestrator<Self> {
        &state.tasks
    }
}

/// Body of an add request. Accepts a full member record; only the username
/// is used, display fields come from the eligibility peer.
#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub username: String,
}

/// GET /{aggregate}/{id}/members: the roster in insertion order.
#[tracing::instrument(skip(state))]
pub async fn list<A: RosterRoute>(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Member>>, ApiError> {
    let members = A::orchestrator(&state)
        .get_members(&AggregateId::from(id))
        .await?;
    Ok(Json(members))
}

/// PATCH /{aggregate}/{id}/members: add a member.
#[tracing::instrument(skip(state, req))]
pub async fn add<A: RosterRoute>(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AddMemberRequest>,
) -> Result<StatusCode, ApiError> {
    let username = req.username.trim();
    if username.is_empty() {
        return Err(ApiError::BadRequest("username is required".to_string()));
    }

    let command = AddMember::new(id, username).with_deadline(state.deadline());
    A::orchestrator(&state).add_member(command).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /{aggregate}/{id}/members/{username}: remove a member.
#[tracing::instrument(skip(state))]
pub async fn remove<A: RosterRoute>(
    State(state): State<Arc<AppState>>,
    Path((id, username)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let command = RemoveMember::new(id, username).with_deadline(state.deadline());
    A::orchestrator(&state).remove_member(command).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /{aggregate}/{id}/candidates: eligible people who are not members yet.
#[tracing::instrument(skip(state))]
pub async fn candidates<A: RosterRoute>(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Member>>, ApiError> {
    let candidates = A::orchestrator(&state)
        .list_candidates(&AggregateId::from(id), Some(state.deadline()))
        .await?;
    Ok(Json(candidates))
}
