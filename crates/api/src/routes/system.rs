//! Health and Prometheus metrics endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use resilience::BreakerState;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` while any peer breaker is open.
    pub status: &'static str,
    pub breakers: BTreeMap<String, &'static str>,
}

/// GET /health: returns service health and peer breaker states.
///
/// Reads breaker state without advancing it, so polling never admits a probe.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let breakers: BTreeMap<String, BreakerState> = state
        .breakers
        .iter()
        .map(|b| (b.name().to_string(), b.peek_state()))
        .collect();
    let degraded = breakers.values().any(|s| *s == BreakerState::Open);

    Json(HealthResponse {
        status: if degraded { "degraded" } else { "ok" },
        breakers: breakers
            .into_iter()
            .map(|(name, s)| (name, s.as_str()))
            .collect(),
    })
}

/// GET /metrics: returns Prometheus-formatted metrics.
pub async fn metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        handle.render(),
    )
}
