//! HTTP API server hosting the project and task membership orchestrators.
//!
//! Provides roster endpoints for projects and tasks, with structured
//! logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get};
use domain::{Project, Task};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::members;
pub use state::{AppState, Peers, build_state};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::system::health))
        .route(
            "/projects/{id}/members",
            get(members::list::<Project>).patch(members::add::<Project>),
        )
        .route(
            "/projects/{id}/members/{username}",
            delete(members::remove::<Project>),
        )
        .route(
            "/projects/{id}/candidates",
            get(members::candidates::<Project>),
        )
        .route(
            "/tasks/{id}/members",
            get(members::list::<Task>).patch(members::add::<Task>),
        )
        .route(
            "/tasks/{id}/members/{username}",
            delete(members::remove::<Task>),
        )
        .route("/tasks/{id}/candidates", get(members::candidates::<Task>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
