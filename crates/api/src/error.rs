//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use membership_saga::MembershipError;
use membership_store::StoreError;
use resilience::RemoteError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Membership operation error.
    Membership(MembershipError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Membership(err) => membership_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn membership_error_to_response(err: MembershipError) -> (StatusCode, String) {
    match &err {
        MembershipError::NotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),
        MembershipError::AlreadyMember { .. } | MembershipError::InvalidState(_) => {
            (StatusCode::CONFLICT, err.to_string())
        }
        MembershipError::NotEligible { .. } => (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
        MembershipError::RemoteUnavailable(remote) => {
            tracing::error!(service = remote.service(), error = %remote, "peer service unavailable");
            if remote.is_circuit_open() {
                (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
            } else {
                (StatusCode::BAD_GATEWAY, err.to_string())
            }
        }
        MembershipError::Internal(msg) => {
            tracing::error!(error = %msg, "internal server error");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<MembershipError> for ApiError {
    fn from(err: MembershipError) -> Self {
        ApiError::Membership(err)
    }
}

/// Failures while wiring the application at startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Store setup failed: {0}")]
    Store(#[from] StoreError),

    #[error("Database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Remote client setup failed: {0}")]
    Remote(#[from] RemoteError),
}
