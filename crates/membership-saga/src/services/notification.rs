//! Notification service trait, HTTP adapter and in-memory implementation.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use domain::AggregateKind;
use reqwest::StatusCode;
use resilience::{RemoteClient, RemoteError, RemoteRequest};
use serde_json::json;
use tokio::time::Instant;

/// A message for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    pub recipient_username: String,
    pub message_text: String,
}

impl NotificationRequest {
    pub fn new(recipient_username: impl Into<String>, message_text: impl Into<String>) -> Self {
        Self {
            recipient_username: recipient_username.into(),
            message_text: message_text.into(),
        }
    }

    pub fn added_to(kind: AggregateKind, name: &str, username: impl Into<String>) -> Self {
        Self::new(username, format!("You are added to {kind} {name}"))
    }

    pub fn removed_from(kind: AggregateKind, name: &str, username: impl Into<String>) -> Self {
        Self::new(username, format!("You are deleted from {kind} {name}"))
    }
}

/// Trait for delivering notifications.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(
        &self,
        request: &NotificationRequest,
        deadline: Option<Instant>,
    ) -> Result<(), RemoteError>;
}

#[async_trait]
impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    async fn notify(
        &self,
        request: &NotificationRequest,
        deadline: Option<Instant>,
    ) -> Result<(), RemoteError> {
        (**self).notify(request, deadline).await
    }
}

/// Notifier backed by the notifications service.
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    client: RemoteClient,
}

impl HttpNotifier {
    pub fn new(client: RemoteClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    #[tracing::instrument(
        skip(self, request, deadline),
        fields(service = %self.client.service(), recipient = %request.recipient_username)
    )]
    async fn notify(
        &self,
        request: &NotificationRequest,
        deadline: Option<Instant>,
    ) -> Result<(), RemoteError> {
        let body = json!({
            "user_id": request.recipient_username,
            "message": request.message_text,
        });
        let request = RemoteRequest::post("/notifications", body)
            .accept([StatusCode::OK, StatusCode::CREATED])
            .with_deadline(deadline);
        self.client.send(request).await?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<NotificationRequest>,
    attempts: usize,
    failure: Option<RemoteError>,
}

/// In-memory notifier for testing. Records every delivered request.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<Mutex<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every delivery fail with `failure` until cleared with `None`.
    pub fn set_failure(&self, failure: Option<RemoteError>) {
        self.lock().failure = failure;
    }

    /// Returns the delivered notifications in order.
    pub fn sent(&self) -> Vec<NotificationRequest> {
        self.lock().sent.clone()
    }

    /// Returns how many deliveries were attempted, failed ones included.
    pub fn attempt_count(&self) -> usize {
        self.lock().attempts
    }

    fn lock(&self) -> MutexGuard<'_, InMemoryNotifierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn notify(
        &self,
        request: &NotificationRequest,
        _deadline: Option<Instant>,
    ) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.attempts += 1;
        if let Some(failure) = &state.failure {
            return Err(failure.clone());
        }
        state.sent.push(request.clone());
        Ok(())
    }
}
