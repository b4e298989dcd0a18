//! HTTP client for one peer service, wrapped in breaker, retrier and timeouts.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tokio::time::Instant;

use crate::breaker::{BreakerSettings, CallOutcome, CircuitBreaker};
use crate::error::{RemoteError, Result};
use crate::retry::{BackoffPolicy, Retrier};

/// Settings for one remote dependency.
#[derive(Debug, Clone)]
pub struct RemoteClientSettings {
    /// Dependency name, used for the breaker, logs and metrics.
    pub service: String,
    pub base_url: String,
    /// Upper bound on a single round trip.
    pub attempt_timeout: Duration,
    pub backoff: BackoffPolicy,
    pub breaker: BreakerSettings,
}

impl RemoteClientSettings {
    /// 5s per attempt, the default backoff, and a breaker named after the service.
    pub fn new(service: impl Into<String>, base_url: impl Into<String>) -> Self {
        let service = service.into();
        Self {
            breaker: BreakerSettings::new(service.clone()),
            service,
            base_url: base_url.into(),
            attempt_timeout: Duration::from_secs(5),
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Replaces breaker tuning. The breaker keeps the service name.
    pub fn with_breaker(mut self, breaker: BreakerSettings) -> Self {
        self.breaker = BreakerSettings {
            name: self.service.clone(),
            ..breaker
        };
        self
    }
}

/// One logical call: method, path, optional JSON body, accepted statuses, deadline.
#[derive(Debug, Clone)]
pub struct RemoteRequest {
    method: Method,
    path: String,
    body: Option<serde_json::Value>,
    accepted: Vec<StatusCode>,
    deadline: Option<Instant>,
}

impl RemoteRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
            accepted: vec![StatusCode::OK],
            deadline: None,
        }
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: Some(body),
            accepted: vec![StatusCode::OK],
            deadline: None,
        }
    }

    /// Replaces the set of statuses treated as success.
    pub fn accept(mut self, statuses: impl IntoIterator<Item = StatusCode>) -> Self {
        self.accepted = statuses.into_iter().collect();
        self
    }

    /// Bounds the whole call, retries included.
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// An accepted response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

/// Resilient client for a single peer service.
///
/// Each call is one breaker outcome: the breaker wraps a full retrier run,
/// and each attempt is bounded by the attempt timeout or the caller's
/// remaining deadline, whichever is shorter. Running out of the caller's
/// deadline is `DeadlineExceeded` and never counts against the peer.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    settings: RemoteClientSettings,
    http: reqwest::Client,
    breaker: Arc<CircuitBreaker>,
    retrier: Retrier,
}

impl RemoteClient {
    /// Builds a client with its own breaker.
    pub fn new(settings: RemoteClientSettings) -> Result<Self> {
        let breaker = Arc::new(CircuitBreaker::new(settings.breaker.clone()));
        Self::with_breaker(settings, breaker)
    }

    /// Builds a client around an existing breaker, shared with other clients
    /// of the same dependency.
    pub fn with_breaker(settings: RemoteClientSettings, breaker: Arc<CircuitBreaker>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.attempt_timeout)
            .build()
            .map_err(|e| RemoteError::Transport {
                service: settings.service.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            retrier: Retrier::new(settings.backoff),
            settings,
            http,
            breaker,
        })
    }

    pub fn service(&self) -> &str {
        &self.settings.service
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Sends the request and returns the raw accepted response.
    pub async fn call(&self, request: RemoteRequest) -> Result<RemoteResponse> {
        self.execute(&request, |status, body| {
            Ok(RemoteResponse {
                status,
                body: body.to_vec(),
            })
        })
        .await
    }

    /// Sends the request and decodes the accepted body as JSON.
    ///
    /// A body that fails to decode counts as a failed attempt.
    pub async fn call_json<T: DeserializeOwned>(&self, request: RemoteRequest) -> Result<T> {
        self.execute(&request, |_, body| {
            serde_json::from_slice(body).map_err(|e| e.to_string())
        })
        .await
    }

    /// Sends the request, ignoring the body of an accepted response.
    pub async fn send(&self, request: RemoteRequest) -> Result<StatusCode> {
        self.execute(&request, |status, _| Ok(status)).await
    }

    async fn execute<T, D>(&self, request: &RemoteRequest, decode: D) -> Result<T>
    where
        D: Fn(StatusCode, &[u8]) -> std::result::Result<T, String>,
    {
        // An exhausted budget fails here without taking a probe slot.
        self.attempt_timeout(request.deadline)?;

        let decode = &decode;
        self.breaker
            .execute_classified(
                move || {
                    self.retrier.run_if(
                        move || self.attempt(request, decode),
                        RemoteError::is_retryable,
                    )
                },
                breaker_outcome,
            )
            .await
    }

    async fn attempt<T, D>(&self, request: &RemoteRequest, decode: &D) -> Result<T>
    where
        D: Fn(StatusCode, &[u8]) -> std::result::Result<T, String>,
    {
        let service = self.settings.service.as_str();
        metrics::counter!("remote_call_attempts_total", "service" => service.to_string())
            .increment(1);

        let result = self.round_trip(request, decode).await;
        if let Err(err) = &result {
            tracing::warn!(
                service,
                method = %request.method,
                path = %request.path,
                kind = err.kind(),
                error = %err,
                "Remote call attempt failed"
            );
            metrics::counter!(
                "remote_call_failures_total",
                "service" => service.to_string(),
                "kind" => err.kind()
            )
            .increment(1);
        }
        result
    }

    async fn round_trip<T, D>(&self, request: &RemoteRequest, decode: &D) -> Result<T>
    where
        D: Fn(StatusCode, &[u8]) -> std::result::Result<T, String>,
    {
        let timeout = self.attempt_timeout(request.deadline)?;
        let capped = timeout < self.settings.attempt_timeout;
        let url = format!(
            "{}{}",
            self.settings.base_url.trim_end_matches('/'),
            request.path
        );

        let mut builder = self.http.request(request.method.clone(), &url).timeout(timeout);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        tracing::debug!(service = %self.settings.service, method = %request.method, %url, "Sending remote request");

        let exchange = async {
            let response = builder.send().await?;
            let status = response.status();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        let (status, body) = match tokio::time::timeout(timeout, exchange).await {
            Err(_) => return Err(self.timeout(timeout, capped)),
            Ok(Err(e)) if e.is_timeout() => return Err(self.timeout(timeout, capped)),
            Ok(Err(e)) => {
                return Err(RemoteError::Transport {
                    service: self.settings.service.clone(),
                    reason: e.to_string(),
                });
            }
            Ok(Ok(exchange)) => exchange,
        };

        if !request.accepted.contains(&status) {
            tracing::debug!(
                service = %self.settings.service,
                status = status.as_u16(),
                body = %String::from_utf8_lossy(&body),
                "Peer answered with unexpected status"
            );
            return Err(RemoteError::UnexpectedStatus {
                service: self.settings.service.clone(),
                status: status.as_u16(),
            });
        }

        decode(status, &body).map_err(|reason| RemoteError::Decode {
            service: self.settings.service.clone(),
            reason,
        })
    }

    fn attempt_timeout(&self, deadline: Option<Instant>) -> Result<Duration> {
        let ceiling = self.settings.attempt_timeout;
        let Some(deadline) = deadline else {
            return Ok(ceiling);
        };
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(RemoteError::DeadlineExceeded {
                service: self.settings.service.clone(),
            });
        }
        Ok(remaining.min(ceiling))
    }

    /// A timeout cut short by the caller's deadline is the caller's, not the peer's.
    fn timeout(&self, timeout: Duration, capped: bool) -> RemoteError {
        if capped {
            return RemoteError::DeadlineExceeded {
                service: self.settings.service.clone(),
            };
        }
        RemoteError::Timeout {
            service: self.settings.service.clone(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }
}

fn breaker_outcome<T>(result: &Result<T>) -> CallOutcome {
    match result {
        Ok(_) => CallOutcome::Success,
        Err(RemoteError::DeadlineExceeded { .. }) => CallOutcome::Neutral,
        Err(_) => CallOutcome::Failure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> RemoteClient {
        RemoteClient::new(
            RemoteClientSettings::new("users", "http://users-service:8000")
                .with_attempt_timeout(Duration::from_secs(5)),
        )
        .unwrap()
    }

    #[test]
    fn test_settings_defaults() {
        let settings = RemoteClientSettings::new("users", "http://users-service:8000");
        assert_eq!(settings.attempt_timeout, Duration::from_secs(5));
        assert_eq!(settings.backoff, BackoffPolicy::default());
        assert_eq!(settings.breaker.name, "users");
        assert_eq!(settings.breaker.failure_threshold, 0);
    }

    #[test]
    fn test_with_breaker_keeps_service_name() {
        let settings = RemoteClientSettings::new("projects", "http://p")
            .with_breaker(BreakerSettings::new("other").with_failure_threshold(4));
        assert_eq!(settings.breaker.name, "projects");
        assert_eq!(settings.breaker.failure_threshold, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_without_deadline_uses_ceiling() {
        assert_eq!(client().attempt_timeout(None).unwrap(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_capped_by_remaining_deadline() {
        let deadline = Instant::now() + Duration::from_secs(2);
        assert_eq!(
            client().attempt_timeout(Some(deadline)).unwrap(),
            Duration::from_secs(2)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_deadline_is_rejected() {
        let deadline = Instant::now();
        tokio::time::advance(Duration::from_millis(1)).await;

        let err = client().attempt_timeout(Some(deadline)).unwrap_err();

        assert!(matches!(err, RemoteError::DeadlineExceeded { .. }));
    }

    #[test]
    fn test_timeout_capped_by_deadline_is_deadline_exceeded() {
        let client = client();

        assert!(matches!(
            client.timeout(Duration::from_secs(2), true),
            RemoteError::DeadlineExceeded { .. }
        ));
        assert!(matches!(
            client.timeout(Duration::from_secs(5), false),
            RemoteError::Timeout { timeout_ms: 5000, .. }
        ));
    }

    #[test]
    fn test_breaker_outcome_ignores_caller_deadline() {
        let deadline: Result<()> = Err(RemoteError::DeadlineExceeded {
            service: "users".to_string(),
        });
        let timeout: Result<()> = Err(RemoteError::Timeout {
            service: "users".to_string(),
            timeout_ms: 5000,
        });

        assert_eq!(breaker_outcome(&deadline), CallOutcome::Neutral);
        assert_eq!(breaker_outcome(&timeout), CallOutcome::Failure);
        assert_eq!(breaker_outcome(&Ok(())), CallOutcome::Success);
    }
}
