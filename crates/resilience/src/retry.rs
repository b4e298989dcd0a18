//! Bounded retries with a pluggable delay schedule.
//!
//! The delay schedule comes from `backon`; the loop itself stays here so
//! each attempt can be logged and the retry predicate can see the error.

use std::future::Future;
use std::time::Duration;

use backon::{BackoffBuilder, ConstantBuilder, ExponentialBuilder};

/// How long to wait between attempts, and how many attempts to make.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackoffPolicy {
    /// Fixed delay between attempts.
    Constant { delay: Duration, attempts: usize },
    /// Delay starts at `min_delay` and grows by `factor`, capped at `max_delay`.
    Exponential {
        min_delay: Duration,
        max_delay: Duration,
        factor: f32,
        attempts: usize,
    },
}

impl Default for BackoffPolicy {
    /// Three attempts, 100ms apart.
    fn default() -> Self {
        Self::Constant {
            delay: Duration::from_millis(100),
            attempts: 3,
        }
    }
}

impl BackoffPolicy {
    pub fn constant(attempts: usize, delay: Duration) -> Self {
        Self::Constant { delay, attempts }
    }

    pub fn exponential(attempts: usize, min_delay: Duration, max_delay: Duration) -> Self {
        Self::Exponential {
            min_delay,
            max_delay,
            factor: 2.0,
            attempts,
        }
    }

    /// Total attempts, including the first. Never less than one.
    pub fn max_attempts(&self) -> usize {
        let attempts = match self {
            Self::Constant { attempts, .. } | Self::Exponential { attempts, .. } => *attempts,
        };
        attempts.max(1)
    }

    /// Returns the waits between consecutive attempts.
    pub fn delays(&self) -> Box<dyn Iterator<Item = Duration> + Send> {
        let retries = self.max_attempts() - 1;
        match *self {
            Self::Constant { delay, .. } => Box::new(
                ConstantBuilder::default()
                    .with_delay(delay)
                    .with_max_times(retries)
                    .build(),
            ),
            Self::Exponential {
                min_delay,
                max_delay,
                factor,
                ..
            } => Box::new(
                ExponentialBuilder::default()
                    .with_min_delay(min_delay)
                    .with_max_delay(max_delay)
                    .with_factor(factor)
                    .with_max_times(retries)
                    .build(),
            ),
        }
    }
}

/// Runs an operation up to the policy's attempt limit.
#[derive(Debug, Clone, Default)]
pub struct Retrier {
    policy: BackoffPolicy,
}

impl Retrier {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Retries every failure; returns the last error once attempts run out.
    pub async fn run<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.run_if(operation, |_| true).await
    }

    /// Like [`Retrier::run`], but stops early when `should_retry` rejects the error.
    pub async fn run_if<T, E, F, Fut, P>(&self, mut operation: F, should_retry: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let max_attempts = self.policy.max_attempts();
        let mut delays = self.policy.delays();
        let mut attempt = 1;

        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !should_retry(&err) {
                tracing::debug!(attempt, error = %err, "Not retrying");
                return Err(err);
            }

            let Some(delay) = delays.next() else {
                tracing::warn!(attempts = attempt, error = %err, "Giving up after final attempt");
                return Err(err);
            };

            tracing::debug!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
