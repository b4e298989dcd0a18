//! Circuit breaker guarding one remote dependency.
//!
//! # States
//!
//! - **Closed**: calls pass through; consecutive failures are counted.
//! - **Open**: calls fail fast with [`CircuitOpenError`] until the cool-down elapses.
//! - **HalfOpen**: a single probe call is admitted; its outcome closes or reopens the circuit.
//!
//! Every transition starts a new generation. Outcomes reported by calls
//! admitted under an older generation are ignored.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::CircuitOpenError;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a finished call counts toward the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Failure,
    /// Says nothing about the dependency, e.g. the caller's own deadline ran
    /// out. Releases a probe slot without changing any counter.
    Neutral,
}

impl CallOutcome {
    /// `Success` for `Ok`, `Failure` for `Err`.
    pub fn of<T, E>(result: &Result<T, E>) -> Self {
        if result.is_ok() {
            CallOutcome::Success
        } else {
            CallOutcome::Failure
        }
    }
}

/// Breaker tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerSettings {
    /// Name used in logs, metrics and errors.
    pub name: String,
    /// The breaker trips once consecutive failures exceed this value.
    pub failure_threshold: u32,
    /// Time spent Open before a probe is admitted.
    pub cool_down: Duration,
    /// Probes admitted concurrently while HalfOpen.
    pub half_open_max_calls: u32,
}

impl BreakerSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_failure_threshold(mut self, failure_threshold: u32) -> Self {
        self.failure_threshold = failure_threshold;
        self
    }

    pub fn with_cool_down(mut self, cool_down: Duration) -> Self {
        self.cool_down = cool_down;
        self
    }
}

impl Default for BreakerSettings {
    /// Trips on the first failure and probes again after two seconds.
    fn default() -> Self {
        Self {
            name: "remote".to_string(),
            failure_threshold: 0,
            cool_down: Duration::from_secs(2),
            half_open_max_calls: 1,
        }
    }
}

/// Callback invoked after every transition with `(breaker, from, to)`.
pub type StateChangeListener = Arc<dyn Fn(&str, BreakerState, BreakerState) + Send + Sync>;

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    generation: u64,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probes_in_flight: u32,
}

type Transition = (BreakerState, BreakerState);

/// Three-state circuit breaker.
///
/// One instance is shared (behind an `Arc`) by every caller of the same
/// dependency. Calls that never complete because their future was dropped
/// are recorded as failures.
pub struct CircuitBreaker {
    settings: BreakerSettings,
    inner: Mutex<Inner>,
    listener: Option<StateChangeListener>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("settings", &self.settings)
            .field("inner", &*self.lock())
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            settings,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                generation: 0,
                consecutive_failures: 0,
                opened_at: None,
                probes_in_flight: 0,
            }),
            listener: None,
        }
    }

    /// Registers a callback run after each transition, in addition to logging.
    pub fn with_listener(mut self, listener: StateChangeListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    /// Returns the current state, moving Open to HalfOpen if the cool-down has elapsed.
    pub fn state(&self) -> BreakerState {
        let (state, transition) = {
            let mut inner = self.lock();
            let transition = self.refresh(&mut inner, Instant::now());
            (inner.state, transition)
        };
        self.notify(transition);
        state
    }

    /// Returns the stored state without applying the cool-down.
    ///
    /// Reporting only: an Open breaker whose cool-down has elapsed still
    /// reads as Open until a caller or [`CircuitBreaker::state`] moves it.
    pub fn peek_state(&self) -> BreakerState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Runs `operation` if the breaker admits it and records the outcome.
    ///
    /// Rejected calls never invoke `operation` and return
    /// `CircuitOpenError` converted into the caller's error type.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CircuitOpenError>,
    {
        self.execute_classified(operation, CallOutcome::of).await
    }

    /// Like [`CircuitBreaker::execute`], with `classify` deciding how the
    /// result counts.
    pub async fn execute_classified<T, E, F, Fut, C>(
        &self,
        operation: F,
        classify: C,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CircuitOpenError>,
        C: FnOnce(&Result<T, E>) -> CallOutcome,
    {
        let permit = self.acquire().map_err(E::from)?;
        let result = operation().await;
        permit.settle(classify(&result));
        result
    }

    fn acquire(&self) -> Result<Permit<'_>, CircuitOpenError> {
        let (admitted, transition) = {
            let mut inner = self.lock();
            let transition = self.refresh(&mut inner, Instant::now());
            let admitted = match inner.state {
                BreakerState::Closed => Some(false),
                BreakerState::Open => None,
                BreakerState::HalfOpen => {
                    if inner.probes_in_flight < self.settings.half_open_max_calls.max(1) {
                        inner.probes_in_flight += 1;
                        Some(true)
                    } else {
                        None
                    }
                }
            }
            .map(|probe| (inner.generation, probe));
            (admitted, transition)
        };
        self.notify(transition);

        match admitted {
            Some((generation, probe)) => Ok(Permit {
                breaker: self,
                generation,
                probe,
                settled: false,
            }),
            None => {
                tracing::debug!(breaker = %self.settings.name, "Circuit open, rejecting call");
                Err(CircuitOpenError {
                    breaker: self.settings.name.clone(),
                })
            }
        }
    }

    fn record(&self, generation: u64, probe: bool, outcome: CallOutcome) {
        let transition = {
            let mut inner = self.lock();
            let now = Instant::now();
            let mut transition = self.refresh(&mut inner, now);
            if inner.generation == generation {
                if probe {
                    inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
                }
                match (inner.state, outcome) {
                    (_, CallOutcome::Neutral) => {}
                    (BreakerState::Closed, CallOutcome::Success) => inner.consecutive_failures = 0,
                    (BreakerState::Closed, CallOutcome::Failure) => {
                        inner.consecutive_failures += 1;
                        if inner.consecutive_failures > self.settings.failure_threshold {
                            transition = self.transition(&mut inner, BreakerState::Open, now);
                        }
                    }
                    (BreakerState::HalfOpen, CallOutcome::Success) => {
                        transition = self.transition(&mut inner, BreakerState::Closed, now);
                    }
                    (BreakerState::HalfOpen, CallOutcome::Failure) => {
                        transition = self.transition(&mut inner, BreakerState::Open, now);
                    }
                    (BreakerState::Open, _) => {}
                }
            }
            transition
        };
        self.notify(transition);
    }

    fn refresh(&self, inner: &mut Inner, now: Instant) -> Option<Transition> {
        match (inner.state, inner.opened_at) {
            (BreakerState::Open, Some(opened_at))
                if now.saturating_duration_since(opened_at) >= self.settings.cool_down =>
            {
                self.transition(inner, BreakerState::HalfOpen, now)
            }
            _ => None,
        }
    }

    fn transition(&self, inner: &mut Inner, to: BreakerState, now: Instant) -> Option<Transition> {
        let from = inner.state;
        if from == to {
            return None;
        }
        inner.state = to;
        inner.generation += 1;
        inner.consecutive_failures = 0;
        inner.probes_in_flight = 0;
        inner.opened_at = (to == BreakerState::Open).then_some(now);
        Some((from, to))
    }

    fn notify(&self, transition: Option<Transition>) {
        let Some((from, to)) = transition else {
            return;
        };
        let name = self.settings.name.as_str();
        match to {
            BreakerState::Open => {
                tracing::warn!(breaker = %name, %from, %to, "Circuit breaker state changed")
            }
            _ => tracing::info!(breaker = %name, %from, %to, "Circuit breaker state changed"),
        }
        metrics::counter!(
            "circuit_breaker_transitions_total",
            "breaker" => name.to_string(),
            "to" => to.as_str()
        )
        .increment(1);
        if let Some(listener) = &self.listener {
            listener(name, from, to);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Admission ticket for one call. Dropping it unsettled records a failure.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    probe: bool,
    settled: bool,
}

impl Permit<'_> {
    fn settle(mut self, outcome: CallOutcome) {
        self.settled = true;
        self.breaker.record(self.generation, self.probe, outcome);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker
                .record(self.generation, self.probe, CallOutcome::Failure);
        }
    }
}
