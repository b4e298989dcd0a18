//! Resilience primitives for calls to peer services.
//!
//! - [`Retrier`]: bounded retries with a pluggable constant or exponential delay
//! - [`CircuitBreaker`]: Closed / Open / HalfOpen breaker shared per dependency
//! - [`RemoteClient`]: one HTTP dependency behind breaker, retrier and timeouts
//!
//! The breaker wraps a whole retrier run, so one logical call is one
//! breaker outcome and an open breaker is never retried against.

pub mod breaker;
pub mod client;
pub mod error;
pub mod retry;

pub use breaker::{
    BreakerSettings, BreakerState, CallOutcome, CircuitBreaker, StateChangeListener,
};
pub use client::{RemoteClient, RemoteClientSettings, RemoteRequest, RemoteResponse};
pub use error::{CircuitOpenError, RemoteError, Result};
pub use retry::{BackoffPolicy, Retrier};
