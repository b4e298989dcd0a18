//! Domain layer for membership orchestration.
//!
//! This crate provides:
//! - `Member`, the denormalized person snapshot stored on an aggregate
//! - `Project` and `Task`, the two aggregates that own member rosters
//! - `Membered`, the trait the store and orchestrator are generic over

pub mod aggregate;
pub mod error;
pub mod member;
pub mod project;
pub mod task;

pub use aggregate::{AggregateKind, Membered};
pub use error::DomainError;
pub use member::Member;
pub use project::Project;
pub use task::{Task, TaskStatus};
