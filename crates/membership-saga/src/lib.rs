//! Membership orchestration for projects and tasks.
//!
//! Adding a member is a saga over separately failing parts:
//! 1. Check eligibility with a peer service
//! 2. Check the roster for an existing entry
//! 3. Append the member to the aggregate (point of no return)
//! 4. Notify the member, best effort
//!
//! Removal follows the same order without the eligibility step. Nothing
//! is compensated: once the roster changed, a failed notification is
//! logged and the operation still succeeds.

pub mod error;
pub mod orchestrator;
pub mod services;
pub mod state;

pub use error::{MembershipError, Result};
pub use orchestrator::{
    AddMember, BroadcastReport, MembershipOrchestrator, MembershipReport, NotificationDispatch,
    OrchestratorSettings, ProjectMembership, RemoveMember, TaskMembership,
};
pub use services::{
    AvailableMembersClient, Eligibility, EligibilityQuery, EligibilityService, HttpNotifier,
    InMemoryEligibilityService, InMemoryNotifier, NotificationRequest, Notifier,
    ProjectRosterClient,
};
pub use state::{MembershipChange, MembershipStep, NotificationOutcome};
