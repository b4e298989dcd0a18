//! Peer service ports and their HTTP and in-memory implementations.

pub mod eligibility;
pub mod notification;

pub use eligibility::{
    AvailableMembersClient, Eligibility, EligibilityQuery, EligibilityService,
    InMemoryEligibilityService, ProjectRosterClient,
};
pub use notification::{HttpNotifier, InMemoryNotifier, NotificationRequest, Notifier};
