pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use common::AggregateId;
pub use error::{Result, StoreError};
pub use memory::InMemoryMembershipStore;
pub use postgres::{PgDocument, PostgresMembershipStore};
pub use store::{AddOutcome, MembershipStore, RemoveOutcome};
