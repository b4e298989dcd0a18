use std::sync::Arc;

use async_trait::async_trait;
use domain::{Member, Membered};

use crate::{AggregateId, Result};

/// Outcome of a conditional append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The member was appended to the roster.
    Added,
    /// A member with the same username was already on the roster; nothing changed.
    AlreadyMember,
    /// The aggregate is in a terminal state; nothing changed.
    Frozen,
}

/// Outcome of a pull-by-username.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The member was pulled from the roster.
    Removed,
    /// No member with that username was on the roster; nothing changed.
    NotMember,
    /// The aggregate is in a terminal state; nothing changed.
    Frozen,
}

/// Persistence surface for the member roster of one aggregate type.
///
/// Every mutation is a single atomic operation on one document:
/// `add_member` appends only when the aggregate exists, is not frozen and
/// has no member with the same username, so two concurrent adds of the
/// same person cannot both succeed. Store calls are not retried here.
#[async_trait]
pub trait MembershipStore<A: Membered>: Send + Sync {
    /// Inserts a new aggregate document.
    ///
    /// Fails with `Duplicate` if the id is taken.
    async fn insert(&self, aggregate: A) -> Result<()>;

    /// Loads an aggregate by id.
    async fn find(&self, id: &AggregateId) -> Result<Option<A>>;

    /// Returns true if the aggregate exists and lists this username.
    async fn member_exists(&self, id: &AggregateId, username: &str) -> Result<bool>;

    /// Appends a member to the roster.
    ///
    /// Fails with `NotFound` if the aggregate does not exist.
    async fn add_member(&self, id: &AggregateId, member: Member) -> Result<AddOutcome>;

    /// Pulls every roster entry with this username.
    ///
    /// Removing someone who is not a member is not an error.
    /// Fails with `NotFound` if the aggregate does not exist.
    async fn remove_member(&self, id: &AggregateId, username: &str) -> Result<RemoveOutcome>;

    /// Returns the roster in insertion order.
    ///
    /// Fails with `NotFound` if the aggregate does not exist.
    async fn get_members(&self, id: &AggregateId) -> Result<Vec<Member>>;
}

#[async_trait]
impl<A, T> MembershipStore<A> for Arc<T>
where
    A: Membered,
    T: MembershipStore<A> + ?Sized,
{
    async fn insert(&self, aggregate: A) -> Result<()> {
        (**self).insert(aggregate).await
    }

    async fn find(&self, id: &AggregateId) -> Result<Option<A>> {
        (**self).find(id).await
    }

    async fn member_exists(&self, id: &AggregateId, username: &str) -> Result<bool> {
        (**self).member_exists(id, username).await
    }

    async fn add_member(&self, id: &AggregateId, member: Member) -> Result<AddOutcome> {
        (**self).add_member(id, member).await
    }

    async fn remove_member(&self, id: &AggregateId, username: &str) -> Result<RemoveOutcome> {
        (**self).remove_member(id, username).await
    }

    async fn get_members(&self, id: &AggregateId) -> Result<Vec<Member>> {
        (**self).get_members(id).await
    }
}
