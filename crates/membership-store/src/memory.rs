use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{Member, Membered};
use tokio::sync::RwLock;

use crate::{
    AggregateId, Result, StoreError,
    store::{AddOutcome, MembershipStore, RemoveOutcome},
};

struct InMemoryState<A> {
    documents: HashMap<AggregateId, A>,
    mutations: usize,
    unavailable: bool,
}

impl<A> Default for InMemoryState<A> {
    fn default() -> Self {
        Self {
            documents: HashMap::new(),
            mutations: 0,
            unavailable: false,
        }
    }
}

impl<A> InMemoryState<A> {
    fn check_available(&self) -> Result<()> {
        if self.unavailable {
            return Err(StoreError::Unavailable("store is offline".to_string()));
        }
        Ok(())
    }
}

/// In-memory membership store.
///
/// Every operation holds the write lock for its whole read-check-write
/// sequence, which gives the same per-document atomicity as the
/// PostgreSQL implementation. Clones share state.
pub struct InMemoryMembershipStore<A> {
    state: Arc<RwLock<InMemoryState<A>>>,
}

impl<A> Clone for InMemoryMembershipStore<A> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<A> Default for InMemoryMembershipStore<A> {
    fn default() -> Self {
        Self {
            state: Arc::new(RwLock::new(InMemoryState::default())),
        }
    }
}

impl<A: Membered> InMemoryMembershipStore<A> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with the given aggregates.
    pub fn with_documents(documents: impl IntoIterator<Item = A>) -> Self {
        let documents = documents
            .into_iter()
            .map(|doc| (doc.id().clone(), doc))
            .collect();
        Self {
            state: Arc::new(RwLock::new(InMemoryState {
                documents,
                ..InMemoryState::default()
            })),
        }
    }

    /// Returns how many roster mutations have been applied.
    pub async fn mutation_count(&self) -> usize {
        self.state.read().await.mutations
    }

    /// Makes every subsequent call fail with `Unavailable` until reset.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }

    /// Replaces a stored aggregate, e.g. to change its status in a test.
    pub async fn replace(&self, aggregate: A) {
        self.state
            .write()
            .await
            .documents
            .insert(aggregate.id().clone(), aggregate);
    }
}

fn not_found<A: Membered>(id: &AggregateId) -> StoreError {
    StoreError::NotFound {
        kind: A::kind(),
        id: id.clone(),
    }
}

#[async_trait]
impl<A: Membered> MembershipStore<A> for InMemoryMembershipStore<A> {
    async fn insert(&self, aggregate: A) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_available()?;

        let id = aggregate.id().clone();
        if state.documents.contains_key(&id) {
            return Err(StoreError::Duplicate { kind: A::kind(), id });
        }
        state.documents.insert(id, aggregate);
        Ok(())
    }

    async fn find(&self, id: &AggregateId) -> Result<Option<A>> {
        let state = self.state.read().await;
        state.check_available()?;
        Ok(state.documents.get(id).cloned())
    }

    async fn member_exists(&self, id: &AggregateId, username: &str) -> Result<bool> {
        let state = self.state.read().await;
        state.check_available()?;
        Ok(state
            .documents
            .get(id)
            .is_some_and(|doc| doc.has_member(username)))
    }

    async fn add_member(&self, id: &AggregateId, member: Member) -> Result<AddOutcome> {
        let mut state = self.state.write().await;
        state.check_available()?;

        let doc = state.documents.get_mut(id).ok_or_else(|| not_found::<A>(id))?;
        if doc.frozen_state().is_some() {
            return Ok(AddOutcome::Frozen);
        }
        if doc.has_member(&member.username) {
            return Ok(AddOutcome::AlreadyMember);
        }
        doc.members_mut().push(member);
        state.mutations += 1;
        Ok(AddOutcome::Added)
    }

    async fn remove_member(&self, id: &AggregateId, username: &str) -> Result<RemoveOutcome> {
        let mut state = self.state.write().await;
        state.check_available()?;

        let doc = state.documents.get_mut(id).ok_or_else(|| not_found::<A>(id))?;
        if doc.frozen_state().is_some() {
            return Ok(RemoveOutcome::Frozen);
        }
        if !doc.has_member(username) {
            return Ok(RemoveOutcome::NotMember);
        }
        doc.members_mut().retain(|m| !m.is(username));
        state.mutations += 1;
        Ok(RemoveOutcome::Removed)
    }

    async fn get_members(&self, id: &AggregateId) -> Result<Vec<Member>> {
        let state = self.state.read().await;
        state.check_available()?;
        state
            .documents
            .get(id)
            .map(|doc| doc.members().to_vec())
            .ok_or_else(|| not_found::<A>(id))
    }
}
