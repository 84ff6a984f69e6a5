//! Relationship store contract and an in-memory implementation

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::models::{RelationshipStatus, UserId};

/// Per ordered pair status storage shared across the whole client.
///
/// `status(a, b)` is how `a` regards `b`. Implementations must allow
/// concurrent reads from many conversations.
#[async_trait]
pub trait RelationshipStore: Send + Sync {
    /// Directional status, `None` when no record exists yet
    async fn status(
        &self,
        user: &UserId,
        counterpart: &UserId,
    ) -> Result<Option<RelationshipStatus>>;

    /// Whether either user blocked the other
    async fn is_blocked(&self, a: &UserId, b: &UserId) -> Result<bool>;

    /// Authoritative friendship check, when the backend has one
    async fn known_friendship(&self, _a: &UserId, _b: &UserId) -> Result<Option<bool>> {
        Ok(None)
    }

    /// Write `user`'s own status towards `counterpart`
    async fn set_status(
        &self,
        user: &UserId,
        counterpart: &UserId,
        status: RelationshipStatus,
    ) -> Result<()>;
}

#[derive(Default)]
struct RelationshipTables {
    statuses: HashMap<(UserId, UserId), RelationshipStatus>,
    blocks: HashSet<(UserId, UserId)>,
    friendships: HashMap<(UserId, UserId), bool>,
}

/// `RwLock`-backed store: concurrent reads, serialized writes.
#[derive(Default)]
pub struct InMemoryRelationshipStore {
    tables: RwLock<RelationshipTables>,
    offline: AtomicBool,
}

impl InMemoryRelationshipStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed both directions of a pair
    pub async fn seed_pair(
        &self,
        a: &UserId,
        b: &UserId,
        a_to_b: RelationshipStatus,
        b_to_a: RelationshipStatus,
    ) {
        let mut tables = self.tables.write().await;
        tables.statuses.insert((a.clone(), b.clone()), a_to_b);
        tables.statuses.insert((b.clone(), a.clone()), b_to_a);
    }

    /// Record that `blocker` blocked `blocked`
    pub async fn block(&self, blocker: &UserId, blocked: &UserId) {
        self.tables
            .write()
            .await
            .blocks
            .insert((blocker.clone(), blocked.clone()));
    }

    pub async fn unblock(&self, blocker: &UserId, blocked: &UserId) {
        self.tables
            .write()
            .await
            .blocks
            .remove(&(blocker.clone(), blocked.clone()));
    }

    /// Set the authoritative friendship answer for a pair (order independent)
    pub async fn set_known_friendship(&self, a: &UserId, b: &UserId, friends: bool) {
        self.tables
            .write()
            .await
            .friendships
            .insert(ordered_pair(a, b), friends);
    }

    /// Make every call fail with `RemoteUnavailable` until switched back
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(Error::RemoteUnavailable(
                "relationship store is offline".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

fn ordered_pair(a: &UserId, b: &UserId) -> (UserId, UserId) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

#[async_trait]
impl RelationshipStore for InMemoryRelationshipStore {
    async fn status(
        &self,
        user: &UserId,
        counterpart: &UserId,
    ) -> Result<Option<RelationshipStatus>> {
        self.ensure_online()?;
        let tables = self.tables.read().await;
        Ok(tables
            .statuses
            .get(&(user.clone(), counterpart.clone()))
            .copied())
    }

    async fn is_blocked(&self, a: &UserId, b: &UserId) -> Result<bool> {
        self.ensure_online()?;
        let tables = self.tables.read().await;
        Ok(tables.blocks.contains(&(a.clone(), b.clone()))
            || tables.blocks.contains(&(b.clone(), a.clone())))
    }

    async fn known_friendship(&self, a: &UserId, b: &UserId) -> Result<Option<bool>> {
        self.ensure_online()?;
        let tables = self.tables.read().await;
        Ok(tables.friendships.get(&ordered_pair(a, b)).copied())
    }

    async fn set_status(
        &self,
        user: &UserId,
        counterpart: &UserId,
        status: RelationshipStatus,
    ) -> Result<()> {
        self.ensure_online()?;
        self.tables
            .write()
            .await
            .statuses
            .insert((user.clone(), counterpart.clone()), status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "current_thread")]
    async fn statuses_are_directional() {
        let store = InMemoryRelationshipStore::new();
        let alice = UserId::from("alice");
        let bob = UserId::from("bob");
        store
            .seed_pair(
                &alice,
                &bob,
                RelationshipStatus::IUnadded,
                RelationshipStatus::TheyUnadded,
            )
            .await;

        assert_eq!(
            store.status(&alice, &bob).await.unwrap(),
            Some(RelationshipStatus::IUnadded)
        );
        assert_eq!(
            store.status(&bob, &alice).await.unwrap(),
            Some(RelationshipStatus::TheyUnadded)
        );
        assert_eq!(store.status(&alice, &UserId::from("carol")).await.unwrap(), None);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn blocks_apply_in_both_directions() {
        let store = InMemoryRelationshipStore::new();
        let alice = UserId::from("alice");
        let bob = UserId::from("bob");

        store.block(&bob, &alice).await;
        assert!(store.is_blocked(&alice, &bob).await.unwrap());
        assert!(store.is_blocked(&bob, &alice).await.unwrap());

        store.unblock(&bob, &alice).await;
        assert!(!store.is_blocked(&alice, &bob).await.unwrap());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn offline_store_reports_remote_unavailable() {
        let store = InMemoryRelationshipStore::new();
        store.set_offline(true);
        let result = store
            .status(&UserId::from("alice"), &UserId::from("bob"))
            .await;
        assert!(matches!(result, Err(Error::RemoteUnavailable(_))));
    }
}
