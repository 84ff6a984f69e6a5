//! Relationship evaluation and add/restore actions over a shared store

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::Mutex;

use super::machine::RelationshipSnapshot;
use super::store::RelationshipStore;
use crate::error::Result;
use crate::models::{AddIntent, RelationshipGate, UserId};

/// Reads the store into snapshots and carries out add intents.
///
/// Only the caller's own direction is ever written. The read-decide-write of
/// an add action is serialized per ordered user pair.
#[derive(Clone)]
pub struct RelationshipService {
    store: Arc<dyn RelationshipStore>,
    pair_locks: Arc<StdMutex<HashMap<(UserId, UserId), Arc<Mutex<()>>>>>,
}

impl RelationshipService {
    pub fn new(store: Arc<dyn RelationshipStore>) -> Self {
        Self {
            store,
            pair_locks: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    /// Read both directions and the out-of-band signals for `me` and `other`
    pub async fn snapshot(&self, me: &UserId, other: &UserId) -> Result<RelationshipSnapshot> {
        let mine = self.store.status(me, other).await?;
        let theirs = self.store.status(other, me).await?;
        let blocked = self.store.is_blocked(me, other).await?;
        let known_friends = self.store.known_friendship(me, other).await?;
        Ok(RelationshipSnapshot {
            mine,
            theirs,
            known_friends,
            blocked,
        })
    }

    pub async fn evaluate(&self, me: &UserId, other: &UserId) -> Result<RelationshipGate> {
        Ok(self.snapshot(me, other).await?.gate())
    }

    /// Carry out the add/restore action for `me` towards `other`.
    ///
    /// Returns the intent that was applied, or `None` when the pair is
    /// blocked and nothing was written.
    pub async fn perform_add_action(
        &self,
        me: &UserId,
        other: &UserId,
    ) -> Result<Option<AddIntent>> {
        let pair_lock = self.pair_lock(me, other);
        let result = {
            let _guard = pair_lock.lock().await;
            self.apply_add_action(me, other).await
        };
        drop(pair_lock);
        self.release_pair_lock(me, other);
        result
    }

    async fn apply_add_action(&self, me: &UserId, other: &UserId) -> Result<Option<AddIntent>> {
        let snapshot = self.snapshot(me, other).await?;
        let Some(intent) = snapshot.add_intent() else {
            tracing::debug!("Add action ignored for blocked pair {} -> {}", me, other);
            return Ok(None);
        };

        if let Some(next) = intent.next_status() {
            self.store.set_status(me, other, next).await?;
            tracing::info!(
                "Relationship {} -> {} set to {} ({})",
                me,
                other,
                next,
                intent
            );
        } else {
            tracing::debug!("Add request from {} to {} already pending", me, other);
        }

        Ok(Some(intent))
    }

    fn pair_lock(&self, me: &UserId, other: &UserId) -> Arc<Mutex<()>> {
        let mut locks = self
            .pair_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks
            .entry((me.clone(), other.clone()))
            .or_default()
            .clone()
    }

    /// Forget the lock for a pair once no action holds or waits on it
    fn release_pair_lock(&self, me: &UserId, other: &UserId) {
        let mut locks = self
            .pair_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let key = (me.clone(), other.clone());
        if locks
            .get(&key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RelationshipStatus, RelationshipView};
    use crate::relationship::InMemoryRelationshipStore;
    use pretty_assertions::assert_eq;

    fn users() -> (UserId, UserId) {
        (UserId::from("alice"), UserId::from("bob"))
    }

    #[tokio::test(flavor = "current_thread")]
    async fn second_mover_writes_only_own_direction() {
        let (alice, bob) = users();
        let store = Arc::new(InMemoryRelationshipStore::new());
        store
            .seed_pair(
                &alice,
                &bob,
                RelationshipStatus::BothUnadded,
                RelationshipStatus::PendingAdd,
            )
            .await;
        let service = RelationshipService::new(store.clone());

        let intent = service.perform_add_action(&alice, &bob).await.unwrap();
        assert_eq!(intent, Some(AddIntent::SendRequest));
        assert_eq!(
            store.status(&alice, &bob).await.unwrap(),
            Some(RelationshipStatus::PendingAdd)
        );
        assert_eq!(
            store.status(&bob, &alice).await.unwrap(),
            Some(RelationshipStatus::PendingAdd)
        );

        let gate = service.evaluate(&alice, &bob).await.unwrap();
        assert_eq!(gate.view(), Some(RelationshipView::TheyUnadded));
        assert!(!gate.can_send());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn wait_intent_writes_nothing() {
        let (alice, bob) = users();
        let store = Arc::new(InMemoryRelationshipStore::new());
        store
            .seed_pair(
                &alice,
                &bob,
                RelationshipStatus::PendingAdd,
                RelationshipStatus::BothUnadded,
            )
            .await;
        let service = RelationshipService::new(store.clone());

        let intent = service.perform_add_action(&alice, &bob).await.unwrap();
        assert_eq!(intent, Some(AddIntent::Wait));
        assert_eq!(
            store.status(&alice, &bob).await.unwrap(),
            Some(RelationshipStatus::PendingAdd)
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn restore_directly_sets_friends() {
        let (alice, bob) = users();
        let store = Arc::new(InMemoryRelationshipStore::new());
        store
            .seed_pair(
                &alice,
                &bob,
                RelationshipStatus::IUnadded,
                RelationshipStatus::Friends,
            )
            .await;
        let service = RelationshipService::new(store.clone());

        let intent = service.perform_add_action(&alice, &bob).await.unwrap();
        assert_eq!(intent, Some(AddIntent::RestoreDirectly));

        let gate = service.evaluate(&alice, &bob).await.unwrap();
        assert_eq!(
            gate,
            RelationshipGate::Visible {
                view: RelationshipView::Friends,
                can_send: true,
            }
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn blocked_pair_is_hidden_and_not_written() {
        let (alice, bob) = users();
        let store = Arc::new(InMemoryRelationshipStore::new());
        store
            .seed_pair(
                &alice,
                &bob,
                RelationshipStatus::BothUnadded,
                RelationshipStatus::BothUnadded,
            )
            .await;
        store.block(&bob, &alice).await;
        let service = RelationshipService::new(store.clone());

        assert_eq!(
            service.evaluate(&alice, &bob).await.unwrap(),
            RelationshipGate::Hidden
        );
        assert_eq!(service.perform_add_action(&alice, &bob).await.unwrap(), None);
        assert_eq!(
            store.status(&alice, &bob).await.unwrap(),
            Some(RelationshipStatus::BothUnadded)
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn pair_locks_are_released_after_add_actions() {
        let (alice, bob) = users();
        let store = Arc::new(InMemoryRelationshipStore::new());
        store
            .seed_pair(
                &alice,
                &bob,
                RelationshipStatus::BothUnadded,
                RelationshipStatus::BothUnadded,
            )
            .await;
        let service = RelationshipService::new(store);

        let (mine, theirs) = tokio::join!(
            service.perform_add_action(&alice, &bob),
            service.perform_add_action(&bob, &alice)
        );
        assert!(mine.unwrap().is_some());
        assert!(theirs.unwrap().is_some());
        assert!(service.pair_locks.lock().unwrap().is_empty());

        let held = service.pair_lock(&alice, &bob);
        service.perform_add_action(&alice, &bob).await.unwrap();
        assert!(service
            .pair_locks
            .lock()
            .unwrap()
            .contains_key(&(alice.clone(), bob.clone())));
        drop(held);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn known_friendship_allows_sending() {
        let (alice, bob) = users();
        let store = Arc::new(InMemoryRelationshipStore::new());
        store
            .seed_pair(
                &alice,
                &bob,
                RelationshipStatus::IUnadded,
                RelationshipStatus::TheyUnadded,
            )
            .await;
        store.set_known_friendship(&alice, &bob, true).await;
        let service = RelationshipService::new(store);

        assert!(service.evaluate(&alice, &bob).await.unwrap().can_send());
    }
}
