//! Grant storage trait and in-memory implementation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use common::{CorrelationId, RecordId};
use tokio::sync::RwLock;

use super::{Grant, InventoryError};
use crate::value_objects::{ItemId, PlayerId};

/// Storage for inventory grants.
#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Inserts a grant if the player holds fewer than `cap` units of the item.
    ///
    /// `None` means uncapped. The check and insert must be atomic.
    async fn insert_capped(&self, grant: Grant, cap: Option<usize>) -> Result<(), InventoryError>;

    /// Inserts a grant unless one with the same id already exists.
    /// Returns `false` when the id was already present.
    async fn insert_if_absent(&self, grant: Grant) -> Result<bool, InventoryError>;

    /// Removes a grant by id. Returns `false` if no such grant exists.
    ///
    /// The correlation id of a removed grant is kept as a tombstone.
    async fn remove(&self, id: RecordId) -> Result<bool, InventoryError>;

    /// Whether a grant carrying `correlation_id` was removed by a rollback.
    async fn is_rolled_back(&self, correlation_id: CorrelationId) -> Result<bool, InventoryError>;

    /// Removes one arbitrary grant of `item_id` owned by the player.
    ///
    /// The removal is remembered under `correlation_id` so a replayed
    /// request can be answered without removing a second unit.
    async fn remove_one(
        &self,
        player_id: &PlayerId,
        item_id: &ItemId,
        correlation_id: Option<CorrelationId>,
    ) -> Result<Option<Grant>, InventoryError>;

    /// Number of units of `item_id` the player owns.
    async fn count(&self, player_id: &PlayerId, item_id: &ItemId) -> Result<usize, InventoryError>;

    async fn grants_for(&self, player_id: &PlayerId) -> Result<Vec<Grant>, InventoryError>;

    async fn find_by_correlation(
        &self,
        correlation_id: CorrelationId,
    ) -> Result<Option<Grant>, InventoryError>;

    /// The grant removed by the request with `correlation_id`, if any.
    async fn find_removal(
        &self,
        correlation_id: CorrelationId,
    ) -> Result<Option<Grant>, InventoryError>;
}

#[derive(Debug, Default)]
struct GrantState {
    grants: Vec<Grant>,
    removals: HashMap<CorrelationId, Grant>,
    rolled_back: HashSet<CorrelationId>,
}

/// In-memory grant store for tests and single-process deployments.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGrantStore {
    state: Arc<RwLock<GrantState>>,
}

impl InMemoryGrantStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of grants across all players.
    pub async fn grant_count(&self) -> usize {
        self.state.read().await.grants.len()
    }
}

fn owned(grant: &Grant, player_id: &PlayerId, item_id: &ItemId) -> bool {
    &grant.player_id == player_id && &grant.item_id == item_id
}

#[async_trait]
impl GrantStore for InMemoryGrantStore {
    async fn insert_capped(&self, grant: Grant, cap: Option<usize>) -> Result<(), InventoryError> {
        let mut state = self.state.write().await;
        if let Some(cap) = cap {
            let held = state
                .grants
                .iter()
                .filter(|g| owned(g, &grant.player_id, &grant.item_id))
                .count();
            if held >= cap {
                return Err(InventoryError::CapacityExceeded {
                    player_id: grant.player_id,
                    item_id: grant.item_id,
                    cap,
                });
            }
        }
        state.grants.push(grant);
        Ok(())
    }

    async fn insert_if_absent(&self, grant: Grant) -> Result<bool, InventoryError> {
        let mut state = self.state.write().await;
        if state.grants.iter().any(|g| g.id == grant.id) {
            return Ok(false);
        }
        state.grants.push(grant);
        Ok(true)
    }

    async fn remove(&self, id: RecordId) -> Result<bool, InventoryError> {
        let mut state = self.state.write().await;
        let Some(pos) = state.grants.iter().position(|g| g.id == id) else {
            return Ok(false);
        };
        let removed = state.grants.remove(pos);
        if let Some(correlation_id) = removed.correlation_id {
            state.rolled_back.insert(correlation_id);
        }
        Ok(true)
    }

    async fn is_rolled_back(&self, correlation_id: CorrelationId) -> Result<bool, InventoryError> {
        Ok(self.state.read().await.rolled_back.contains(&correlation_id))
    }

    async fn remove_one(
        &self,
        player_id: &PlayerId,
        item_id: &ItemId,
        correlation_id: Option<CorrelationId>,
    ) -> Result<Option<Grant>, InventoryError> {
        let mut state = self.state.write().await;
        let Some(pos) = state.grants.iter().position(|g| owned(g, player_id, item_id)) else {
            return Ok(None);
        };
        let grant = state.grants.remove(pos);
        if let Some(correlation_id) = correlation_id {
            state.removals.insert(correlation_id, grant.clone());
        }
        Ok(Some(grant))
    }

    async fn count(&self, player_id: &PlayerId, item_id: &ItemId) -> Result<usize, InventoryError> {
        Ok(self
            .state
            .read()
            .await
            .grants
            .iter()
            .filter(|g| owned(g, player_id, item_id))
            .count())
    }

    async fn grants_for(&self, player_id: &PlayerId) -> Result<Vec<Grant>, InventoryError> {
        Ok(self
            .state
            .read()
            .await
            .grants
            .iter()
            .filter(|g| &g.player_id == player_id)
            .cloned()
            .collect())
    }

    async fn find_by_correlation(
        &self,
        correlation_id: CorrelationId,
    ) -> Result<Option<Grant>, InventoryError> {
        Ok(self
            .state
            .read()
            .await
            .grants
            .iter()
            .find(|g| g.correlation_id == Some(correlation_id))
            .cloned())
    }

    async fn find_removal(
        &self,
        correlation_id: CorrelationId,
    ) -> Result<Option<Grant>, InventoryError> {
        Ok(self.state.read().await.removals.get(&correlation_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player() -> PlayerId {
        PlayerId::new("player-1")
    }

    fn sword() -> ItemId {
        ItemId::new("sword")
    }

    #[tokio::test]
    async fn insert_capped_enforces_cap() {
        let store = InMemoryGrantStore::new();
        store
            .insert_capped(Grant::new(player(), sword(), None), Some(1))
            .await
            .unwrap();

        let err = store
            .insert_capped(Grant::new(player(), sword(), None), Some(1))
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::CapacityExceeded { cap: 1, .. }));

        // Other items and other players are unaffected by the cap.
        store
            .insert_capped(Grant::new(player(), ItemId::new("shield"), None), Some(1))
            .await
            .unwrap();
        store
            .insert_capped(Grant::new(PlayerId::new("other"), sword(), None), Some(1))
            .await
            .unwrap();
        assert_eq!(store.grant_count().await, 3);
    }

    #[tokio::test]
    async fn remove_one_takes_a_single_unit() {
        let store = InMemoryGrantStore::new();
        for _ in 0..3 {
            store
                .insert_capped(Grant::new(player(), sword(), None), None)
                .await
                .unwrap();
        }

        let removed = store.remove_one(&player(), &sword(), None).await.unwrap();
        assert!(removed.is_some());
        assert_eq!(store.count(&player(), &sword()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn remove_one_of_unowned_item_returns_none() {
        let store = InMemoryGrantStore::new();
        let removed = store.remove_one(&player(), &sword(), None).await.unwrap();
        assert!(removed.is_none());
    }

    #[tokio::test]
    async fn removal_is_recorded_by_correlation() {
        let store = InMemoryGrantStore::new();
        store
            .insert_capped(Grant::new(player(), sword(), None), None)
            .await
            .unwrap();
        let correlation = CorrelationId::new();

        let removed = store
            .remove_one(&player(), &sword(), Some(correlation))
            .await
            .unwrap()
            .unwrap();

        let recorded = store.find_removal(correlation).await.unwrap().unwrap();
        assert_eq!(recorded.id, removed.id);
    }

    #[tokio::test]
    async fn insert_if_absent_is_idempotent() {
        let store = InMemoryGrantStore::new();
        let grant = Grant::new(player(), sword(), None);

        assert!(store.insert_if_absent(grant.clone()).await.unwrap());
        assert!(!store.insert_if_absent(grant).await.unwrap());
        assert_eq!(store.grant_count().await, 1);
    }

    #[tokio::test]
    async fn remove_by_id() {
        let store = InMemoryGrantStore::new();
        let grant = Grant::new(player(), sword(), None);
        let id = grant.id;
        store.insert_capped(grant, None).await.unwrap();

        assert!(store.remove(id).await.unwrap());
        assert!(!store.remove(id).await.unwrap());
        assert!(store.grants_for(&player()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_leaves_a_tombstone_for_the_correlation() {
        let store = InMemoryGrantStore::new();
        let correlation = CorrelationId::new();
        let grant = Grant::new(player(), sword(), Some(correlation));
        let id = grant.id;
        store.insert_capped(grant, None).await.unwrap();
        assert!(!store.is_rolled_back(correlation).await.unwrap());

        store.remove(id).await.unwrap();
        assert!(store.is_rolled_back(correlation).await.unwrap());
        assert!(store.find_by_correlation(correlation).await.unwrap().is_none());
    }
}
