//! Inventory service: item grants and revocations on behalf of the saga stages.

use std::collections::HashMap;

use chrono::Utc;
use common::{CorrelationId, RecordId};

use super::{Grant, GrantStore, InventoryError};
use crate::value_objects::{ItemId, PlayerId};

/// Grants and revokes item units.
///
/// An optional per-item cap bounds how many units of an item a single player
/// may hold; a grant that would exceed it fails with
/// [`InventoryError::CapacityExceeded`].
pub struct InventoryService<G: GrantStore> {
    store: G,
    item_caps: HashMap<ItemId, usize>,
    default_cap: Option<usize>,
}

impl<G: GrantStore> InventoryService<G> {
    pub fn new(store: G) -> Self {
        Self {
            store,
            item_caps: HashMap::new(),
            default_cap: None,
        }
    }

    /// Caps every item without an explicit cap at `cap` units per player.
    pub fn with_default_cap(mut self, cap: usize) -> Self {
        self.default_cap = Some(cap);
        self
    }

    /// Caps `item_id` at `cap` units per player.
    pub fn with_item_cap(mut self, item_id: impl Into<ItemId>, cap: usize) -> Self {
        self.item_caps.insert(item_id.into(), cap);
        self
    }

    pub fn store(&self) -> &G {
        &self.store
    }

    fn cap_for(&self, item_id: &ItemId) -> Option<usize> {
        self.item_caps.get(item_id).copied().or(self.default_cap)
    }

    /// Grants one unit of `item_id` to the player.
    ///
    /// A replayed request returns the original grant; a replay of a
    /// rolled-back request fails with [`InventoryError::RolledBack`].
    #[tracing::instrument(skip(self))]
    pub async fn grant(
        &self,
        player_id: &PlayerId,
        item_id: &ItemId,
        correlation_id: Option<CorrelationId>,
    ) -> Result<Grant, InventoryError> {
        if let Some(correlation_id) = correlation_id {
            if self.store.is_rolled_back(correlation_id).await? {
                tracing::warn!(%correlation_id, "Replay of a rolled-back grant refused");
                return Err(InventoryError::RolledBack(correlation_id));
            }
            if let Some(existing) = self.store.find_by_correlation(correlation_id).await? {
                tracing::debug!(%correlation_id, grant_id = %existing.id, "Replayed grant request");
                return Ok(existing);
            }
        }

        let grant = Grant::new(player_id.clone(), item_id.clone(), correlation_id);
        self.store
            .insert_capped(grant.clone(), self.cap_for(item_id))
            .await?;

        tracing::debug!(grant_id = %grant.id, "Item granted");
        Ok(grant)
    }

    /// Revokes one unit of `item_id` from the player.
    #[tracing::instrument(skip(self))]
    pub async fn revoke(
        &self,
        player_id: &PlayerId,
        item_id: &ItemId,
        correlation_id: Option<CorrelationId>,
    ) -> Result<Grant, InventoryError> {
        if let Some(correlation_id) = correlation_id
            && let Some(existing) = self.store.find_removal(correlation_id).await?
        {
            tracing::debug!(%correlation_id, grant_id = %existing.id, "Replayed revoke request");
            return Ok(existing);
        }

        let revoked = self
            .store
            .remove_one(player_id, item_id, correlation_id)
            .await?
            .ok_or_else(|| InventoryError::ItemNotOwned {
                player_id: player_id.clone(),
                item_id: item_id.clone(),
            })?;

        tracing::debug!(grant_id = %revoked.id, "Item revoked");
        Ok(revoked)
    }

    /// Deletes a grant by id. Unknown ids are a successful no-op.
    #[tracing::instrument(skip(self))]
    pub async fn rollback_grant(&self, grant_id: RecordId) -> Result<bool, InventoryError> {
        let removed = self.store.remove(grant_id).await?;
        if removed {
            tracing::info!(%grant_id, "Grant rolled back");
        } else {
            tracing::debug!(%grant_id, "Rollback of unknown grant ignored");
        }
        Ok(removed)
    }

    /// Re-inserts a revoked grant under its original id.
    ///
    /// Restoring a grant that is already present is a successful no-op. The
    /// cap is not checked: the unit was owned before the revoke.
    #[tracing::instrument(skip(self))]
    pub async fn restore_grant(
        &self,
        grant_id: RecordId,
        player_id: &PlayerId,
        item_id: &ItemId,
    ) -> Result<bool, InventoryError> {
        let grant = Grant {
            id: grant_id,
            player_id: player_id.clone(),
            item_id: item_id.clone(),
            correlation_id: None,
            created_at: Utc::now(),
        };
        let inserted = self.store.insert_if_absent(grant).await?;
        if inserted {
            tracing::info!(%grant_id, "Revoked grant restored");
        }
        Ok(inserted)
    }

    pub async fn items_for(&self, player_id: &PlayerId) -> Result<Vec<Grant>, InventoryError> {
        self.store.grants_for(player_id).await
    }

    pub async fn count(&self, player_id: &PlayerId, item_id: &ItemId) -> Result<usize, InventoryError> {
        self.store.count(player_id, item_id).await
    }
}
