//! Ledger storage trait and in-memory implementation.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use common::{CorrelationId, RecordId};
use tokio::sync::RwLock;

use super::{LedgerEntry, PlayerError};
use crate::value_objects::{Money, PlayerId};

/// Storage for player ledger entries.
///
/// Implementations must make `append_if_covered` atomic with respect to other
/// appends for the same player, so two concurrent debits can never both pass
/// the balance check against the same funds. Both appends fail with
/// [`PlayerError::BalanceOverflow`] rather than store an entry whose sum with
/// the balance is not representable.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Appends an entry unless the resulting balance would overflow.
    async fn append(&self, entry: LedgerEntry) -> Result<(), PlayerError>;

    /// Appends a debit only if the player's balance covers its magnitude.
    async fn append_if_covered(&self, entry: LedgerEntry) -> Result<(), PlayerError>;

    /// Removes an entry by id. Returns `false` if no such entry exists.
    ///
    /// The correlation id of a removed entry is kept as a tombstone.
    async fn remove(&self, id: RecordId) -> Result<bool, PlayerError>;

    /// Whether an entry carrying `correlation_id` was removed by a rollback.
    async fn is_rolled_back(&self, correlation_id: CorrelationId) -> Result<bool, PlayerError>;

    /// Sum of all entries recorded for a player.
    async fn balance(&self, player_id: &PlayerId) -> Result<Money, PlayerError>;

    /// All entries for a player in insertion order.
    async fn entries_for(&self, player_id: &PlayerId) -> Result<Vec<LedgerEntry>, PlayerError>;

    async fn find_by_correlation(
        &self,
        correlation_id: CorrelationId,
    ) -> Result<Option<LedgerEntry>, PlayerError>;
}

#[derive(Debug, Default)]
struct LedgerState {
    entries: Vec<LedgerEntry>,
    rolled_back: HashSet<CorrelationId>,
}

/// In-memory ledger for tests and single-process deployments.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of entries across all players.
    pub async fn entry_count(&self) -> usize {
        self.state.read().await.entries.len()
    }
}

fn sum_for(entries: &[LedgerEntry], player_id: &PlayerId) -> Result<Money, PlayerError> {
    entries
        .iter()
        .filter(|e| &e.player_id == player_id)
        .try_fold(Money::zero(), |acc, e| {
            acc.checked_add(e.amount).ok_or_else(|| overflow(player_id))
        })
}

fn overflow(player_id: &PlayerId) -> PlayerError {
    PlayerError::BalanceOverflow {
        player_id: player_id.clone(),
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn append(&self, entry: LedgerEntry) -> Result<(), PlayerError> {
        let mut state = self.state.write().await;
        let balance = sum_for(&state.entries, &entry.player_id)?;
        if balance.checked_add(entry.amount).is_none() {
            return Err(overflow(&entry.player_id));
        }
        state.entries.push(entry);
        Ok(())
    }

    async fn append_if_covered(&self, entry: LedgerEntry) -> Result<(), PlayerError> {
        let mut state = self.state.write().await;
        let balance = sum_for(&state.entries, &entry.player_id)?;
        let requested = entry
            .amount
            .checked_abs()
            .ok_or(PlayerError::InvalidAmount(entry.amount))?;

        if entry.is_debit() && balance < requested {
            return Err(PlayerError::InsufficientFunds {
                player_id: entry.player_id,
                balance,
                requested,
            });
        }
        if balance.checked_add(entry.amount).is_none() {
            return Err(overflow(&entry.player_id));
        }

        state.entries.push(entry);
        Ok(())
    }

    async fn remove(&self, id: RecordId) -> Result<bool, PlayerError> {
        let mut state = self.state.write().await;
        let Some(pos) = state.entries.iter().position(|e| e.id == id) else {
            return Ok(false);
        };
        let removed = state.entries.remove(pos);
        if let Some(correlation_id) = removed.correlation_id {
            state.rolled_back.insert(correlation_id);
        }
        Ok(true)
    }

    async fn is_rolled_back(&self, correlation_id: CorrelationId) -> Result<bool, PlayerError> {
        Ok(self.state.read().await.rolled_back.contains(&correlation_id))
    }

    async fn balance(&self, player_id: &PlayerId) -> Result<Money, PlayerError> {
        sum_for(&self.state.read().await.entries, player_id)
    }

    async fn entries_for(&self, player_id: &PlayerId) -> Result<Vec<LedgerEntry>, PlayerError> {
        Ok(self
            .state
            .read()
            .await
            .entries
            .iter()
            .filter(|e| &e.player_id == player_id)
            .cloned()
            .collect())
    }

    async fn find_by_correlation(
        &self,
        correlation_id: CorrelationId,
    ) -> Result<Option<LedgerEntry>, PlayerError> {
        Ok(self
            .state
            .read()
            .await
            .entries
            .iter()
            .find(|e| e.correlation_id == Some(correlation_id))
            .cloned())
    }
}
