//! Player service: balance changes on behalf of the saga stages.

use common::{CorrelationId, RecordId};

use super::{Ledger, LedgerEntry, PlayerError};
use crate::value_objects::{Money, PlayerId};

const MAX_PLAYER_ID_LEN: usize = 64;

/// Applies debits, credits and ledger rollbacks.
///
/// Debit and credit requests carrying a correlation id are idempotent: a
/// replay of an already-applied request returns the original entry instead of
/// writing a second one, and a replay of a rolled-back request fails with
/// [`PlayerError::RolledBack`].
pub struct PlayerService<L: Ledger> {
    ledger: L,
}

impl<L: Ledger> PlayerService<L> {
    pub fn new(ledger: L) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Debits `amount` from the player's balance.
    ///
    /// The sign of `amount` is ignored; the entry is always recorded as
    /// negative. Fails with [`PlayerError::InsufficientFunds`] when the
    /// balance does not cover the magnitude.
    #[tracing::instrument(skip(self))]
    pub async fn debit(
        &self,
        player_id: &PlayerId,
        amount: Money,
        correlation_id: Option<CorrelationId>,
    ) -> Result<LedgerEntry, PlayerError> {
        let magnitude = validate(player_id, amount)?;
        if let Some(existing) = self.replayed(correlation_id).await? {
            return Ok(existing);
        }

        let entry = LedgerEntry::new(player_id.clone(), -magnitude, correlation_id);
        self.ledger.append_if_covered(entry.clone()).await?;

        tracing::debug!(entry_id = %entry.id, amount = %entry.amount, "Debit recorded");
        Ok(entry)
    }

    /// Credits `amount` to the player's balance. The sign of `amount` is ignored.
    #[tracing::instrument(skip(self))]
    pub async fn credit(
        &self,
        player_id: &PlayerId,
        amount: Money,
        correlation_id: Option<CorrelationId>,
    ) -> Result<LedgerEntry, PlayerError> {
        let magnitude = validate(player_id, amount)?;
        if let Some(existing) = self.replayed(correlation_id).await? {
            return Ok(existing);
        }

        let entry = LedgerEntry::new(player_id.clone(), magnitude, correlation_id);
        self.ledger.append(entry.clone()).await?;

        tracing::debug!(entry_id = %entry.id, amount = %entry.amount, "Credit recorded");
        Ok(entry)
    }

    /// Deletes a ledger entry by id.
    ///
    /// Rolling back an unknown or already-removed entry is a successful no-op;
    /// the return value reports whether anything was removed.
    #[tracing::instrument(skip(self))]
    pub async fn rollback_transaction(&self, transaction_id: RecordId) -> Result<bool, PlayerError> {
        let removed = self.ledger.remove(transaction_id).await?;
        if removed {
            tracing::info!(%transaction_id, "Ledger entry rolled back");
        } else {
            tracing::debug!(%transaction_id, "Rollback of unknown ledger entry ignored");
        }
        Ok(removed)
    }

    #[tracing::instrument(skip(self))]
    pub async fn balance(&self, player_id: &PlayerId) -> Result<Money, PlayerError> {
        self.ledger.balance(player_id).await
    }

    pub async fn entries(&self, player_id: &PlayerId) -> Result<Vec<LedgerEntry>, PlayerError> {
        self.ledger.entries_for(player_id).await
    }

    async fn replayed(
        &self,
        correlation_id: Option<CorrelationId>,
    ) -> Result<Option<LedgerEntry>, PlayerError> {
        let Some(correlation_id) = correlation_id else {
            return Ok(None);
        };
        if self.ledger.is_rolled_back(correlation_id).await? {
            tracing::warn!(%correlation_id, "Replay of a rolled-back request refused");
            return Err(PlayerError::RolledBack(correlation_id));
        }
        let existing = self.ledger.find_by_correlation(correlation_id).await?;
        if let Some(entry) = &existing {
            tracing::debug!(%correlation_id, entry_id = %entry.id, "Replayed request, returning existing entry");
        }
        Ok(existing)
    }
}

/// Checks the request and returns the magnitude of `amount`.
fn validate(player_id: &PlayerId, amount: Money) -> Result<Money, PlayerError> {
    let id = player_id.as_str();
    if id.is_empty() || id.len() > MAX_PLAYER_ID_LEN {
        return Err(PlayerError::InvalidPlayerId(id.to_string()));
    }
    match amount.checked_abs() {
        Some(magnitude) if !magnitude.is_zero() => Ok(magnitude),
        _ => Err(PlayerError::InvalidAmount(amount)),
    }
}
