//! Player accounts backed by an append-only ledger.
//!
//! A player's balance is never stored. It is the sum of every ledger entry
//! recorded for that player, so a rollback is simply the removal of an entry.

mod ledger;
mod service;

pub use ledger::{InMemoryLedger, Ledger};
pub use service::PlayerService;

use chrono::{DateTime, Utc};
use common::{CorrelationId, RecordId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value_objects::{Money, PlayerId};

/// Errors that can occur during player ledger operations.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// The player's balance does not cover the requested debit.
    #[error("insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds {
        player_id: PlayerId,
        balance: Money,
        requested: Money,
    },

    /// Zero-value transactions are rejected.
    #[error("invalid amount: {0}")]
    InvalidAmount(Money),

    /// Applying the entry would push the balance past the representable range.
    #[error("balance overflow for player {player_id}")]
    BalanceOverflow { player_id: PlayerId },

    /// The request was applied once and has since been rolled back.
    #[error("request {0} was rolled back")]
    RolledBack(CorrelationId),

    /// The player id is empty or longer than 64 characters.
    #[error("invalid player id: {0:?}")]
    InvalidPlayerId(String),

    /// The ledger backend failed.
    #[error("ledger storage error: {0}")]
    Storage(String),
}

impl PlayerError {
    pub fn is_insufficient_funds(&self) -> bool {
        matches!(self, PlayerError::InsufficientFunds { .. })
    }
}

/// One signed balance change. Credits are positive, debits negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: RecordId,
    pub player_id: PlayerId,
    pub amount: Money,
    /// The stage request that produced this entry, if any.
    pub correlation_id: Option<CorrelationId>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Creates a new entry with a fresh id and the current timestamp.
    pub fn new(player_id: PlayerId, amount: Money, correlation_id: Option<CorrelationId>) -> Self {
        Self {
            id: RecordId::new(),
            player_id,
            amount,
            correlation_id,
            created_at: Utc::now(),
        }
    }

    pub fn is_debit(&self) -> bool {
        self.amount.is_negative()
    }
}
