//! Stage message kinds and their JSON payloads.
//!
//! A message's topic and key together select its kind; the payload does not
//! repeat it. Every kind is one variant of [`StageMessage`], so routing is a
//! single exhaustive match on both the decode and the dispatch side.
//!
//! | kind                  | topic       | key            |
//! |-----------------------|-------------|----------------|
//! | `DebitMoney`          | `player`    | `buy`          |
//! | `CreditMoney`         | `player`    | `sell`         |
//! | `RollbackTransaction` | `player`    | `rtransaction` |
//! | `GrantItem`           | `inventory` | `buy`          |
//! | `RevokeItem`          | `inventory` | `sell`         |
//! | `RollbackGrantItem`   | `inventory` | `radd`         |
//! | `RollbackRevokeItem`  | `inventory` | `rremove`      |
//! | `BuyResponse`         | `payment`   | `buy`          |
//! | `SellResponse`        | `payment`   | `sell`         |

use common::{CorrelationId, RecordId, SagaId};
use domain::{ItemId, Money, PlayerId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

use crate::topics::{
    INVENTORY_TOPIC, KEY_BUY, KEY_ROLLBACK_GRANT, KEY_ROLLBACK_REVOKE, KEY_ROLLBACK_TRANSACTION,
    KEY_SELL, PAYMENT_TOPIC, PLAYER_TOPIC,
};

/// Errors raised while decoding or encoding a stage message.
#[derive(Debug, Error)]
pub enum MessageError {
    /// No message kind is routed on this topic and key.
    #[error("no message kind for {topic}/{key}")]
    UnknownRoute { topic: String, key: String },

    /// The payload is not valid JSON for the routed kind.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The payload parsed but violates a field constraint.
    #[error("invalid payload: {0}")]
    Invalid(#[from] validator::ValidationErrors),

    #[error("failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Debit or credit request for the player service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct TransactionRequest {
    pub saga_id: SagaId,
    pub correlation_id: CorrelationId,
    #[validate(length(min = 1, max = 64))]
    pub player_id: String,
    #[validate(length(min = 1, max = 64))]
    pub item_id: String,
    /// Signed amount; debits carry the negated unit price.
    pub amount: Money,
}

/// Removes a ledger entry created by an earlier debit or credit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct RollbackTransactionRequest {
    pub saga_id: SagaId,
    pub correlation_id: CorrelationId,
    pub transaction_id: RecordId,
}

/// Grant or revoke request for the inventory service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct InventoryRequest {
    pub saga_id: SagaId,
    pub correlation_id: CorrelationId,
    #[validate(length(min = 1, max = 64))]
    pub player_id: String,
    #[validate(length(min = 1, max = 64))]
    pub item_id: String,
}

/// Undoes an earlier grant (`radd`) or revoke (`rremove`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct RollbackInventoryRequest {
    pub saga_id: SagaId,
    pub correlation_id: CorrelationId,
    pub inventory_id: RecordId,
    #[validate(length(min = 1, max = 64))]
    pub player_id: String,
    #[validate(length(min = 1, max = 64))]
    pub item_id: String,
}

/// Answer to one forward stage request, published on the `payment` topic.
///
/// `error` is empty on success. The same shape is returned to HTTP callers
/// as a purchase or sale receipt line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct TransferResponse {
    pub saga_id: SagaId,
    pub correlation_id: CorrelationId,
    pub inventory_id: Option<RecordId>,
    pub transaction_id: Option<RecordId>,
    #[validate(length(min = 1, max = 64))]
    pub player_id: String,
    #[validate(length(min = 1, max = 64))]
    pub item_id: String,
    pub amount: Money,
    #[serde(default)]
    pub error: String,
}

impl TransferResponse {
    /// A response with no record ids and an empty error.
    pub fn for_request(
        saga_id: SagaId,
        correlation_id: CorrelationId,
        player_id: impl Into<String>,
        item_id: impl Into<String>,
        amount: Money,
    ) -> Self {
        Self {
            saga_id,
            correlation_id,
            inventory_id: None,
            transaction_id: None,
            player_id: player_id.into(),
            item_id: item_id.into(),
            amount,
            error: String::new(),
        }
    }

    pub fn with_transaction(mut self, transaction_id: RecordId) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }

    pub fn with_inventory(mut self, inventory_id: RecordId) -> Self {
        self.inventory_id = Some(inventory_id);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = error.into();
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_empty()
    }
}

impl TransactionRequest {
    pub fn player(&self) -> PlayerId {
        PlayerId::new(self.player_id.as_str())
    }

    /// Empty response echoing this request's identifiers.
    pub fn response(&self) -> TransferResponse {
        TransferResponse::for_request(
            self.saga_id,
            self.correlation_id,
            self.player_id.as_str(),
            self.item_id.as_str(),
            self.amount,
        )
    }
}

impl InventoryRequest {
    pub fn player(&self) -> PlayerId {
        PlayerId::new(self.player_id.as_str())
    }

    pub fn item(&self) -> ItemId {
        ItemId::new(self.item_id.as_str())
    }

    /// Empty response echoing this request's identifiers.
    pub fn response(&self) -> TransferResponse {
        TransferResponse::for_request(
            self.saga_id,
            self.correlation_id,
            self.player_id.as_str(),
            self.item_id.as_str(),
            Money::zero(),
        )
    }
}

impl RollbackInventoryRequest {
    pub fn player(&self) -> PlayerId {
        PlayerId::new(self.player_id.as_str())
    }

    pub fn item(&self) -> ItemId {
        ItemId::new(self.item_id.as_str())
    }
}

/// Every message kind carried on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageMessage {
    DebitMoney(TransactionRequest),
    CreditMoney(TransactionRequest),
    RollbackTransaction(RollbackTransactionRequest),
    GrantItem(InventoryRequest),
    RevokeItem(InventoryRequest),
    RollbackGrantItem(RollbackInventoryRequest),
    RollbackRevokeItem(RollbackInventoryRequest),
    BuyResponse(TransferResponse),
    SellResponse(TransferResponse),
}

fn parse<T: DeserializeOwned + Validate>(payload: &[u8]) -> Result<T, MessageError> {
    let value: T = serde_json::from_slice(payload)?;
    value.validate()?;
    Ok(value)
}

impl StageMessage {
    /// Decodes a payload using the kind selected by `topic` and `key`.
    pub fn decode(topic: &str, key: &str, payload: &[u8]) -> Result<Self, MessageError> {
        let message = match (topic, key) {
            (PLAYER_TOPIC, KEY_BUY) => StageMessage::DebitMoney(parse(payload)?),
            (PLAYER_TOPIC, KEY_SELL) => StageMessage::CreditMoney(parse(payload)?),
            (PLAYER_TOPIC, KEY_ROLLBACK_TRANSACTION) => {
                StageMessage::RollbackTransaction(parse(payload)?)
            }
            (INVENTORY_TOPIC, KEY_BUY) => StageMessage::GrantItem(parse(payload)?),
            (INVENTORY_TOPIC, KEY_SELL) => StageMessage::RevokeItem(parse(payload)?),
            (INVENTORY_TOPIC, KEY_ROLLBACK_GRANT) => {
                StageMessage::RollbackGrantItem(parse(payload)?)
            }
            (INVENTORY_TOPIC, KEY_ROLLBACK_REVOKE) => {
                StageMessage::RollbackRevokeItem(parse(payload)?)
            }
            (PAYMENT_TOPIC, KEY_BUY) => StageMessage::BuyResponse(parse(payload)?),
            (PAYMENT_TOPIC, KEY_SELL) => StageMessage::SellResponse(parse(payload)?),
            _ => {
                return Err(MessageError::UnknownRoute {
                    topic: topic.to_string(),
                    key: key.to_string(),
                });
            }
        };
        Ok(message)
    }

    /// The topic and key this kind is published under.
    pub fn route(&self) -> (&'static str, &'static str) {
        match self {
            StageMessage::DebitMoney(_) => (PLAYER_TOPIC, KEY_BUY),
            StageMessage::CreditMoney(_) => (PLAYER_TOPIC, KEY_SELL),
            StageMessage::RollbackTransaction(_) => (PLAYER_TOPIC, KEY_ROLLBACK_TRANSACTION),
            StageMessage::GrantItem(_) => (INVENTORY_TOPIC, KEY_BUY),
            StageMessage::RevokeItem(_) => (INVENTORY_TOPIC, KEY_SELL),
            StageMessage::RollbackGrantItem(_) => (INVENTORY_TOPIC, KEY_ROLLBACK_GRANT),
            StageMessage::RollbackRevokeItem(_) => (INVENTORY_TOPIC, KEY_ROLLBACK_REVOKE),
            StageMessage::BuyResponse(_) => (PAYMENT_TOPIC, KEY_BUY),
            StageMessage::SellResponse(_) => (PAYMENT_TOPIC, KEY_SELL),
        }
    }

    /// Serializes the payload. The kind itself travels as topic and key.
    pub fn encode(&self) -> Result<Vec<u8>, MessageError> {
        let bytes = match self {
            StageMessage::DebitMoney(m) | StageMessage::CreditMoney(m) => serde_json::to_vec(m),
            StageMessage::RollbackTransaction(m) => serde_json::to_vec(m),
            StageMessage::GrantItem(m) | StageMessage::RevokeItem(m) => serde_json::to_vec(m),
            StageMessage::RollbackGrantItem(m) | StageMessage::RollbackRevokeItem(m) => {
                serde_json::to_vec(m)
            }
            StageMessage::BuyResponse(m) | StageMessage::SellResponse(m) => serde_json::to_vec(m),
        };
        bytes.map_err(MessageError::Encode)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StageMessage::DebitMoney(_) => "DebitMoney",
            StageMessage::CreditMoney(_) => "CreditMoney",
            StageMessage::RollbackTransaction(_) => "RollbackTransaction",
            StageMessage::GrantItem(_) => "GrantItem",
            StageMessage::RevokeItem(_) => "RevokeItem",
            StageMessage::RollbackGrantItem(_) => "RollbackGrantItem",
            StageMessage::RollbackRevokeItem(_) => "RollbackRevokeItem",
            StageMessage::BuyResponse(_) => "BuyResponse",
            StageMessage::SellResponse(_) => "SellResponse",
        }
    }

    pub fn saga_id(&self) -> SagaId {
        match self {
            StageMessage::DebitMoney(m) | StageMessage::CreditMoney(m) => m.saga_id,
            StageMessage::RollbackTransaction(m) => m.saga_id,
            StageMessage::GrantItem(m) | StageMessage::RevokeItem(m) => m.saga_id,
            StageMessage::RollbackGrantItem(m) | StageMessage::RollbackRevokeItem(m) => m.saga_id,
            StageMessage::BuyResponse(m) | StageMessage::SellResponse(m) => m.saga_id,
        }
    }

    pub fn correlation_id(&self) -> CorrelationId {
        match self {
            StageMessage::DebitMoney(m) | StageMessage::CreditMoney(m) => m.correlation_id,
            StageMessage::RollbackTransaction(m) => m.correlation_id,
            StageMessage::GrantItem(m) | StageMessage::RevokeItem(m) => m.correlation_id,
            StageMessage::RollbackGrantItem(m) | StageMessage::RollbackRevokeItem(m) => {
                m.correlation_id
            }
            StageMessage::BuyResponse(m) | StageMessage::SellResponse(m) => m.correlation_id,
        }
    }

    /// True for the compensating kinds.
    pub fn is_rollback(&self) -> bool {
        matches!(
            self,
            StageMessage::RollbackTransaction(_)
                | StageMessage::RollbackGrantItem(_)
                | StageMessage::RollbackRevokeItem(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn debit() -> TransactionRequest {
        TransactionRequest {
            saga_id: SagaId::new(),
            correlation_id: CorrelationId::new(),
            player_id: "player-1".into(),
            item_id: "sword".into(),
            amount: Money::from_cents(-400),
        }
    }

    #[test]
    fn decode_selects_kind_by_topic_and_key() {
        let request = debit();
        let payload = serde_json::to_vec(&request).unwrap();

        let as_debit = StageMessage::decode("player", "buy", &payload).unwrap();
        assert_eq!(as_debit, StageMessage::DebitMoney(request.clone()));

        let as_credit = StageMessage::decode("player", "sell", &payload).unwrap();
        assert_eq!(as_credit, StageMessage::CreditMoney(request));
    }

    #[test]
    fn encoded_payload_decodes_on_its_own_route() {
        let message = StageMessage::RollbackGrantItem(RollbackInventoryRequest {
            saga_id: SagaId::new(),
            correlation_id: CorrelationId::new(),
            inventory_id: RecordId::new(),
            player_id: "player-1".into(),
            item_id: "sword".into(),
        });
        let (topic, key) = message.route();
        assert_eq!((topic, key), ("inventory", "radd"));

        let decoded = StageMessage::decode(topic, key, &message.encode().unwrap()).unwrap();
        assert_eq!(decoded, message);
        assert!(decoded.is_rollback());
    }

    #[test]
    fn unknown_route_is_rejected() {
        let err = StageMessage::decode("player", "refund", b"{}").unwrap_err();
        assert!(matches!(err, MessageError::UnknownRoute { .. }));
    }

    #[test]
    fn malformed_payload_is_rejected() {
        let err = StageMessage::decode("inventory", "buy", b"not json").unwrap_err();
        assert!(matches!(err, MessageError::Malformed(_)));
    }

    #[test]
    fn missing_rollback_identifier_is_rejected() {
        let payload = serde_json::json!({
            "saga_id": SagaId::new(),
            "correlation_id": CorrelationId::new(),
        });
        let err = StageMessage::decode("player", "rtransaction", payload.to_string().as_bytes())
            .unwrap_err();
        assert!(matches!(err, MessageError::Malformed(_)));
    }

    #[test]
    fn empty_player_id_fails_validation() {
        let mut request = debit();
        request.player_id.clear();
        let payload = serde_json::to_vec(&request).unwrap();

        let err = StageMessage::decode("player", "buy", &payload).unwrap_err();
        assert!(matches!(err, MessageError::Invalid(_)));
    }

    #[test]
    fn overlong_item_id_fails_validation() {
        let request = InventoryRequest {
            saga_id: SagaId::new(),
            correlation_id: CorrelationId::new(),
            player_id: "player-1".into(),
            item_id: "x".repeat(65),
        };
        let payload = serde_json::to_vec(&request).unwrap();

        let err = StageMessage::decode("inventory", "buy", &payload).unwrap_err();
        assert!(matches!(err, MessageError::Invalid(_)));
    }

    #[test]
    fn response_error_defaults_to_empty() {
        let payload = serde_json::json!({
            "saga_id": SagaId::new(),
            "correlation_id": CorrelationId::new(),
            "inventory_id": null,
            "transaction_id": RecordId::new(),
            "player_id": "player-1",
            "item_id": "sword",
            "amount": -400,
        });
        let message =
            StageMessage::decode("payment", "buy", payload.to_string().as_bytes()).unwrap();
        match message {
            StageMessage::BuyResponse(response) => {
                assert!(response.is_success());
                assert_eq!(response.amount, Money::from_cents(-400));
            }
            other => panic!("unexpected kind: {}", other.kind()),
        }
    }

    #[test]
    fn request_response_echoes_identifiers() {
        let request = debit();
        let response = request
            .response()
            .with_transaction(RecordId::new())
            .with_error("insufficient funds");

        assert_eq!(response.correlation_id, request.correlation_id);
        assert_eq!(response.saga_id, request.saga_id);
        assert_eq!(response.amount, request.amount);
        assert!(!response.is_success());
    }
}
