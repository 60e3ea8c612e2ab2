//! Saga error types.

use common::SagaId;
use domain::{CatalogError, DomainError};
use event_bus::BusError;
use thiserror::Error;

use crate::messages::MessageError;

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Buy or sell called with no items.
    #[error("Request contains no items")]
    EmptyRequest,

    /// Prices could not be resolved; no stage was executed.
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// A purchase did not complete. Committed stages were compensated.
    #[error("Purchase did not complete")]
    PurchaseFailed { saga_id: SagaId },

    /// A sale did not complete. Committed stages were compensated.
    #[error("Sale did not complete")]
    SaleFailed { saga_id: SagaId },

    /// A handler received a message kind its service does not own.
    #[error("Service '{service}' cannot handle {topic}/{key}")]
    Unroutable {
        service: &'static str,
        topic: &'static str,
        key: &'static str,
    },

    /// Message failed to decode or validate.
    #[error("Message error: {0}")]
    Message(#[from] MessageError),

    /// Event bus error.
    #[error("Event bus error: {0}")]
    Bus(#[from] BusError),

    /// Domain storage failed while applying a stage.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SagaError {
    /// True for the aggregate buy/sell failures returned after compensation.
    pub fn is_saga_failure(&self) -> bool {
        matches!(
            self,
            SagaError::PurchaseFailed { .. } | SagaError::SaleFailed { .. }
        )
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
