//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{CatalogError, DomainError, InventoryError, PlayerError};
use saga::SagaError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// The caller's identity header is missing or unusable.
    Unauthorized(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Domain logic error.
    Domain(DomainError),
    /// Saga execution error.
    Saga(SagaError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Domain(err) => domain_error_to_response(err),
            ApiError::Saga(err) => saga_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, String) {
    match &err {
        DomainError::Player(player_err) => match player_err {
            PlayerError::InsufficientFunds { .. }
            | PlayerError::InvalidAmount(_)
            | PlayerError::InvalidPlayerId(_)
            | PlayerError::BalanceOverflow { .. } => {
                (StatusCode::BAD_REQUEST, player_err.to_string())
            }
            PlayerError::RolledBack(_) => (StatusCode::CONFLICT, player_err.to_string()),
            PlayerError::Storage(_) => internal(&err),
        },
        DomainError::Inventory(inventory_err) => match inventory_err {
            InventoryError::ItemNotOwned { .. } => (StatusCode::NOT_FOUND, inventory_err.to_string()),
            InventoryError::CapacityExceeded { .. } | InventoryError::RolledBack(_) => {
                (StatusCode::CONFLICT, inventory_err.to_string())
            }
            InventoryError::Storage(_) => internal(&err),
        },
        DomainError::Catalog(catalog_err) => catalog_error_to_response(catalog_err),
        DomainError::Serialization(_) => internal(&err),
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String) {
    match &err {
        SagaError::EmptyRequest => (StatusCode::BAD_REQUEST, err.to_string()),
        SagaError::Catalog(catalog_err) => catalog_error_to_response(catalog_err),
        SagaError::PurchaseFailed { saga_id } => {
            tracing::info!(%saga_id, "purchase rejected");
            (StatusCode::BAD_REQUEST, "error: buy item failed".to_string())
        }
        SagaError::SaleFailed { saga_id } => {
            tracing::info!(%saga_id, "sale rejected");
            (StatusCode::BAD_REQUEST, "error: sell item failed".to_string())
        }
        _ => internal(&err),
    }
}

fn catalog_error_to_response(err: &CatalogError) -> (StatusCode, String) {
    match err {
        CatalogError::UnknownItems(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        CatalogError::Unavailable(_) => {
            tracing::warn!(error = %err, "catalog lookup failed");
            (StatusCode::BAD_REQUEST, "error: item lookup failed".to_string())
        }
    }
}

fn internal(err: &dyn std::error::Error) -> (StatusCode, String) {
    tracing::error!(error = %err, "internal server error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal server error".to_string(),
    )
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<PlayerError> for ApiError {
    fn from(err: PlayerError) -> Self {
        ApiError::Domain(err.into())
    }
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        ApiError::Domain(err.into())
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}
