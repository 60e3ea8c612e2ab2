//! Shared types for the shop services.

pub mod types;

pub use types::{CorrelationId, RecordId, SagaId};
