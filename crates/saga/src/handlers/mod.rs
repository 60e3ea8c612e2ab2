//! Stage handlers: the local mutation each service applies for a message kind.

mod inventory;
mod player;

pub use inventory::InventoryStageHandler;
pub use player::PlayerStageHandler;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Result, SagaError};
use crate::messages::StageMessage;

/// Applies the message kinds routed on one service's topic.
///
/// Forward stages always produce a response, carrying a non-empty `error`
/// when the domain rejected the request. Rollbacks produce none. An `Err`
/// means the message could not be applied at all and should be dead-lettered.
#[async_trait]
pub trait StageHandler: Send + Sync {
    /// Service name the consumption cursor is stored under.
    fn service(&self) -> &'static str;

    /// Topic this handler consumes.
    fn topic(&self) -> &'static str;

    async fn handle(&self, message: StageMessage) -> Result<Option<StageMessage>>;
}

#[async_trait]
impl<T: StageHandler + ?Sized> StageHandler for Arc<T> {
    fn service(&self) -> &'static str {
        (**self).service()
    }

    fn topic(&self) -> &'static str {
        (**self).topic()
    }

    async fn handle(&self, message: StageMessage) -> Result<Option<StageMessage>> {
        (**self).handle(message).await
    }
}

fn unroutable(service: &'static str, message: &StageMessage) -> SagaError {
    let (topic, key) = message.route();
    SagaError::Unroutable {
        service,
        topic,
        key,
    }
}
