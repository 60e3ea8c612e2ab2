//! Buy and sell sagas for the shop services.
//!
//! A purchase debits the player's ledger and then grants inventory; a sale
//! revokes inventory and then credits the ledger. Each step is a stage message
//! on the event bus, applied by the owning service's [`StageConsumer`] and
//! answered on the `payment` topic, where the [`ResponseRouter`] hands each
//! response to the waiting [`PaymentOrchestrator`] by correlation id.
//!
//! If any line item of a stage fails, every committed step of that saga is
//! undone with a compensating message.

pub mod consumer;
pub mod dead_letter;
pub mod error;
pub mod handlers;
pub mod messages;
pub mod orchestrator;
pub mod retry;
pub mod router;
pub mod state;
pub mod topics;

pub use consumer::StageConsumer;
pub use dead_letter::{BusDeadLetterSink, DeadLetter, DeadLetterSink, InMemoryDeadLetterSink};
pub use error::{Result, SagaError};
pub use handlers::{InventoryStageHandler, PlayerStageHandler, StageHandler};
pub use messages::{
    InventoryRequest, MessageError, RollbackInventoryRequest, RollbackTransactionRequest,
    StageMessage, TransactionRequest, TransferResponse,
};
pub use orchestrator::{OrchestratorConfig, PaymentOrchestrator};
pub use retry::{PublishError, RetryPolicy};
pub use router::{ResponseRouter, Stage};
pub use state::{SagaLifecycle, SagaState};
