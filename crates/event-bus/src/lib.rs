//! Bus primitives the purchase saga is built on.
//!
//! - [`EventBus`]: publish keyed messages to a topic and open ordered
//!   consumers on a topic's single partition at an explicit offset.
//! - [`OffsetStore`] and [`OffsetCursor`]: the per-service, per-topic record
//!   of the next offset to process.

pub mod bus;
pub mod error;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;
pub mod message;
pub mod offset;
pub mod postgres;

pub use bus::{EventBus, MessageStream, open_consumer_or_rewind};
pub use error::{BusError, Result};
#[cfg(feature = "kafka")]
pub use kafka::{KafkaBus, KafkaBusConfig};
pub use memory::InMemoryBus;
pub use message::{BusMessage, Offset};
pub use offset::{InMemoryOffsetStore, OffsetCursor, OffsetStore};
pub use postgres::PostgresOffsetStore;
