use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{Offset, Result};

/// Durable record of the next offset a service should consume on a topic.
///
/// One value per (service, topic) pair, overwritten in place. The store does
/// not enforce monotonicity; [`OffsetCursor`] does.
#[async_trait]
pub trait OffsetStore: Send + Sync {
    /// Returns the stored offset, or `None` if the service has never
    /// committed anything on this topic.
    async fn get_offset(&self, service: &str, topic: &str) -> Result<Option<Offset>>;

    /// Upserts the stored offset.
    async fn set_offset(&self, service: &str, topic: &str, offset: Offset) -> Result<()>;
}

#[async_trait]
impl<T: OffsetStore + ?Sized> OffsetStore for Arc<T> {
    async fn get_offset(&self, service: &str, topic: &str) -> Result<Option<Offset>> {
        (**self).get_offset(service, topic).await
    }

    async fn set_offset(&self, service: &str, topic: &str, offset: Offset) -> Result<()> {
        (**self).set_offset(service, topic, offset).await
    }
}

/// In-memory offset store for tests and the standalone deployment.
#[derive(Clone, Default)]
pub struct InMemoryOffsetStore {
    offsets: Arc<RwLock<HashMap<(String, String), Offset>>>,
}

impl InMemoryOffsetStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OffsetStore for InMemoryOffsetStore {
    async fn get_offset(&self, service: &str, topic: &str) -> Result<Option<Offset>> {
        let offsets = self.offsets.read().await;
        Ok(offsets
            .get(&(service.to_string(), topic.to_string()))
            .copied())
    }

    async fn set_offset(&self, service: &str, topic: &str, offset: Offset) -> Result<()> {
        let mut offsets = self.offsets.write().await;
        offsets.insert((service.to_string(), topic.to_string()), offset);
        Ok(())
    }
}

/// The consumption cursor of one (service, topic) loop.
///
/// A cursor is created when a consumption loop starts and is owned by that
/// loop alone. It only moves forward: committing an offset that does not
/// advance it is ignored.
pub struct OffsetCursor<S: OffsetStore> {
    store: S,
    service: String,
    topic: String,
    position: Option<Offset>,
}

impl<S: OffsetStore> OffsetCursor<S> {
    /// Loads the cursor for `service` on `topic` from the store.
    pub async fn load(
        store: S,
        service: impl Into<String>,
        topic: impl Into<String>,
    ) -> Result<Self> {
        let service = service.into();
        let topic = topic.into();
        let position = store.get_offset(&service, &topic).await?;
        tracing::debug!(%service, %topic, position = ?position, "cursor loaded");
        Ok(Self {
            store,
            service,
            topic,
            position,
        })
    }

    /// Returns the service owning the cursor.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Returns the topic the cursor tracks.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns the stored position, `None` before the first commit.
    pub fn position(&self) -> Option<Offset> {
        self.position
    }

    /// Returns where consumption should start: the stored position, or 0.
    pub fn start_offset(&self) -> Offset {
        self.position.unwrap_or_else(Offset::first)
    }

    /// Records that the message at `processed` has been fully handled.
    ///
    /// Persists `processed + 1`. Returns `false` without writing if that
    /// would move the cursor backwards or leave it where it is.
    pub async fn commit(&mut self, processed: Offset) -> Result<bool> {
        let next = processed.next();
        if let Some(current) = self.position
            && next <= current
        {
            tracing::warn!(
                service = %self.service,
                topic = %self.topic,
                %current,
                %next,
                "ignoring non-advancing cursor commit"
            );
            return Ok(false);
        }

        self.store.set_offset(&self.service, &self.topic, next).await?;
        self.position = Some(next);
        Ok(true)
    }

    /// Forces the cursor to `offset`, used after a rewind to offset 0.
    pub async fn reset(&mut self, offset: Offset) -> Result<()> {
        self.store.set_offset(&self.service, &self.topic, offset).await?;
        self.position = Some(offset);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_cursor_is_distinct_from_zero() {
        let store = InMemoryOffsetStore::new();
        assert_eq!(store.get_offset("player", "player").await.unwrap(), None);

        store
            .set_offset("player", "player", Offset::first())
            .await
            .unwrap();
        assert_eq!(
            store.get_offset("player", "player").await.unwrap(),
            Some(Offset::first())
        );
    }

    #[tokio::test]
    async fn set_offset_is_an_upsert() {
        let store = InMemoryOffsetStore::new();
        store.set_offset("payment", "payment", Offset::new(5)).await.unwrap();
        store.set_offset("payment", "payment", Offset::new(3)).await.unwrap();

        assert_eq!(
            store.get_offset("payment", "payment").await.unwrap(),
            Some(Offset::new(3))
        );
    }

    #[tokio::test]
    async fn offsets_are_scoped_per_service_and_topic() {
        let store = InMemoryOffsetStore::new();
        store.set_offset("player", "player", Offset::new(7)).await.unwrap();

        assert_eq!(store.get_offset("inventory", "player").await.unwrap(), None);
        assert_eq!(store.get_offset("player", "inventory").await.unwrap(), None);
    }

    #[tokio::test]
    async fn cursor_starts_at_zero_without_history() {
        let cursor = OffsetCursor::load(InMemoryOffsetStore::new(), "player", "player")
            .await
            .unwrap();
        assert_eq!(cursor.position(), None);
        assert_eq!(cursor.start_offset(), Offset::first());
    }

    #[tokio::test]
    async fn cursor_commits_processed_plus_one() {
        let store = InMemoryOffsetStore::new();
        let mut cursor = OffsetCursor::load(store.clone(), "player", "player")
            .await
            .unwrap();

        for offset in [0, 1, 4] {
            assert!(cursor.commit(Offset::new(offset)).await.unwrap());
        }

        assert_eq!(cursor.position(), Some(Offset::new(5)));
        assert_eq!(
            store.get_offset("player", "player").await.unwrap(),
            Some(Offset::new(5))
        );

        let reloaded = OffsetCursor::load(store, "player", "player").await.unwrap();
        assert_eq!(reloaded.start_offset(), Offset::new(5));
    }

    #[tokio::test]
    async fn cursor_refuses_to_move_backwards() {
        let store = InMemoryOffsetStore::new();
        let mut cursor = OffsetCursor::load(store.clone(), "inventory", "inventory")
            .await
            .unwrap();

        cursor.commit(Offset::new(9)).await.unwrap();
        assert!(!cursor.commit(Offset::new(3)).await.unwrap());
        assert!(!cursor.commit(Offset::new(9)).await.unwrap());

        assert_eq!(
            store.get_offset("inventory", "inventory").await.unwrap(),
            Some(Offset::new(10))
        );
    }

    #[tokio::test]
    async fn reset_overrides_position() {
        let store = InMemoryOffsetStore::new();
        let mut cursor = OffsetCursor::load(store.clone(), "payment", "payment")
            .await
            .unwrap();
        cursor.commit(Offset::new(20)).await.unwrap();

        cursor.reset(Offset::first()).await.unwrap();
        assert_eq!(cursor.start_offset(), Offset::first());
        assert_eq!(
            store.get_offset("payment", "payment").await.unwrap(),
            Some(Offset::first())
        );
    }
}
