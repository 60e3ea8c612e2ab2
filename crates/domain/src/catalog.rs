//! Catalog lookup used to price buy and sell requests.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::value_objects::{ItemId, Money};

/// Errors returned by catalog lookups.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// One or more requested items are not in the catalog.
    #[error("unknown items: {}", join(.0))]
    UnknownItems(Vec<ItemId>),

    /// The catalog backend could not be reached.
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

fn join(items: &[ItemId]) -> String {
    items
        .iter()
        .map(ItemId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A purchasable item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub item_id: ItemId,
    pub title: String,
    pub price: Money,
    pub image_url: Option<String>,
}

impl CatalogItem {
    pub fn new(item_id: impl Into<ItemId>, title: impl Into<String>, price: Money) -> Self {
        Self {
            item_id: item_id.into(),
            title: title.into(),
            price,
            image_url: None,
        }
    }

    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }
}

/// Source of item prices.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Resolves every requested item to its catalog entry.
    ///
    /// Either every item resolves or the whole lookup fails with the full list
    /// of unknown ids.
    async fn resolve_prices(
        &self,
        item_ids: &BTreeSet<ItemId>,
    ) -> Result<BTreeMap<ItemId, CatalogItem>, CatalogError>;

    async fn get(&self, item_id: &ItemId) -> Result<Option<CatalogItem>, CatalogError>;
}

/// In-memory catalog.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    items: Arc<RwLock<HashMap<ItemId, CatalogItem>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog holding `items`.
    pub fn with_items(items: impl IntoIterator<Item = CatalogItem>) -> Self {
        let items = items
            .into_iter()
            .map(|item| (item.item_id.clone(), item))
            .collect();
        Self {
            items: Arc::new(RwLock::new(items)),
            unavailable: Arc::default(),
        }
    }

    /// Adds or replaces an item.
    pub async fn upsert(&self, item: CatalogItem) {
        self.items.write().await.insert(item.item_id.clone(), item);
    }

    /// Makes every lookup fail with [`CatalogError::Unavailable`] while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), CatalogError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CatalogError::Unavailable("catalog is offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn resolve_prices(
        &self,
        item_ids: &BTreeSet<ItemId>,
    ) -> Result<BTreeMap<ItemId, CatalogItem>, CatalogError> {
        self.check_available()?;
        let items = self.items.read().await;

        let mut prices = BTreeMap::new();
        let mut unknown = Vec::new();
        for item_id in item_ids {
            match items.get(item_id) {
                Some(item) => {
                    prices.insert(item_id.clone(), item.clone());
                }
                None => unknown.push(item_id.clone()),
            }
        }

        if !unknown.is_empty() {
            return Err(CatalogError::UnknownItems(unknown));
        }
        Ok(prices)
    }

    async fn get(&self, item_id: &ItemId) -> Result<Option<CatalogItem>, CatalogError> {
        self.check_available()?;
        Ok(self.items.read().await.get(item_id).cloned())
    }
}
