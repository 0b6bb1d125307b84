//! Document storage.
//!
//! Records are JSON documents grouped in named collections and addressed by a
//! string key, mirroring the key/value document database the storefront was
//! designed around. There are no transactions or conditional writes: every
//! read-modify-write performed by the services is last-writer-wins.

mod memory;
mod sql;

pub use memory::InMemoryStore;
pub use sql::{document, SqlStore};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use strum::{AsRefStr, Display};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("document encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Named collections ("tables") of the document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Collection {
    Orders,
    Products,
    PromoCodes,
    WheelPrizes,
    Users,
    VerificationCodes,
    Subscriptions,
}

/// Raw document operations implemented by each backend.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StoreError>;

    /// Inserts or fully replaces a document.
    async fn put(&self, collection: Collection, id: &str, document: Value)
        -> Result<(), StoreError>;

    /// Returns whether a document was removed.
    async fn delete(&self, collection: Collection, id: &str) -> Result<bool, StoreError>;

    /// Full collection scan, unordered.
    async fn scan(&self, collection: Collection) -> Result<Vec<Value>, StoreError>;
}

/// Typed, cloneable handle over a [`DocumentStore`] backend.
#[derive(Clone)]
pub struct Store {
    inner: Arc<dyn DocumentStore>,
}

impl Store {
    pub fn new(inner: Arc<dyn DocumentStore>) -> Self {
        Self { inner }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<T>, StoreError> {
        match self.inner.get(collection, id).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn put<T: Serialize>(
        &self,
        collection: Collection,
        id: &str,
        document: &T,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_value(document)?;
        self.inner.put(collection, id, value).await
    }

    pub async fn delete(&self, collection: Collection, id: &str) -> Result<bool, StoreError> {
        self.inner.delete(collection, id).await
    }

    /// Scans a collection, skipping documents that no longer match `T`.
    pub async fn scan<T: DeserializeOwned>(
        &self,
        collection: Collection,
    ) -> Result<Vec<T>, StoreError> {
        let documents = self.inner.scan(collection).await?;
        let mut records = Vec::with_capacity(documents.len());
        for document in documents {
            match serde_json::from_value(document) {
                Ok(record) => records.push(record),
                Err(err) => warn!(collection = %collection, error = %err, "skipping malformed document"),
            }
        }
        Ok(records)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}
