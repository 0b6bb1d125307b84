use super::{Collection, DocumentStore, StoreError};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

/// Process-local backend used by tests and `store_backend = "memory"`.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    documents: DashMap<(Collection, String), Value>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .documents
            .get(&(collection, id.to_string()))
            .map(|entry| entry.value().clone()))
    }

    async fn put(
        &self,
        collection: Collection,
        id: &str,
        document: Value,
    ) -> Result<(), StoreError> {
        self.documents.insert((collection, id.to_string()), document);
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool, StoreError> {
        Ok(self
            .documents
            .remove(&(collection, id.to_string()))
            .is_some())
    }

    async fn scan(&self, collection: Collection) -> Result<Vec<Value>, StoreError> {
        Ok(self
            .documents
            .iter()
            .filter(|entry| entry.key().0 == collection)
            .map(|entry| entry.value().clone())
            .collect())
    }
}
