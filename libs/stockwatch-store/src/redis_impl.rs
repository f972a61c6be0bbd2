//! Redis implementation of the document store
//!
//! Layout:
//! - `{prefix}:{collection}`: hash, field = document id, value = JSON
//! - `{prefix}:changes:{collection}`: pub/sub channel carrying [`ChangeEvent`]s
//!
//! Queries fetch the whole hash and filter client-side. Batches run as one
//! MULTI/EXEC pipeline together with their change notifications.

use anyhow::Context;
use async_trait::async_trait;
use common::redis::RedisClient;
use futures::stream::{BoxStream, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::filter::{matches_all, Filter};
use crate::merge_shallow;
use crate::traits::{ChangeEvent, Document, DocumentStore, WriteOp};

/// Redis-backed document store
pub struct RedisStore {
    client: Arc<RedisClient>,
    prefix: String,
}

impl RedisStore {
    /// Create new store from URL
    pub async fn new(url: &str, prefix: impl Into<String>) -> Result<Self> {
        let client = RedisClient::new(url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self::from_client(Arc::new(client), prefix))
    }

    /// Create from existing RedisClient
    pub fn from_client(client: Arc<RedisClient>, prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: prefix.into(),
        }
    }

    fn collection_key(&self, collection: &str) -> String {
        format!("{}:{}", self.prefix, collection)
    }

    fn change_channel(&self, collection: &str) -> String {
        format!("{}:changes:{}", self.prefix, collection)
    }

    async fn read(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let raw = self
            .client
            .hget(&self.collection_key(collection), id)
            .await?;
        raw.map(|s| serde_json::from_str(&s).map_err(StoreError::from))
            .transpose()
    }

    /// Resolve each op against current state, then write and publish in one pipeline
    async fn commit(&self, ops: Vec<WriteOp>) -> Result<()> {
        let mut writes = Vec::with_capacity(ops.len());
        let mut messages = Vec::with_capacity(ops.len());

        for op in ops {
            let collection = op.collection().to_string();
            let id = op.id().to_string();
            let before = self.read(&collection, &id).await?;
            let after = match op {
                WriteOp::Put { doc, .. } => doc,
                WriteOp::Merge { patch, .. } => merge_shallow(before.clone(), patch),
            };

            writes.push((
                self.collection_key(&collection),
                id.clone(),
                serde_json::to_string(&after)?,
            ));
            let event = ChangeEvent {
                collection: collection.clone(),
                id,
                before,
                after: Some(after),
            };
            messages.push((
                self.change_channel(&collection),
                serde_json::to_string(&event)?,
            ));
        }

        self.client
            .pipeline_hset_publish(&writes, &messages)
            .await
            .context("Failed to commit document writes")?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for RedisStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        self.read(collection, id).await
    }

    async fn put(&self, collection: &str, id: &str, doc: Value) -> Result<()> {
        self.commit(vec![WriteOp::put(collection, id, doc)]).await
    }

    async fn add(&self, collection: &str, doc: Value) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.commit(vec![WriteOp::put(collection, &id, doc)]).await?;
        Ok(id)
    }

    async fn merge(&self, collection: &str, id: &str, patch: Value) -> Result<()> {
        self.commit(vec![WriteOp::merge(collection, id, patch)]).await
    }

    async fn query(&self, collection: &str, filters: &[Filter]) -> Result<Vec<Document>> {
        let all = self
            .client
            .hgetall(&self.collection_key(collection))
            .await?;

        let mut docs = Vec::with_capacity(all.len());
        for (id, raw) in all {
            match serde_json::from_str::<Value>(&raw) {
                Ok(doc) if matches_all(filters, &doc) => docs.push(Document::new(id, doc)),
                Ok(_) => {},
                Err(e) => warn!(collection, id = %id, "Skipping unreadable document: {}", e),
            }
        }
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(docs)
    }

    async fn batch(&self, ops: Vec<WriteOp>) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        debug!(count = ops.len(), "Committing batch");
        self.commit(ops).await
    }

    async fn watch(&self, collection: &str) -> Result<BoxStream<'static, ChangeEvent>> {
        let channel = self.change_channel(collection);
        let mut pubsub = self
            .client
            .pubsub()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        pubsub
            .subscribe(&channel)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let stream = pubsub.into_on_message().filter_map(|msg| {
            let event = msg
                .get_payload::<String>()
                .ok()
                .and_then(|payload| serde_json::from_str::<ChangeEvent>(&payload).ok());
            futures::future::ready(event)
        });
        Ok(stream.boxed())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use serde_json::json;

    async fn store() -> RedisStore {
        let prefix = format!("stockwatch-test-{}", uuid::Uuid::new_v4());
        RedisStore::new("redis://localhost:6379", prefix).await.unwrap()
    }

    #[tokio::test]
    #[ignore = "Requires Redis connection"]
    async fn test_put_merge_query() {
        let store = store().await;
        store
            .put("devices", "d-1", json!({"warehouseId": "w", "status": "online"}))
            .await
            .unwrap();
        store
            .merge("devices", "d-1", json!({"status": "offline"}))
            .await
            .unwrap();

        let offline = store
            .query("devices", &[Filter::eq("status", "offline")])
            .await
            .unwrap();
        assert_eq!(offline.len(), 1);
        assert_eq!(offline[0].data["warehouseId"], "w");
    }

    #[tokio::test]
    #[ignore = "Requires Redis connection"]
    async fn test_watch_receives_changes() {
        let store = store().await;
        let mut changes = store.watch("inventory").await.unwrap();

        store
            .put("inventory", "i-1", json!({"quantity": 1}))
            .await
            .unwrap();

        let event = changes.next().await.unwrap();
        assert_eq!(event.id, "i-1");
        assert_eq!(event.after, Some(json!({"quantity": 1})));
    }
}
