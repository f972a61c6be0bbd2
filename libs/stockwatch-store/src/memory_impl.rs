//! In-memory document store
//!
//! Collections live in a DashMap of ordered maps. Single-document writes
//! lock one shard; batches take the write gate so readers never observe half
//! a batch. Change events go through a broadcast channel.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{BoxStream, StreamExt};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::warn;

use crate::error::Result;
use crate::filter::{matches_all, Filter};
use crate::merge_shallow;
use crate::traits::{ChangeEvent, Document, DocumentStore, WriteOp};

const CHANGE_CHANNEL_CAPACITY: usize = 1024;

/// In-memory store with concurrent access support
pub struct MemoryStore {
    collections: Arc<DashMap<String, BTreeMap<String, Value>>>,
    write_gate: RwLock<()>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            collections: Arc::new(DashMap::new()),
            write_gate: RwLock::new(()),
            changes,
        }
    }

    /// Number of documents in one collection
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .get(collection)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }

    // Caller holds the write gate (shared or exclusive)
    fn apply(&self, op: WriteOp) -> ChangeEvent {
        match op {
            WriteOp::Put {
                collection,
                id,
                doc,
            } => {
                let before = self
                    .collections
                    .entry(collection.clone())
                    .or_default()
                    .insert(id.clone(), doc.clone());
                ChangeEvent {
                    collection,
                    id,
                    before,
                    after: Some(doc),
                }
            },
            WriteOp::Merge {
                collection,
                id,
                patch,
            } => {
                let mut docs = self.collections.entry(collection.clone()).or_default();
                let before = docs.get(&id).cloned();
                let after = merge_shallow(before.clone(), patch);
                docs.insert(id.clone(), after.clone());
                ChangeEvent {
                    collection,
                    id,
                    before,
                    after: Some(after),
                }
            },
        }
    }

    fn publish(&self, event: ChangeEvent) {
        // No receivers is not an error
        let _ = self.changes.send(event);
    }

    fn write_one(&self, op: WriteOp) {
        let event = {
            let _gate = self.write_gate.read();
            self.apply(op)
        };
        self.publish(event);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let _gate = self.write_gate.read();
        Ok(self
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id).cloned()))
    }

    async fn put(&self, collection: &str, id: &str, doc: Value) -> Result<()> {
        self.write_one(WriteOp::put(collection, id, doc));
        Ok(())
    }

    async fn add(&self, collection: &str, doc: Value) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.write_one(WriteOp::put(collection, &id, doc));
        Ok(id)
    }

    async fn merge(&self, collection: &str, id: &str, patch: Value) -> Result<()> {
        self.write_one(WriteOp::merge(collection, id, patch));
        Ok(())
    }

    async fn query(&self, collection: &str, filters: &[Filter]) -> Result<Vec<Document>> {
        let _gate = self.write_gate.read();
        let Some(docs) = self.collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .iter()
            .filter(|(_, doc)| matches_all(filters, doc))
            .map(|(id, doc)| Document::new(id.clone(), doc.clone()))
            .collect())
    }

    async fn batch(&self, ops: Vec<WriteOp>) -> Result<()> {
        let events: Vec<ChangeEvent> = {
            let _gate = self.write_gate.write();
            ops.into_iter().map(|op| self.apply(op)).collect()
        };
        for event in events {
            self.publish(event);
        }
        Ok(())
    }

    async fn watch(&self, collection: &str) -> Result<BoxStream<'static, ChangeEvent>> {
        let collection = collection.to_string();
        let stream = BroadcastStream::new(self.changes.subscribe()).filter_map(move |item| {
            let wanted = match item {
                Ok(event) if event.collection == collection => Some(event),
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(collection = %collection, skipped, "Change feed lagged");
                    None
                },
            };
            futures::future::ready(wanted)
        });
        Ok(stream.boxed())
    }
}
