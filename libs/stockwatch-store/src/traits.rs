//! Trait definitions for the document store abstraction

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::filter::Filter;

/// A stored document and its id
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Decode into a typed record, filling in `id` when the body lacks one
    pub fn decode<T: DeserializeOwned>(self, collection: &str) -> Result<T> {
        let Document { id, mut data } = self;
        if let Value::Object(map) = &mut data {
            map.entry("id").or_insert_with(|| Value::String(id.clone()));
        }
        serde_json::from_value(data).map_err(|e| StoreError::InvalidDocument {
            collection: collection.to_string(),
            id,
            reason: e.to_string(),
        })
    }
}

/// One write inside a batch
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Replace the whole document
    Put {
        collection: String,
        id: String,
        doc: Value,
    },
    /// Shallow field merge, creating the document if absent
    Merge {
        collection: String,
        id: String,
        patch: Value,
    },
}

impl WriteOp {
    pub fn put(collection: &str, id: &str, doc: Value) -> Self {
        Self::Put {
            collection: collection.to_string(),
            id: id.to_string(),
            doc,
        }
    }

    pub fn merge(collection: &str, id: &str, patch: Value) -> Self {
        Self::Merge {
            collection: collection.to_string(),
            id: id.to_string(),
            patch,
        }
    }

    pub fn collection(&self) -> &str {
        match self {
            Self::Put { collection, .. } | Self::Merge { collection, .. } => collection,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Put { id, .. } | Self::Merge { id, .. } => id,
        }
    }
}

/// Emitted after every successful write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub collection: String,
    pub id: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

/// Unified document store trait
///
/// Writes are last-write-wins per document. Implementations:
/// - `RedisStore`: production backend
/// - `MemoryStore`: in-memory backend for testing
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Get document by id
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>>;

    /// Replace document
    async fn put(&self, collection: &str, id: &str, doc: Value) -> Result<()>;

    /// Insert with a generated id, returns the id
    async fn add(&self, collection: &str, doc: Value) -> Result<String>;

    /// Shallow field merge into an existing or new document
    async fn merge(&self, collection: &str, id: &str, patch: Value) -> Result<()>;

    /// Documents matching every filter, ordered by id
    async fn query(&self, collection: &str, filters: &[Filter]) -> Result<Vec<Document>>;

    /// Apply several writes as one store call
    async fn batch(&self, ops: Vec<WriteOp>) -> Result<()>;

    /// Change feed for one collection
    async fn watch(&self, collection: &str) -> Result<BoxStream<'static, ChangeEvent>>;
}

/// Typed helpers over any [`DocumentStore`]
#[async_trait]
pub trait DocumentStoreExt: DocumentStore {
    async fn get_as<T>(&self, collection: &str, id: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(collection, id).await? {
            Some(data) => Document::new(id, data).decode(collection).map(Some),
            None => Ok(None),
        }
    }

    async fn put_as<T>(&self, collection: &str, id: &str, record: &T) -> Result<()>
    where
        T: Serialize + Sync,
    {
        self.put(collection, id, serde_json::to_value(record)?).await
    }

    async fn query_as<T>(&self, collection: &str, filters: &[Filter]) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        self.query(collection, filters)
            .await?
            .into_iter()
            .map(|doc| doc.decode(collection))
            .collect()
    }
}

impl<S: DocumentStore + ?Sized> DocumentStoreExt for S {}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Named {
        id: String,
        name: String,
    }

    #[test]
    fn test_decode_fills_missing_id() {
        let named: Named = Document::new("n-1", json!({"name": "a"}))
            .decode("things")
            .unwrap();
        assert_eq!(named.id, "n-1");
        assert_eq!(named.name, "a");
    }

    #[test]
    fn test_decode_keeps_body_id() {
        let named: Named = Document::new("key", json!({"id": "body", "name": "a"}))
            .decode("things")
            .unwrap();
        assert_eq!(named.id, "body");
    }

    #[test]
    fn test_decode_reports_collection_and_id() {
        let err = Document::new("n-2", json!({"nope": 1}))
            .decode::<Named>("things")
            .unwrap_err();
        assert!(err.to_string().contains("things/n-2"));
    }
}
