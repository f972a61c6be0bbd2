//! Stockwatch document store abstraction
//!
//! The alert pipeline treats the document store as its only persistence and
//! queueing substrate. This crate provides the seam:
//!
//! - **DocumentStore trait**: get / put / add / merge / query / batch / watch
//!   over named collections of JSON documents
//! - **MemoryStore**: in-process backend for tests and single-node runs
//! - **RedisStore**: one Redis hash per collection, pub/sub change feed
//! - **TimeProvider**: injectable clock for window and staleness logic

pub mod error;
pub mod filter;
pub mod time;
pub mod traits;

#[cfg(feature = "memory-backend")]
pub mod memory_impl;

#[cfg(feature = "redis-backend")]
pub mod redis_impl;

pub use error::{Result, StoreError};
pub use filter::{Filter, FilterOp};
pub use time::{FixedTimeProvider, ManualTimeProvider, SystemTimeProvider, TimeProvider};
pub use traits::{ChangeEvent, Document, DocumentStore, DocumentStoreExt, WriteOp};

#[cfg(feature = "memory-backend")]
pub use memory_impl::MemoryStore;

#[cfg(feature = "redis-backend")]
pub use redis_impl::RedisStore;

/// Shallow merge of `patch` into `base`; non-object bases are replaced
pub(crate) fn merge_shallow(base: Option<serde_json::Value>, patch: serde_json::Value) -> serde_json::Value {
    match (base, patch) {
        (Some(serde_json::Value::Object(mut base)), serde_json::Value::Object(patch)) => {
            for (key, value) in patch {
                base.insert(key, value);
            }
            serde_json::Value::Object(base)
        },
        (_, patch) => patch,
    }
}
