//! Error types for stockwatch-store

use errors::StockwatchError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Invalid document {collection}/{id}: {reason}")]
    InvalidDocument {
        collection: String,
        id: String,
        reason: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<StoreError> for StockwatchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { collection, id } => StockwatchError::NotFound {
                resource: format!("{}/{}", collection, id),
            },
            other => StockwatchError::Store(other.to_string()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_store_error_maps_to_dependency_error() {
        let err: StockwatchError = StoreError::Connection("refused".into()).into();
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.category(), errors::ErrorCategory::Dependency);
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let err: StockwatchError = StoreError::NotFound {
            collection: "alerts".into(),
            id: "a-1".into(),
        }
        .into();
        assert_eq!(err.status_code(), 404);
    }
}
