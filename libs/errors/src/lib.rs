//! Error type shared by the stockwatch crates
//!
//! Every component of the alert pipeline reports failures through
//! [`StockwatchError`]. Variants are grouped by [`ErrorCategory`]:
//! client errors are surfaced to the caller with a specific status,
//! dependency errors are logged and mapped to a 5xx, invariant violations
//! are reported but never treated as fatal.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Body of the `error` member in failed API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Mirrors the HTTP status
    pub code: u16,
    pub message: String,
    /// Per-field problems, e.g. `{"deviceId": ["required"]}`
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub field_errors: HashMap<String, Vec<String>>,
}

impl ErrorInfo {
    fn new(code: u16, message: String) -> Self {
        Self {
            code,
            message,
            field_errors: HashMap::new(),
        }
    }

    fn field(mut self, field: &str, problem: &str) -> Self {
        self.field_errors
            .entry(field.to_string())
            .or_default()
            .push(problem.to_string());
        self
    }
}

#[derive(Debug, Error)]
pub enum StockwatchError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Store error: {0}")]
    Store(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Delivery failed: {channel}: {message}")]
    Delivery { channel: String, message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Stored state broke a rule the pipeline relies on, e.g. two open
    /// alerts for one subject
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StockwatchResult<T> = Result<T, StockwatchError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Malformed request, bad credentials, unknown device, rate exceeded
    Client,
    /// Store or delivery channel unavailable
    Dependency,
    /// Two unresolved alerts for one subject and similar
    InvariantViolation,
    Configuration,
    Internal,
}

impl StockwatchError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) | Self::MissingField(_) | Self::Serialization(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound { .. } | Self::DeviceNotFound(_) => 404,
            Self::MethodNotAllowed(_) => 405,
            Self::RateLimitExceeded => 429,
            Self::Delivery { .. } | Self::HttpClient(_) => 502,
            Self::Configuration(_)
            | Self::InvalidConfig { .. }
            | Self::Store(_)
            | Self::Redis(_)
            | Self::InvariantViolation(_)
            | Self::Io(_)
            | Self::Internal(_)
            | Self::Other(_) => 500,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::BadRequest(_)
            | Self::MissingField(_)
            | Self::MethodNotAllowed(_)
            | Self::Unauthorized(_)
            | Self::Forbidden(_)
            | Self::NotFound { .. }
            | Self::DeviceNotFound(_)
            | Self::RateLimitExceeded
            | Self::Serialization(_) => ErrorCategory::Client,

            Self::Store(_)
            | Self::Redis(_)
            | Self::Delivery { .. }
            | Self::HttpClient(_) => ErrorCategory::Dependency,

            Self::InvariantViolation(_) => ErrorCategory::InvariantViolation,

            Self::Configuration(_) | Self::InvalidConfig { .. } => ErrorCategory::Configuration,

            Self::Io(_) | Self::Internal(_) | Self::Other(_) => ErrorCategory::Internal,
        }
    }

    /// Response body for this error. Dependency internals stay in the logs.
    pub fn to_error_info(&self) -> ErrorInfo {
        let info = ErrorInfo::new(self.status_code(), self.to_string());
        match self {
            Self::MissingField(field) => info.field(field, "required"),
            Self::InvalidConfig { field, reason } => info.field(field, reason),
            Self::Store(_) | Self::Redis(_) | Self::Io(_) | Self::Other(_) => ErrorInfo {
                message: "Internal server error".to_string(),
                ..info
            },
            _ => info,
        }
    }
}

impl From<serde_json::Error> for StockwatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for StockwatchError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}
