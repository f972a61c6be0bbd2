//! Shared plumbing for stockwatch services
//!
//! Pooled Redis access, tracing setup, layered config loading, HTTP
//! response envelopes and shutdown signalling.

#[cfg(feature = "redis")]
pub mod redis;

pub mod api_types;
pub mod config_loader;
pub mod logging;
pub mod service_bootstrap;
pub mod shutdown;

pub use api_types::{ErrorResponse, HealthStatus, PaginatedResponse, SuccessResponse};
#[cfg(feature = "axum")]
pub use api_types::AppError;
pub use config_loader::{ConfigError, ConfigLoader};

pub mod prelude {
    #[cfg(feature = "redis")]
    pub use crate::redis::RedisClient;
}
