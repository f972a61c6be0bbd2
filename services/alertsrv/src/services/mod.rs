//! Alert pipeline services
//!
//! - `gateway`: telemetry webhook guards and persistence
//! - `rate_limiter`, `credentials`: gateway guards
//! - `detector`: pure alert rules
//! - `dedup`: at most one unresolved alert per subject
//! - `pipeline`: detector to dedup glue
//! - `sweeper`: scheduled device health checks
//! - `watcher`: inventory change feed listener

pub mod credentials;
pub mod dedup;
pub mod detector;
pub mod gateway;
pub mod pipeline;
pub mod rate_limiter;
pub mod sweeper;
pub mod watcher;

pub use dedup::{Deduplicator, SubmitOutcome};
pub use detector::{AlertCandidate, Thresholds};
pub use gateway::{IngestAck, IngestRequest, IngestionGateway};
pub use pipeline::{AlertPipeline, RaiseReport};
pub use rate_limiter::{
    RateLimitBackend, RateLimitConfig, RateLimiter, RedisWindowLimiter, SlidingWindowLimiter,
};
pub use sweeper::{DeviceHealthSweeper, SweepReport, SweeperConfig};
pub use watcher::InventoryWatcher;
