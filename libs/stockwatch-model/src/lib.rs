//! Stockwatch document model
//!
//! Types stored in the document store's collections. Field names follow the
//! camelCase convention used by the dashboard and the devices.

pub mod alert;
pub mod collections;
pub mod device;
pub mod inventory;
pub mod telemetry;
pub mod user;

pub use alert::{Alert, AlertType, Severity, Subject};
pub use device::{Device, DeviceType, PresenceStatus, SignaturePolicy};
pub use inventory::{InventoryRecord, Shelf};
pub use telemetry::TelemetrySample;
pub use user::{Role, User};

/// JSON object used for free-form payloads and alert details
pub type JsonMap = serde_json::Map<String, serde_json::Value>;
