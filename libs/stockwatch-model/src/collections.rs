//! Collection names in the document store

pub const DEVICES: &str = "devices";
pub const INVENTORY: &str = "inventory";
pub const SHELVES: &str = "shelves";
pub const ALERTS: &str = "alerts";
pub const USERS: &str = "users";
pub const NOTIFICATION_QUEUE: &str = "notification-queue";

/// Latest sample per device, keyed by device id
pub const TELEMETRY_LATEST: &str = "telemetry";
/// Append-only sample history
pub const TELEMETRY_HISTORY: &str = "telemetry-history";
