//! Alert documents
//!
//! At most one unresolved alert may exist per (warehouse, type, subject).
//! The subject is the most specific id an alert carries: device, then
//! shelf, then product.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::JsonMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    LowStock,
    SensorFailure,
    TemperatureAlert,
    WeightMismatch,
    LowBattery,
    OutOfStock,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LowStock => "low_stock",
            Self::SensorFailure => "sensor_failure",
            Self::TemperatureAlert => "temperature_alert",
            Self::WeightMismatch => "weight_mismatch",
            Self::LowBattery => "low_battery",
            Self::OutOfStock => "out_of_stock",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The entity an alert concerns
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subject {
    Device(String),
    Shelf(String),
    Product(String),
}

impl Subject {
    /// Most specific available id: device, then shelf, then product
    pub fn most_specific(
        device_id: Option<&str>,
        shelf_id: Option<&str>,
        product_id: Option<&str>,
    ) -> Option<Self> {
        let present = |id: Option<&str>| id.filter(|s| !s.is_empty()).map(str::to_string);
        present(device_id)
            .map(Self::Device)
            .or_else(|| present(shelf_id).map(Self::Shelf))
            .or_else(|| present(product_id).map(Self::Product))
    }

    /// Document field holding this subject's id
    pub fn field(&self) -> &'static str {
        match self {
            Self::Device(_) => "deviceId",
            Self::Shelf(_) => "shelfId",
            Self::Product(_) => "productId",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Device(id) | Self::Shelf(id) | Self::Product(id) => id,
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(id) => write!(f, "device {}", id),
            Self::Shelf(id) => write!(f, "shelf {}", id),
            Self::Product(id) => write!(f, "product {}", id),
        }
    }
}

/// Persisted alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: Severity,
    pub warehouse_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shelf_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub details: JsonMap,
    #[serde(default)]
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn subject(&self) -> Option<Subject> {
        Subject::most_specific(
            self.device_id.as_deref(),
            self.shelf_id.as_deref(),
            self.product_id.as_deref(),
        )
    }

    /// Mark resolved; a second call keeps the first resolver
    pub fn resolve(&mut self, resolved_by: impl Into<String>, at: DateTime<Utc>) -> bool {
        if self.resolved {
            return false;
        }
        self.resolved = true;
        self.resolved_by = Some(resolved_by.into());
        self.resolved_at = Some(at);
        true
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_subject_precedence() {
        assert_eq!(
            Subject::most_specific(Some("d"), Some("s"), Some("p")),
            Some(Subject::Device("d".into()))
        );
        assert_eq!(
            Subject::most_specific(None, Some("s"), Some("p")),
            Some(Subject::Shelf("s".into()))
        );
        assert_eq!(
            Subject::most_specific(Some(""), None, Some("p")),
            Some(Subject::Product("p".into()))
        );
        assert_eq!(Subject::most_specific(None, None, None), None);
    }

    #[test]
    fn test_alert_document_shape() {
        let alert: Alert = serde_json::from_value(serde_json::json!({
            "id": "a-1",
            "type": "out_of_stock",
            "severity": "critical",
            "warehouseId": "wh-1",
            "productId": "p-1",
            "message": "Widget is out of stock",
            "createdAt": "2026-01-01T10:00:00Z"
        }))
        .unwrap();

        assert_eq!(alert.alert_type, AlertType::OutOfStock);
        assert!(!alert.resolved);
        assert_eq!(alert.subject(), Some(Subject::Product("p-1".into())));

        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["type"], "out_of_stock");
        assert!(json.get("deviceId").is_none());
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let mut alert: Alert = serde_json::from_value(serde_json::json!({
            "type": "low_stock",
            "severity": "warning",
            "warehouseId": "wh-1",
            "message": "low",
            "createdAt": "2026-01-01T10:00:00Z"
        }))
        .unwrap();
        let at = Utc::now();

        assert!(alert.resolve("op-1", at));
        assert!(!alert.resolve("op-2", at));
        assert_eq!(alert.resolved_by.as_deref(), Some("op-1"));
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }
}
