//! Alert detection rules
//!
//! Every function here is pure: it looks at the previous known state and the
//! new state and returns the candidates for conditions that hold. Whether a
//! candidate becomes an alert is the deduplicator's call.

use serde::{Deserialize, Serialize};
use serde_json::json;

use stockwatch_model::{
    AlertType, Device, InventoryRecord, JsonMap, PresenceStatus, Severity, Shelf, Subject,
    TelemetrySample,
};

/// Telemetry and battery thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub temperature_min: f64,
    pub temperature_max: f64,
    pub battery_warning_below: u8,
    pub battery_critical_below: u8,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            temperature_min: 0.0,
            temperature_max: 30.0,
            battery_warning_below: 20,
            battery_critical_below: 10,
        }
    }
}

/// A condition worth alerting on, not yet persisted
#[derive(Debug, Clone, PartialEq)]
pub struct AlertCandidate {
    pub alert_type: AlertType,
    pub severity: Severity,
    pub warehouse_id: String,
    pub device_id: Option<String>,
    pub shelf_id: Option<String>,
    pub product_id: Option<String>,
    /// Human readable name of the subject, for notifications
    pub subject_label: String,
    pub message: String,
    pub details: JsonMap,
}

impl AlertCandidate {
    fn for_device(device: &Device, alert_type: AlertType, severity: Severity, message: String) -> Self {
        Self {
            alert_type,
            severity,
            warehouse_id: device.warehouse_id.clone(),
            device_id: Some(device.id.clone()),
            shelf_id: device.shelf_id.clone(),
            product_id: None,
            subject_label: device.label().to_string(),
            message,
            details: JsonMap::new(),
        }
    }

    // Inventory alerts key on the product; the shelf is context only
    fn for_inventory(
        record: &InventoryRecord,
        alert_type: AlertType,
        severity: Severity,
        message: String,
    ) -> Self {
        let mut details = JsonMap::new();
        details.insert("quantity".into(), json!(record.quantity));
        details.insert("minStockLevel".into(), json!(record.min_stock_level));
        if let Some(shelf_id) = &record.shelf_id {
            details.insert("shelfId".into(), json!(shelf_id));
        }
        if !record.id.is_empty() {
            details.insert("inventoryId".into(), json!(record.id));
        }
        Self {
            alert_type,
            severity,
            warehouse_id: record.warehouse_id.clone(),
            device_id: None,
            shelf_id: None,
            product_id: Some(record.product_id.clone()),
            subject_label: record.label().to_string(),
            message,
            details,
        }
    }

    fn with_detail(mut self, key: &str, value: serde_json::Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }

    pub fn subject(&self) -> Option<Subject> {
        Subject::most_specific(
            self.device_id.as_deref(),
            self.shelf_id.as_deref(),
            self.product_id.as_deref(),
        )
    }
}

/// Stock level transition rules
///
/// - Quantity at or below the minimum when the previous quantity (if known)
///   was above it: `low_stock`, critical at zero, warning otherwise.
/// - Quantity hitting zero from a known positive value: `out_of_stock`,
///   critical, even if a low stock alert already fired.
pub fn evaluate_inventory(
    previous: Option<&InventoryRecord>,
    current: &InventoryRecord,
) -> Vec<AlertCandidate> {
    let mut candidates = Vec::new();
    let quantity = current.quantity;
    let min = current.min_stock_level;
    let previous_quantity = previous.map(|p| p.quantity);

    if quantity <= min && previous_quantity.map_or(true, |q| q > min) {
        let severity = if quantity == 0 {
            Severity::Critical
        } else {
            Severity::Warning
        };
        candidates.push(AlertCandidate::for_inventory(
            current,
            AlertType::LowStock,
            severity,
            format!(
                "{} is low on stock: {} left (minimum {})",
                current.label(),
                quantity,
                min
            ),
        ));
    }

    if quantity == 0 && previous_quantity.is_some_and(|q| q > 0) {
        candidates.push(AlertCandidate::for_inventory(
            current,
            AlertType::OutOfStock,
            Severity::Critical,
            format!("{} is out of stock", current.label()),
        ));
    }

    candidates
}

/// Sensor reading rules for one accepted sample
pub fn evaluate_telemetry(
    device: &Device,
    shelf: Option<&Shelf>,
    sample: &TelemetrySample,
    thresholds: &Thresholds,
) -> Vec<AlertCandidate> {
    let mut candidates = Vec::new();

    if let (Some(weight), Some(max_weight)) = (sample.weight(), shelf.and_then(|s| s.max_weight)) {
        if weight > max_weight {
            candidates.push(
                AlertCandidate::for_device(
                    device,
                    AlertType::WeightMismatch,
                    Severity::Warning,
                    format!(
                        "{} reports {:.2} kg, above shelf capacity {:.2} kg",
                        device.label(),
                        weight,
                        max_weight
                    ),
                )
                .with_detail("weight", json!(weight))
                .with_detail("maxWeight", json!(max_weight)),
            );
        }
    }

    if let Some(temperature) = sample.temperature() {
        if temperature < thresholds.temperature_min || temperature > thresholds.temperature_max {
            candidates.push(
                AlertCandidate::for_device(
                    device,
                    AlertType::TemperatureAlert,
                    Severity::Critical,
                    format!(
                        "{} reads {:.1}°C, outside [{}, {}]",
                        device.label(),
                        temperature,
                        thresholds.temperature_min,
                        thresholds.temperature_max
                    ),
                )
                .with_detail("temperature", json!(temperature)),
            );
        }
    }

    if let Some(level) = sample.battery_level() {
        candidates.extend(evaluate_battery(device, level, thresholds));
    }

    candidates
}

/// Battery rule: warning below the warning threshold, critical below the
/// critical one
pub fn evaluate_battery(device: &Device, level: u8, thresholds: &Thresholds) -> Option<AlertCandidate> {
    let severity = if level < thresholds.battery_critical_below {
        Severity::Critical
    } else if level < thresholds.battery_warning_below {
        Severity::Warning
    } else {
        return None;
    };

    Some(
        AlertCandidate::for_device(
            device,
            AlertType::LowBattery,
            severity,
            format!("{} battery at {}%", device.label(), level),
        )
        .with_detail("batteryLevel", json!(level)),
    )
}

/// Presence rule: a transition into offline raises `sensor_failure`
pub fn evaluate_presence(
    device: &Device,
    previous: Option<PresenceStatus>,
    current: PresenceStatus,
) -> Option<AlertCandidate> {
    if current != PresenceStatus::Offline || previous == Some(PresenceStatus::Offline) {
        return None;
    }

    let mut candidate = AlertCandidate::for_device(
        device,
        AlertType::SensorFailure,
        Severity::Warning,
        format!("{} is offline", device.label()),
    );
    if let Some(last) = device.last_heartbeat {
        candidate = candidate.with_detail("lastHeartbeat", json!(last.to_rfc3339()));
    }
    Some(candidate)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use stockwatch_model::DeviceType;

    fn record(quantity: u32) -> InventoryRecord {
        InventoryRecord {
            id: "inv-1".into(),
            product_id: "p-1".into(),
            product_name: Some("Pallet wrap".into()),
            warehouse_id: "wh-1".into(),
            shelf_id: Some("sh-1".into()),
            quantity,
            min_stock_level: 5,
            max_stock_level: None,
        }
    }

    fn device() -> Device {
        Device {
            id: "dev-1".into(),
            device_type: DeviceType::Weight,
            warehouse_id: "wh-1".into(),
            shelf_id: Some("sh-1".into()),
            name: None,
            api_key_hash: String::new(),
            shared_secret: None,
            signature_policy: Default::default(),
            status: Some(PresenceStatus::Online),
            battery_level: None,
            last_heartbeat: None,
        }
    }

    fn sample(data: serde_json::Value) -> TelemetrySample {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        TelemetrySample {
            device_id: "dev-1".into(),
            device_type: None,
            data: data.as_object().cloned().unwrap(),
            timestamp: at,
            received_at: at,
        }
    }

    fn types(candidates: &[AlertCandidate]) -> Vec<(AlertType, Severity)> {
        candidates.iter().map(|c| (c.alert_type, c.severity)).collect()
    }

    #[test]
    fn test_low_stock_fires_on_crossing() {
        let fired = evaluate_inventory(Some(&record(15)), &record(3));
        assert_eq!(types(&fired), vec![(AlertType::LowStock, Severity::Warning)]);
        assert_eq!(fired[0].subject(), Some(Subject::Product("p-1".into())));
        assert_eq!(fired[0].details["shelfId"], "sh-1");
        assert_eq!(fired[0].subject_label, "Pallet wrap");

        assert!(evaluate_inventory(Some(&record(4)), &record(3)).is_empty());
        assert!(evaluate_inventory(Some(&record(15)), &record(6)).is_empty());
    }

    #[test]
    fn test_low_stock_without_history() {
        let fired = evaluate_inventory(None, &record(5));
        assert_eq!(types(&fired), vec![(AlertType::LowStock, Severity::Warning)]);

        let fired = evaluate_inventory(None, &record(0));
        assert_eq!(types(&fired), vec![(AlertType::LowStock, Severity::Critical)]);
    }

    #[test]
    fn test_zero_stock_transition() {
        let fired = evaluate_inventory(Some(&record(3)), &record(0));
        assert_eq!(types(&fired), vec![(AlertType::OutOfStock, Severity::Critical)]);

        let fired = evaluate_inventory(Some(&record(20)), &record(0));
        assert_eq!(
            types(&fired),
            vec![
                (AlertType::LowStock, Severity::Critical),
                (AlertType::OutOfStock, Severity::Critical)
            ]
        );

        assert!(evaluate_inventory(Some(&record(0)), &record(0)).is_empty());
    }

    #[test]
    fn test_telemetry_rules() {
        let shelf = Shelf {
            id: "sh-1".into(),
            warehouse_id: "wh-1".into(),
            name: None,
            max_weight: Some(100.0),
        };
        let thresholds = Thresholds::default();

        let fired = evaluate_telemetry(
            &device(),
            Some(&shelf),
            &sample(json!({"weight": 120.0, "temperature": 31.5, "batteryLevel": 9})),
            &thresholds,
        );
        assert_eq!(
            types(&fired),
            vec![
                (AlertType::WeightMismatch, Severity::Warning),
                (AlertType::TemperatureAlert, Severity::Critical),
                (AlertType::LowBattery, Severity::Critical)
            ]
        );
        assert!(fired
            .iter()
            .all(|c| c.subject() == Some(Subject::Device("dev-1".into()))));

        let quiet = evaluate_telemetry(
            &device(),
            Some(&shelf),
            &sample(json!({"weight": 100.0, "temperature": 0.0, "batteryLevel": 20})),
            &thresholds,
        );
        assert!(quiet.is_empty());

        // No shelf capacity, no weight rule
        let fired = evaluate_telemetry(&device(), None, &sample(json!({"weight": 1e6})), &thresholds);
        assert!(fired.is_empty());
    }

    #[test]
    fn test_battery_bands() {
        let thresholds = Thresholds::default();
        assert_eq!(
            evaluate_battery(&device(), 19, &thresholds).map(|c| c.severity),
            Some(Severity::Warning)
        );
        assert_eq!(
            evaluate_battery(&device(), 9, &thresholds).map(|c| c.severity),
            Some(Severity::Critical)
        );
        assert!(evaluate_battery(&device(), 20, &thresholds).is_none());
    }

    #[test]
    fn test_presence_transition() {
        let fired = evaluate_presence(&device(), Some(PresenceStatus::Online), PresenceStatus::Offline);
        assert_eq!(fired.map(|c| c.alert_type), Some(AlertType::SensorFailure));

        assert!(evaluate_presence(&device(), None, PresenceStatus::Offline).is_some());
        assert!(
            evaluate_presence(&device(), Some(PresenceStatus::Offline), PresenceStatus::Offline)
                .is_none()
        );
        assert!(evaluate_presence(&device(), None, PresenceStatus::Online).is_none());
    }
}
