use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Weight,
    Temperature,
    Rfid,
    Barcode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

/// Whether a device must sign its payloads
///
/// `Optional` verifies a signature only when both the header and the
/// device secret are present. `Required` rejects unsigned requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignaturePolicy {
    #[default]
    Optional,
    Required,
}

/// Provisioned sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub warehouse_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shelf_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Hex SHA-256 of the device API key
    pub api_key_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_secret: Option<String>,
    #[serde(default)]
    pub signature_policy: SignaturePolicy,
    /// `None` until the first heartbeat or sweep
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PresenceStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl Device {
    pub fn is_offline(&self) -> bool {
        self.status == Some(PresenceStatus::Offline)
    }

    /// Heartbeat older than `stale_after` relative to `now`
    ///
    /// A device that never reported is not considered stale.
    pub fn is_stale(&self, now: DateTime<Utc>, stale_after: chrono::Duration) -> bool {
        self.last_heartbeat
            .is_some_and(|last| now.signed_duration_since(last) > stale_after)
    }

    /// Human readable label used in alert messages
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use chrono::Duration;

    fn device_json() -> serde_json::Value {
        serde_json::json!({
            "id": "dev-1",
            "type": "weight",
            "warehouseId": "wh-1",
            "shelfId": "sh-1",
            "apiKeyHash": "ab",
            "status": "online",
            "batteryLevel": 55,
            "lastHeartbeat": "2026-01-01T10:00:00Z"
        })
    }

    #[test]
    fn test_device_from_document() {
        let device: Device = serde_json::from_value(device_json()).unwrap();
        assert_eq!(device.device_type, DeviceType::Weight);
        assert_eq!(device.signature_policy, SignaturePolicy::Optional);
        assert_eq!(device.status, Some(PresenceStatus::Online));
        assert_eq!(device.label(), "dev-1");
    }

    #[test]
    fn test_staleness() {
        let device: Device = serde_json::from_value(device_json()).unwrap();
        let last = device.last_heartbeat.unwrap();

        assert!(!device.is_stale(last + Duration::minutes(15), Duration::minutes(15)));
        assert!(device.is_stale(last + Duration::minutes(20), Duration::minutes(15)));

        let never = Device {
            last_heartbeat: None,
            ..device
        };
        assert!(!never.is_stale(last + Duration::days(3), Duration::minutes(15)));
    }
}
