use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::JsonMap;

/// One accepted telemetry write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySample {
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    pub data: JsonMap,
    /// Client-supplied, or the arrival time when absent
    pub timestamp: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}

impl TelemetrySample {
    pub fn number(&self, field: &str) -> Option<f64> {
        self.data.get(field).and_then(serde_json::Value::as_f64)
    }

    pub fn weight(&self) -> Option<f64> {
        self.number("weight")
    }

    pub fn temperature(&self) -> Option<f64> {
        self.number("temperature")
    }

    /// Battery percentage, clamped to 0..=100
    pub fn battery_level(&self) -> Option<u8> {
        self.number("batteryLevel")
            .or_else(|| self.number("battery"))
            .map(|level| level.clamp(0.0, 100.0).round() as u8)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_numeric_readings() {
        let sample: TelemetrySample = serde_json::from_value(serde_json::json!({
            "deviceId": "dev-1",
            "data": {"weight": 120.5, "temperature": "n/a", "battery": 140},
            "timestamp": "2026-01-01T10:00:00Z",
            "receivedAt": "2026-01-01T10:00:01Z"
        }))
        .unwrap();

        assert_eq!(sample.weight(), Some(120.5));
        assert_eq!(sample.temperature(), None);
        assert_eq!(sample.battery_level(), Some(100));
    }
}
