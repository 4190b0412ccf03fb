//! Fused per-person feature row
//!
//! Field names on the wire follow the detection payload consumed by the
//! access monitor (`person`, `presence`, `conndevices`, ...).

use crate::domain::types::{PersonId, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedPersonRecord {
    pub timestamp: Timestamp,
    #[serde(rename = "person")]
    pub person_id: PersonId,
    /// Window-wide presence detection percentage (0-100)
    #[serde(rename = "presence")]
    pub presence_ratio: f64,
    #[serde(rename = "conndevices")]
    pub wifi_average_devices: f64,
    #[serde(rename = "rfiduser")]
    pub rfid_share: f64,
    #[serde(rename = "power")]
    pub rfid_average_power: f64,
    #[serde(rename = "camerauser")]
    pub camera_share: f64,
    #[serde(rename = "wifiuser", default, skip_serializing_if = "Option::is_none")]
    pub wifi_share: Option<f64>,
    #[serde(rename = "wifirssi", default, skip_serializing_if = "Option::is_none")]
    pub wifi_rssi: Option<f64>,
    #[serde(rename = "detection")]
    pub detection_label: bool,
}

impl MergedPersonRecord {
    /// Record with every modality contribution zeroed
    pub fn new(timestamp: Timestamp, person_id: PersonId) -> Self {
        Self {
            timestamp,
            person_id,
            presence_ratio: 0.0,
            wifi_average_devices: 0.0,
            rfid_share: 0.0,
            rfid_average_power: 0.0,
            camera_share: 0.0,
            wifi_share: None,
            wifi_rssi: None,
            detection_label: false,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_field_names() {
        let mut record = MergedPersonRecord::new(Timestamp::from("123456789"), PersonId(5));
        record.camera_share = 1.0;
        record.detection_label = true;

        let value: serde_json::Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();
        assert_eq!(value["person"], 5);
        assert_eq!(value["timestamp"], "123456789");
        assert_eq!(value["camerauser"], 1.0);
        assert_eq!(value["detection"], true);
        // Optional WiFi columns are omitted when inactive
        assert!(value.get("wifiuser").is_none());
        assert!(value.get("wifirssi").is_none());
    }
}
