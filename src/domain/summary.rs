//! Per-window modality summaries
//!
//! One summary per modality per closed window. A modality with no readings
//! yields the `Default` summary: empty maps, zero ratio/average, empty
//! timestamp.

use crate::domain::types::{PersonId, Timestamp};
use serde::Serialize;
use std::collections::BTreeMap;

/// Camera sightings per person
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CameraSummary {
    pub timestamp: Timestamp,
    pub person_counts: BTreeMap<PersonId, u64>,
}

impl CameraSummary {
    /// Total sightings across all persons
    pub fn total(&self) -> u64 {
        self.person_counts.values().sum()
    }
}

/// Fraction of presence readings that detected someone, in [0, 1]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PresenceSummary {
    pub timestamp: Timestamp,
    pub detection_ratio: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RfidStats {
    pub count: u64,
    pub average_power: f64,
}

/// RFID reads per person with their average power
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RfidSummary {
    pub timestamp: Timestamp,
    pub person_stats: BTreeMap<PersonId, RfidStats>,
}

impl RfidSummary {
    pub fn total(&self) -> u64 {
        self.person_stats.values().map(|s| s.count).sum()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WifiPersonStats {
    pub count: u64,
    pub average_rssi: f64,
}

/// Average connected devices, plus per-person stats from nodes that key
/// WiFi readings by person (empty otherwise)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WifiSummary {
    pub timestamp: Timestamp,
    pub average_connected_devices: f64,
    pub person_stats: BTreeMap<PersonId, WifiPersonStats>,
}

impl WifiSummary {
    pub fn total(&self) -> u64 {
        self.person_stats.values().map(|s| s.count).sum()
    }
}

/// All four summaries for one window
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WindowSummaries {
    pub camera: CameraSummary,
    pub presence: PresenceSummary,
    pub rfid: RfidSummary,
    pub wifi: WifiSummary,
}

impl WindowSummaries {
    /// Common timestamp for the window: earliest non-empty modality timestamp
    pub fn timestamp(&self) -> Timestamp {
        Timestamp::earliest([
            &self.camera.timestamp,
            &self.presence.timestamp,
            &self.rfid.timestamp,
            &self.wifi.timestamp,
        ])
    }
}
