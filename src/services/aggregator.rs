//! Modality aggregator - reduces a window snapshot to one summary per modality
//!
//! Every ratio and average with a zero denominator is exactly 0. A summary's
//! timestamp is that of the first reading received for the modality.

use crate::domain::summary::{
    CameraSummary, PresenceSummary, RfidStats, RfidSummary, WifiPersonStats, WifiSummary,
    WindowSummaries,
};
use crate::domain::types::{
    CameraReading, PersonId, PresenceReading, RfidReading, Timestamp, WifiReading,
};
use crate::services::store::WindowSnapshot;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

/// Divide, defining x/0 as 0
#[inline]
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

fn first_timestamp<'a>(mut stamps: impl Iterator<Item = &'a Timestamp>) -> Timestamp {
    stamps.next().cloned().unwrap_or_default()
}

/// Reduce all four modalities of a snapshot
pub fn aggregate(snapshot: &WindowSnapshot) -> WindowSummaries {
    WindowSummaries {
        camera: camera_summary(&snapshot.camera),
        presence: presence_summary(&snapshot.presence),
        rfid: rfid_summary(&snapshot.rfid),
        wifi: wifi_summary(&snapshot.wifi),
    }
}

pub fn camera_summary(readings: &[CameraReading]) -> CameraSummary {
    if readings.is_empty() {
        warn!(modality = "camera", "modality_empty");
        return CameraSummary::default();
    }

    let mut counts: FxHashMap<PersonId, u64> = FxHashMap::default();
    for r in readings {
        *counts.entry(r.person_id).or_insert(0) += 1;
    }
    for (person, count) in &counts {
        debug!(modality = "camera", person = %person, count = %count, "person_count");
    }

    CameraSummary {
        timestamp: first_timestamp(readings.iter().map(|r| &r.timestamp)),
        person_counts: counts.into_iter().collect(),
    }
}

pub fn presence_summary(readings: &[PresenceReading]) -> PresenceSummary {
    if readings.is_empty() {
        warn!(modality = "presence", "modality_empty");
        return PresenceSummary::default();
    }

    let positive = readings.iter().filter(|r| r.detected).count();
    let detection_ratio = ratio(positive as f64, readings.len() as f64);
    debug!(modality = "presence", positive = %positive, total = %readings.len(), "detection_ratio");

    PresenceSummary {
        timestamp: first_timestamp(readings.iter().map(|r| &r.timestamp)),
        detection_ratio,
    }
}

pub fn rfid_summary(readings: &[RfidReading]) -> RfidSummary {
    if readings.is_empty() {
        warn!(modality = "rfid", "modality_empty");
        return RfidSummary::default();
    }

    // person -> (count, power sum)
    let mut running: FxHashMap<PersonId, (u64, f64)> = FxHashMap::default();
    for r in readings {
        let entry = running.entry(r.person_id).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += r.power;
    }

    let person_stats = running
        .into_iter()
        .map(|(person, (count, power_sum))| {
            let average_power = ratio(power_sum, count as f64);
            debug!(modality = "rfid", person = %person, count = %count, average_power = %average_power, "person_stats");
            (person, RfidStats { count, average_power })
        })
        .collect();

    RfidSummary { timestamp: first_timestamp(readings.iter().map(|r| &r.timestamp)), person_stats }
}

pub fn wifi_summary(readings: &[WifiReading]) -> WifiSummary {
    if readings.is_empty() {
        warn!(modality = "wifi", "modality_empty");
        return WifiSummary::default();
    }

    // Summed as f64: device counts come off the wire unbounded
    let total_devices: f64 = readings.iter().map(|r| r.connected_device_count as f64).sum();
    let average_connected_devices = ratio(total_devices, readings.len() as f64);

    // person -> (count, rssi sum, rssi samples)
    let mut running: FxHashMap<PersonId, (u64, f64, u64)> = FxHashMap::default();
    for r in readings {
        let Some(person) = r.person_id else { continue };
        let entry = running.entry(person).or_insert((0, 0.0, 0));
        entry.0 += 1;
        if let Some(rssi) = r.rssi {
            entry.1 += rssi;
            entry.2 += 1;
        }
    }

    let person_stats = running
        .into_iter()
        .map(|(person, (count, rssi_sum, rssi_samples))| {
            (person, WifiPersonStats { count, average_rssi: ratio(rssi_sum, rssi_samples as f64) })
        })
        .collect();

    debug!(modality = "wifi", average_connected_devices = %average_connected_devices, "devices_avg");

    WifiSummary {
        timestamp: first_timestamp(readings.iter().map(|r| &r.timestamp)),
        average_connected_devices,
        person_stats,
    }
}
