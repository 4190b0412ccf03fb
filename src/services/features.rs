//! Feature vector builder - projects fused records onto classifier rows
//!
//! The column layout is derived from the active modality columns: the five
//! base columns always, then the optional per-person WiFi columns.

use crate::domain::record::MergedPersonRecord;
use crate::error::{FusionError, Result};
use crate::infra::config::Config;

/// Round to two decimal places
#[inline]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureColumn {
    PresenceRatio,
    WifiAverageDevices,
    RfidShare,
    RfidAveragePower,
    CameraShare,
    WifiShare,
    WifiRssi,
}

impl FeatureColumn {
    pub fn name(&self) -> &'static str {
        match self {
            FeatureColumn::PresenceRatio => "presence",
            FeatureColumn::WifiAverageDevices => "conndevices",
            FeatureColumn::RfidShare => "rfiduser",
            FeatureColumn::RfidAveragePower => "power",
            FeatureColumn::CameraShare => "camerauser",
            FeatureColumn::WifiShare => "wifiuser",
            FeatureColumn::WifiRssi => "wifirssi",
        }
    }

    fn value(&self, record: &MergedPersonRecord) -> f64 {
        match self {
            FeatureColumn::PresenceRatio => record.presence_ratio,
            FeatureColumn::WifiAverageDevices => record.wifi_average_devices,
            FeatureColumn::RfidShare => record.rfid_share,
            FeatureColumn::RfidAveragePower => record.rfid_average_power,
            FeatureColumn::CameraShare => record.camera_share,
            FeatureColumn::WifiShare => record.wifi_share.unwrap_or(0.0),
            FeatureColumn::WifiRssi => record.wifi_rssi.unwrap_or(0.0),
        }
    }
}

const BASE_COLUMNS: [FeatureColumn; 5] = [
    FeatureColumn::PresenceRatio,
    FeatureColumn::WifiAverageDevices,
    FeatureColumn::RfidShare,
    FeatureColumn::RfidAveragePower,
    FeatureColumn::CameraShare,
];

/// Which optional per-person WiFi columns are active
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModalityColumns {
    pub wifi_share: bool,
    pub wifi_rssi: bool,
}

impl ModalityColumns {
    pub fn base() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        Self { wifi_share: config.wifi_share(), wifi_rssi: config.wifi_rssi() }
    }

    /// WiFi readings are keyed by person in this layout
    pub fn wifi_per_person(&self) -> bool {
        self.wifi_share || self.wifi_rssi
    }

    /// Ordered column layout
    pub fn columns(&self) -> Vec<FeatureColumn> {
        let mut columns = BASE_COLUMNS.to_vec();
        if self.wifi_share {
            columns.push(FeatureColumn::WifiShare);
        }
        if self.wifi_rssi {
            columns.push(FeatureColumn::WifiRssi);
        }
        columns
    }

    pub fn width(&self) -> usize {
        BASE_COLUMNS.len() + usize::from(self.wifi_share) + usize::from(self.wifi_rssi)
    }
}

/// One row per record, same order, every value rounded to two decimals
pub fn to_feature_matrix(records: &[MergedPersonRecord], columns: &ModalityColumns) -> Vec<Vec<f64>> {
    let layout = columns.columns();
    records
        .iter()
        .map(|record| layout.iter().map(|c| round2(c.value(record))).collect())
        .collect()
}

/// Set `detection_label` on each record positionally
///
/// Leaves the records untouched if the lengths differ.
pub fn apply_labels(records: &mut [MergedPersonRecord], labels: &[bool]) -> Result<()> {
    if labels.len() != records.len() {
        return Err(FusionError::SizeMismatch { records: records.len(), labels: labels.len() });
    }
    for (record, &label) in records.iter_mut().zip(labels) {
        record.detection_label = label;
    }
    Ok(())
}
