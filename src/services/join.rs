//! Person join engine - one fused record per person seen in a window
//!
//! The candidate set is the union of persons seen by camera and RFID, plus
//! WiFi when WiFi readings are keyed by person. Records are emitted in
//! ascending person ID. Presence ratio and average connected devices are
//! window-wide and repeated on every record.

use crate::domain::record::MergedPersonRecord;
use crate::domain::summary::WindowSummaries;
use crate::domain::types::PersonId;
use crate::services::aggregator::ratio;
use crate::services::features::{round2, ModalityColumns};
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

/// Each person's fraction of a modality's total occurrences
fn shares<I>(counts: I) -> BTreeMap<PersonId, f64>
where
    I: IntoIterator<Item = (PersonId, u64)>,
{
    let counts: Vec<(PersonId, u64)> = counts.into_iter().collect();
    let total: u64 = counts.iter().map(|(_, c)| c).sum();
    counts.into_iter().map(|(person, count)| (person, ratio(count as f64, total as f64))).collect()
}

/// Join the window summaries into per-person records
pub fn join(summaries: &WindowSummaries, columns: &ModalityColumns) -> Vec<MergedPersonRecord> {
    let timestamp = summaries.timestamp();

    let camera_shares = shares(summaries.camera.person_counts.iter().map(|(p, c)| (*p, *c)));
    let rfid_shares = shares(summaries.rfid.person_stats.iter().map(|(p, s)| (*p, s.count)));
    let wifi_shares = if columns.wifi_per_person() {
        shares(summaries.wifi.person_stats.iter().map(|(p, s)| (*p, s.count)))
    } else {
        BTreeMap::new()
    };

    let candidates: BTreeSet<PersonId> = camera_shares
        .keys()
        .chain(rfid_shares.keys())
        .chain(wifi_shares.keys())
        .copied()
        .collect();

    // Records carry presence as a percentage; the summary holds a fraction
    let presence_ratio = round2(summaries.presence.detection_ratio * 100.0);
    let wifi_average_devices = round2(summaries.wifi.average_connected_devices);

    candidates
        .into_iter()
        .map(|person| {
            let mut record = MergedPersonRecord::new(timestamp.clone(), person);
            record.presence_ratio = presence_ratio;
            record.wifi_average_devices = wifi_average_devices;
            record.camera_share = round2(camera_shares.get(&person).copied().unwrap_or(0.0));
            record.rfid_share = round2(rfid_shares.get(&person).copied().unwrap_or(0.0));
            record.rfid_average_power = round2(
                summaries.rfid.person_stats.get(&person).map(|s| s.average_power).unwrap_or(0.0),
            );
            if columns.wifi_share {
                record.wifi_share = Some(round2(wifi_shares.get(&person).copied().unwrap_or(0.0)));
            }
            if columns.wifi_rssi {
                record.wifi_rssi = Some(round2(
                    summaries.wifi.person_stats.get(&person).map(|s| s.average_rssi).unwrap_or(0.0),
                ));
            }
            trace!(person = %person, record = ?record, "person_record");
            record
        })
        .collect()
}
