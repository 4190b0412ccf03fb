//! Integration tests for window fusion: aggregate, join, features, labels

use fusion_gateway::domain::types::{
    CameraReading, PersonId, PresenceReading, RawReading, RfidReading, Timestamp, WifiReading,
};
use fusion_gateway::domain::MergedPersonRecord;
use fusion_gateway::error::FusionError;
use fusion_gateway::io::mqtt::parse_message;
use fusion_gateway::services::aggregator::aggregate;
use fusion_gateway::services::features::{apply_labels, to_feature_matrix};
use fusion_gateway::services::join::join;
use fusion_gateway::services::{ModalityColumns, WindowSnapshot};
use std::collections::BTreeSet;

fn ts(t: &str) -> Timestamp {
    Timestamp::from(t)
}

fn camera(person: i64, t: &str) -> RawReading {
    RawReading::Camera(CameraReading { sensor_id: "camera-1".into(), timestamp: ts(t), person_id: PersonId(person) })
}

fn rfid(person: i64, power: f64, t: &str) -> RawReading {
    RawReading::Rfid(RfidReading {
        sensor_id: "rfid-1".into(),
        timestamp: ts(t),
        person_id: PersonId(person),
        power,
    })
}

fn presence(detected: bool, t: &str) -> RawReading {
    RawReading::Presence(PresenceReading { sensor_id: "presence-1".into(), timestamp: ts(t), detected })
}

fn wifi(count: i64, person: Option<i64>, rssi: Option<f64>, t: &str) -> RawReading {
    RawReading::Wifi(WifiReading {
        sensor_id: "wifi-1".into(),
        timestamp: ts(t),
        connected_device_count: count,
        person_id: person.map(PersonId),
        rssi,
    })
}

fn fuse(readings: Vec<RawReading>, columns: &ModalityColumns) -> Vec<MergedPersonRecord> {
    let snapshot: WindowSnapshot = readings.into_iter().collect();
    join(&aggregate(&snapshot), columns)
}

#[test]
fn test_single_person_camera_and_rfid() {
    let records = fuse(vec![camera(5, "100"), rfid(5, 40.0, "101")], &ModalityColumns::base());

    assert_eq!(records.len(), 1);
    let r = &records[0];
    assert_eq!(r.person_id, PersonId(5));
    assert_eq!(r.camera_share, 1.0);
    assert_eq!(r.rfid_share, 1.0);
    assert_eq!(r.rfid_average_power, 40.0);
    assert_eq!(r.presence_ratio, 0.0);
    assert_eq!(r.wifi_average_devices, 0.0);
    assert!(r.wifi_share.is_none());
    assert!(!r.detection_label);
    assert_eq!(r.timestamp, ts("100"));
}

#[test]
fn test_presence_ratio_broadcast_to_every_record() {
    let mut readings = vec![presence(true, "100")];
    readings.extend((0..6).map(|_| presence(false, "100")));
    readings.extend([camera(5, "100"), camera(7, "100"), rfid(9, 70.0, "100")]);

    let records = fuse(readings, &ModalityColumns::base());
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.presence_ratio == 14.29));
}

#[test]
fn test_camera_shares_follow_counts() {
    let mut readings: Vec<RawReading> = (0..20).map(|_| camera(5, "100")).collect();
    readings.extend((0..40).map(|_| camera(7, "100")));

    let records = fuse(readings, &ModalityColumns::base());
    assert_eq!(records[0].person_id, PersonId(5));
    assert_eq!(records[0].camera_share, 0.33);
    assert_eq!(records[1].person_id, PersonId(7));
    assert_eq!(records[1].camera_share, 0.67);
}

#[test]
fn test_every_person_appears_exactly_once() {
    let readings = vec![
        camera(3, "100"),
        camera(8, "100"),
        camera(3, "101"),
        rfid(8, 65.0, "100"),
        rfid(12, 55.0, "102"),
        rfid(12, 45.0, "103"),
        wifi(3, Some(40), Some(-50.0), "100"),
    ];

    let records = fuse(readings, &ModalityColumns::base());
    let ids: Vec<PersonId> = records.iter().map(|r| r.person_id).collect();
    let unique: BTreeSet<PersonId> = ids.iter().copied().collect();

    assert_eq!(ids.len(), unique.len());
    // WiFi person keys only join when the per-person columns are active
    assert_eq!(unique, [3, 8, 12].into_iter().map(PersonId).collect());

    let twelve = records.iter().find(|r| r.person_id == PersonId(12)).unwrap();
    assert_eq!(twelve.rfid_average_power, 50.0);
    assert_eq!(twelve.camera_share, 0.0);
}

#[test]
fn test_camera_shares_sum_to_one() {
    let readings: Vec<RawReading> =
        [1, 2, 2, 3, 3, 3, 4, 5, 5, 6, 7].iter().map(|&p| camera(p, "100")).collect();
    let records = fuse(readings, &ModalityColumns::base());
    let sum: f64 = records.iter().map(|r| r.camera_share).sum();
    assert!((sum - 1.0).abs() <= 0.005 * records.len() as f64);

    let rfid_only = fuse(vec![rfid(1, 80.0, "100"), rfid(2, 80.0, "100")], &ModalityColumns::base());
    assert!(rfid_only.iter().all(|r| r.camera_share == 0.0));
}

#[test]
fn test_empty_window_yields_no_records() {
    let records = fuse(vec![presence(true, "100"), wifi(4, None, None, "100")], &ModalityColumns::base());
    assert!(records.is_empty());
}

#[test]
fn test_per_person_wifi_columns() {
    let columns = ModalityColumns { wifi_share: true, wifi_rssi: true };
    let readings = vec![
        camera(5, "100"),
        wifi(2, Some(5), Some(-60.0), "100"),
        wifi(4, Some(5), Some(-50.0), "101"),
        wifi(3, Some(9), Some(-70.0), "102"),
    ];

    let records = fuse(readings, &columns);
    assert_eq!(records.len(), 2);

    let five = &records[0];
    assert_eq!(five.wifi_share, Some(0.67));
    assert_eq!(five.wifi_rssi, Some(-55.0));
    assert_eq!(five.wifi_average_devices, 3.0);

    let nine = &records[1];
    assert_eq!(nine.person_id, PersonId(9));
    assert_eq!(nine.wifi_share, Some(0.33));
    assert_eq!(nine.camera_share, 0.0);

    let matrix = to_feature_matrix(&records, &columns);
    assert_eq!(matrix[0].len(), 7);
    assert_eq!(matrix[0], vec![0.0, 3.0, 0.0, 0.0, 1.0, 0.67, -55.0]);
}

#[test]
fn test_feature_matrix_preserves_order() {
    let records = fuse(
        vec![camera(7, "100"), camera(5, "100"), rfid(5, 40.0, "100")],
        &ModalityColumns::base(),
    );
    let matrix = to_feature_matrix(&records, &ModalityColumns::base());
    assert_eq!(matrix.len(), records.len());
    assert_eq!(matrix[0], vec![0.0, 0.0, 1.0, 40.0, 0.5]);
    assert_eq!(matrix[1], vec![0.0, 0.0, 0.0, 0.0, 0.5]);
}

#[test]
fn test_apply_labels_size_mismatch() {
    let mut records = fuse(
        vec![camera(1, "100"), camera(2, "100"), camera(3, "100")],
        &ModalityColumns::base(),
    );
    let err = apply_labels(&mut records, &[true, false]).unwrap_err();
    assert!(matches!(err, FusionError::SizeMismatch { records: 3, labels: 2 }));
    assert!(records.iter().all(|r| !r.detection_label));

    apply_labels(&mut records, &[true, false, true]).unwrap();
    let labels: Vec<bool> = records.iter().map(|r| r.detection_label).collect();
    assert_eq!(labels, vec![true, false, true]);
}

#[test]
fn test_extreme_device_counts_from_the_wire() {
    let topic = "/Nodes/node_1/Tracking/Sensor/Wifi";
    let payload = br#"{"sensor":"wifi-1","timestamp":"100","connecteddevices":9223372036854775807}"#;
    let readings = vec![
        parse_message(topic, payload).unwrap(),
        parse_message(topic, payload).unwrap(),
        camera(5, "100"),
    ];

    let records = fuse(readings, &ModalityColumns::base());
    assert_eq!(records.len(), 1);
    assert!(records[0].wifi_average_devices > 9.0e18);
}
