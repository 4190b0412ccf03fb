//! Sensor reading store - raw readings of the open window
//!
//! One append-only sequence per modality behind a single mutex. The lock is
//! held only for one append or one swap, so `snapshot_and_reset` is
//! indivisible with respect to concurrent appends: every reading lands in
//! exactly one snapshot.

use crate::domain::types::{
    CameraReading, Modality, PresenceReading, RawReading, RfidReading, WifiReading,
};
use parking_lot::Mutex;

/// Readings captured for one window, owned by whoever took the snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowSnapshot {
    pub camera: Vec<CameraReading>,
    pub presence: Vec<PresenceReading>,
    pub rfid: Vec<RfidReading>,
    pub wifi: Vec<WifiReading>,
}

impl WindowSnapshot {
    pub fn push(&mut self, reading: RawReading) {
        match reading {
            RawReading::Camera(r) => self.camera.push(r),
            RawReading::Presence(r) => self.presence.push(r),
            RawReading::Rfid(r) => self.rfid.push(r),
            RawReading::Wifi(r) => self.wifi.push(r),
        }
    }

    pub fn count(&self, modality: Modality) -> usize {
        match modality {
            Modality::Camera => self.camera.len(),
            Modality::Presence => self.presence.len(),
            Modality::Rfid => self.rfid.len(),
            Modality::Wifi => self.wifi.len(),
        }
    }

    pub fn len(&self) -> usize {
        Modality::ALL.iter().map(|m| self.count(*m)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<RawReading> for WindowSnapshot {
    fn from_iter<I: IntoIterator<Item = RawReading>>(iter: I) -> Self {
        let mut snapshot = WindowSnapshot::default();
        for reading in iter {
            snapshot.push(reading);
        }
        snapshot
    }
}

#[derive(Debug, Default)]
pub struct SensorReadingStore {
    live: Mutex<WindowSnapshot>,
}

impl SensorReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reading to its modality's sequence
    #[inline]
    pub fn append(&self, reading: RawReading) {
        self.live.lock().push(reading);
    }

    /// Take everything accumulated so far and leave four empty sequences
    pub fn snapshot_and_reset(&self) -> WindowSnapshot {
        std::mem::take(&mut *self.live.lock())
    }

    /// Number of readings currently held
    pub fn len(&self) -> usize {
        self.live.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{PersonId, Timestamp};
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    fn camera(person: i64, ts: u64) -> RawReading {
        RawReading::Camera(CameraReading {
            sensor_id: "camera".to_string(),
            timestamp: Timestamp(ts.to_string()),
            person_id: PersonId(person),
        })
    }

    fn presence(detected: bool) -> RawReading {
        RawReading::Presence(PresenceReading {
            sensor_id: "presence".to_string(),
            timestamp: Timestamp::from("123456789"),
            detected,
        })
    }

    #[test]
    fn test_append_routes_by_modality() {
        let store = SensorReadingStore::new();
        store.append(camera(5, 1));
        store.append(presence(true));
        store.append(camera(7, 2));

        let snapshot = store.snapshot_and_reset();
        assert_eq!(snapshot.count(Modality::Camera), 2);
        assert_eq!(snapshot.count(Modality::Presence), 1);
        assert_eq!(snapshot.count(Modality::Rfid), 0);
        assert_eq!(snapshot.camera[1].person_id, PersonId(7));
    }

    #[test]
    fn test_snapshot_resets_store() {
        let store = SensorReadingStore::new();
        store.append(camera(5, 1));

        let first = store.snapshot_and_reset();
        assert_eq!(first.len(), 1);
        assert!(store.is_empty());

        store.append(camera(9, 2));
        let second = store.snapshot_and_reset();
        assert_eq!(second.len(), 1);
        assert_eq!(second.camera[0].person_id, PersonId(9));
    }

    #[test]
    fn test_snapshot_is_independent_of_live_store() {
        let store = SensorReadingStore::new();
        store.append(camera(5, 1));
        let snapshot = store.snapshot_and_reset();
        store.append(camera(6, 2));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.camera[0].person_id, PersonId(5));
    }

    #[test]
    fn test_interleaved_appends_land_in_exactly_one_snapshot() {
        const PRODUCERS: u64 = 4;
        const PER_PRODUCER: u64 = 2_000;

        let store = Arc::new(SensorReadingStore::new());
        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        store.append(camera(p as i64, p * PER_PRODUCER + i));
                    }
                })
            })
            .collect();

        let mut snapshots = Vec::new();
        while producers.iter().any(|h| !h.is_finished()) {
            snapshots.push(store.snapshot_and_reset());
        }
        for handle in producers {
            handle.join().unwrap();
        }
        snapshots.push(store.snapshot_and_reset());

        let mut seen = HashSet::new();
        for snapshot in &snapshots {
            for reading in &snapshot.camera {
                assert!(seen.insert(reading.timestamp.clone()), "reading seen twice");
            }
        }
        assert_eq!(seen.len() as u64, PRODUCERS * PER_PRODUCER, "no reading lost");
    }
}
