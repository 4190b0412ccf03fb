//! Typed channel for MQTT egress messages
//!
//! Detections go through a bounded mpsc channel to prevent unbounded memory
//! growth; when it is full they are dropped. The window flag goes through a
//! `watch` instead: only its latest value matters, and it can never be
//! crowded out by detections.

use crate::domain::record::MergedPersonRecord;
use crate::domain::types::PersonId;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::warn;

/// Messages that can be sent to the MQTT publisher
#[derive(Debug, Clone, PartialEq)]
pub enum EgressMessage {
    /// Window flag for sensor nodes (true = open)
    WindowState(bool),
    /// Positive detection for one person
    Detection(DetectionPayload),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionPayload {
    pub person_id: PersonId,
    /// Serialized `MergedPersonRecord`
    pub json: String,
}

/// Sender handle for egress messages
///
/// Clone this to share across producers. Non-blocking.
#[derive(Clone)]
pub struct EgressSender {
    detections: mpsc::Sender<DetectionPayload>,
    window_state: Arc<watch::Sender<bool>>,
}

impl EgressSender {
    /// Broadcast the window state, replacing any value not yet published
    pub fn send_window_state(&self, open: bool) {
        self.window_state.send_replace(open);
    }

    /// Publish a labelled record
    ///
    /// Returns `false` if the record was dropped.
    pub fn send_detection(&self, record: &MergedPersonRecord) -> bool {
        let json = match record.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!(person = %record.person_id, error = %e, "detection_serialize_failed");
                return false;
            }
        };
        match self.detections.try_send(DetectionPayload { person_id: record.person_id, json }) {
            Ok(()) => true,
            Err(e) => {
                warn!(person = %record.person_id, error = %e, "egress_message_dropped");
                false
            }
        }
    }
}

/// Receiving half, owned by the publisher
pub struct EgressReceiver {
    detections: mpsc::Receiver<DetectionPayload>,
    window_state: watch::Receiver<bool>,
    window_state_live: bool,
}

impl EgressReceiver {
    /// Next message; a window state change is returned ahead of detections
    ///
    /// Returns None once every sender is dropped and nothing is left to publish.
    pub async fn recv(&mut self) -> Option<EgressMessage> {
        loop {
            tokio::select! {
                biased;
                changed = self.window_state.changed(), if self.window_state_live => {
                    match changed {
                        Ok(()) => {
                            let open = *self.window_state.borrow_and_update();
                            return Some(EgressMessage::WindowState(open));
                        }
                        Err(_) => self.window_state_live = false,
                    }
                }
                detection = self.detections.recv() => {
                    return detection.map(EgressMessage::Detection);
                }
            }
        }
    }

    /// Non-blocking variant of `recv`
    pub fn try_recv(&mut self) -> Option<EgressMessage> {
        // Unlike `has_changed`, this still sees an unread value after the senders are gone
        let changed = self.window_state.borrow().has_changed();
        if changed {
            let open = *self.window_state.borrow_and_update();
            return Some(EgressMessage::WindowState(open));
        }
        self.detections.try_recv().ok().map(EgressMessage::Detection)
    }
}

/// Create a new egress channel pair
///
/// `buffer_size` bounds the detection queue. The window flag starts closed.
pub fn create_egress_channel(buffer_size: usize) -> (EgressSender, EgressReceiver) {
    let (detection_tx, detection_rx) = mpsc::channel(buffer_size);
    let (state_tx, state_rx) = watch::channel(false);
    (
        EgressSender { detections: detection_tx, window_state: Arc::new(state_tx) },
        EgressReceiver { detections: detection_rx, window_state: state_rx, window_state_live: true },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Timestamp;

    fn positive(person: i64) -> MergedPersonRecord {
        let mut record = MergedPersonRecord::new(Timestamp::from("1"), PersonId(person));
        record.detection_label = true;
        record
    }

    #[tokio::test]
    async fn test_send_detection() {
        let (sender, mut rx) = create_egress_channel(4);

        assert!(sender.send_detection(&positive(5)));
        match rx.recv().await.unwrap() {
            EgressMessage::Detection(payload) => {
                assert_eq!(payload.person_id, PersonId(5));
                assert!(payload.json.contains("\"person\":5"));
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_full_channel_drops_detections() {
        let (sender, _rx) = create_egress_channel(1);
        assert!(sender.send_detection(&positive(1)));
        assert!(!sender.send_detection(&positive(2)));
    }

    #[tokio::test]
    async fn test_window_state_survives_full_detection_queue() {
        let (sender, mut rx) = create_egress_channel(1);
        assert!(sender.send_detection(&positive(1)));
        assert!(!sender.send_detection(&positive(2)));

        sender.send_window_state(true);
        sender.send_window_state(false);

        // Latest flag first, then the queued detection
        assert_eq!(rx.recv().await, Some(EgressMessage::WindowState(false)));
        assert!(matches!(rx.recv().await, Some(EgressMessage::Detection(ref d)) if d.person_id == PersonId(1)));
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_recv_drains_then_ends_when_senders_dropped() {
        let (sender, mut rx) = create_egress_channel(4);
        let producer = sender.clone();
        producer.send_window_state(true);
        assert!(producer.send_detection(&positive(3)));
        producer.send_window_state(false);
        drop(producer);
        drop(sender);

        assert_eq!(rx.recv().await, Some(EgressMessage::WindowState(false)));
        assert!(matches!(rx.recv().await, Some(EgressMessage::Detection(_))));
        assert_eq!(rx.recv().await, None);
    }
}
