//! Window controller - opens, holds and closes collection windows
//!
//! The controller is the single writer of the reading store: readings reach
//! it over an mpsc channel, so the "is a window open?" check and the append
//! are never interleaved with a close. State machine:
//!
//! ```text
//! CLOSED --first reading--> OPEN --duration elapsed--> CLOSED
//! ```
//!
//! On open the flag `true` is broadcast so sensor nodes transmit
//! unconditionally; on close `false` is broadcast, the store is snapshotted
//! and the pipeline is spawned on that private snapshot. The guard is
//! cleared whatever the pipeline later does.

use crate::domain::types::RawReading;
use crate::infra::metrics::Metrics;
use crate::io::egress_channel::EgressSender;
use crate::services::pipeline::{ClosedWindow, FusionOutcome, FusionPipeline};
use crate::services::store::SensorReadingStore;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Open/closed flag plus a count of windows opened so far
#[derive(Debug, Default)]
pub struct WindowGuard {
    open: AtomicBool,
    generation: AtomicU64,
}

impl WindowGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically move CLOSED -> OPEN
    ///
    /// Returns the new window's generation, or None if a window is already open.
    pub fn try_open(&self) -> Option<u64> {
        self.open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| self.generation.fetch_add(1, Ordering::AcqRel) + 1)
    }

    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Number of windows opened so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenWindow {
    id: Uuid,
    generation: u64,
    deadline: Instant,
}

pub struct WindowController {
    store: SensorReadingStore,
    guard: Arc<WindowGuard>,
    reading_rx: mpsc::Receiver<RawReading>,
    pipeline: Arc<FusionPipeline>,
    egress: Option<EgressSender>,
    metrics: Arc<Metrics>,
    duration: Duration,
    current: Option<OpenWindow>,
    /// Pipeline runs still in progress
    in_flight: JoinSet<Option<FusionOutcome>>,
}

impl WindowController {
    pub fn new(
        duration: Duration,
        reading_rx: mpsc::Receiver<RawReading>,
        pipeline: Arc<FusionPipeline>,
        egress: Option<EgressSender>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store: SensorReadingStore::new(),
            guard: Arc::new(WindowGuard::new()),
            reading_rx,
            pipeline,
            egress,
            metrics,
            duration,
            current: None,
            in_flight: JoinSet::new(),
        }
    }

    /// Shared view of the window state
    pub fn guard(&self) -> Arc<WindowGuard> {
        Arc::clone(&self.guard)
    }

    /// Process readings until the channel closes or shutdown is signalled
    ///
    /// An open window is closed and its pipeline run awaited before returning.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(duration_ms = %self.duration.as_millis(), "window_controller_started");

        loop {
            let deadline = self.current.map(|w| w.deadline);
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("window_controller_shutdown");
                        break;
                    }
                }
                reading = self.reading_rx.recv() => {
                    match reading {
                        Some(reading) => self.ingest(reading),
                        None => break,
                    }
                }
                _ = sleep_until_deadline(deadline) => {
                    self.close_window();
                }
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "fusion_task_aborted");
                    }
                }
            }
        }

        self.close_window();
        while let Some(joined) = self.in_flight.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "fusion_task_aborted");
            }
        }
        info!("window_controller_stopped");
    }

    /// Append a reading, opening a window first if none is open
    pub fn ingest(&mut self, reading: RawReading) {
        if let Some(generation) = self.guard.try_open() {
            self.open_window(generation);
        }
        self.metrics.record_reading(reading.modality());
        self.store.append(reading);
    }

    fn open_window(&mut self, generation: u64) {
        let id = Uuid::now_v7();
        self.current = Some(OpenWindow { id, generation, deadline: Instant::now() + self.duration });
        self.metrics.record_window_opened();
        if let Some(ref egress) = self.egress {
            egress.send_window_state(true);
        }
        info!(window = %id, generation = %generation, "window_opened");
    }

    fn close_window(&mut self) {
        let Some(window) = self.current.take() else {
            return;
        };

        if let Some(ref egress) = self.egress {
            egress.send_window_state(false);
        }
        let snapshot = self.store.snapshot_and_reset();
        self.metrics.record_window_closed();
        info!(
            window = %window.id,
            generation = %window.generation,
            readings = %snapshot.len(),
            "window_closed"
        );

        let pipeline = Arc::clone(&self.pipeline);
        self.in_flight.spawn(pipeline.run_logged(ClosedWindow { id: window.id, snapshot }));
        // Cleared regardless of how the spawned run ends
        self.guard.close();
        debug!(in_flight = %self.in_flight.len(), "fusion_spawned");
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Create the reading channel and its controller
///
/// Returns the sender (for ingress) and the controller (to be spawned)
pub fn create_window_controller(
    duration: Duration,
    buffer_size: usize,
    pipeline: Arc<FusionPipeline>,
    egress: Option<EgressSender>,
    metrics: Arc<Metrics>,
) -> (mpsc::Sender<RawReading>, WindowController) {
    let (reading_tx, reading_rx) = mpsc::channel(buffer_size);
    let controller = WindowController::new(duration, reading_rx, pipeline, egress, metrics);
    (reading_tx, controller)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{CameraReading, PersonId, Timestamp};
    use crate::error::{FusionError, Result};
    use crate::io::egress_channel::{create_egress_channel, EgressMessage};
    use crate::services::classifier::Classifier;
    use crate::services::features::ModalityColumns;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Fails on the first call, labels everything positive afterwards
    struct FailOnce {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Classifier for FailOnce {
        async fn classify(&self, matrix: &[Vec<f64>]) -> Result<Vec<bool>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(FusionError::ClassifierFailure("cold start".to_string()));
            }
            Ok(vec![true; matrix.len()])
        }
    }

    fn camera(person: i64) -> RawReading {
        RawReading::Camera(CameraReading {
            sensor_id: "camera".into(),
            timestamp: Timestamp::from("1700000000"),
            person_id: PersonId(person),
        })
    }

    #[test]
    fn test_guard_transitions() {
        let guard = WindowGuard::new();
        assert_eq!(guard.try_open(), Some(1));
        assert_eq!(guard.try_open(), None);
        assert!(guard.is_open());
        guard.close();
        assert!(!guard.is_open());
        assert_eq!(guard.try_open(), Some(2));
        assert_eq!(guard.generation(), 2);
    }

    #[tokio::test]
    async fn test_reopens_after_failed_pipeline() {
        let metrics = Arc::new(Metrics::new());
        let (egress, mut egress_rx) = create_egress_channel(32);
        let classifier = Arc::new(FailOnce { calls: AtomicUsize::new(0) });
        let pipeline = Arc::new(FusionPipeline::new(
            classifier,
            ModalityColumns::base(),
            Some(egress.clone()),
            Arc::clone(&metrics),
        ));
        let (tx, controller) = create_window_controller(
            Duration::from_millis(30),
            16,
            pipeline,
            Some(egress),
            Arc::clone(&metrics),
        );
        let guard = controller.guard();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(controller.run(shutdown_rx));

        tx.send(camera(5)).await.unwrap();
        assert_eq!(egress_rx.recv().await, Some(EgressMessage::WindowState(true)));
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!guard.is_open());

        // Failed run: window closed again, nothing published
        assert_eq!(egress_rx.try_recv(), Some(EgressMessage::WindowState(false)));
        assert_eq!(egress_rx.try_recv(), None);

        tx.send(camera(5)).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(metrics.windows_opened(), 2);
        assert_eq!(metrics.windows_closed(), 2);
        assert_eq!(metrics.pipeline_failures(), 1);
        assert_eq!(metrics.pipeline_runs(), 1);

        let mut messages = Vec::new();
        while let Some(msg) = egress_rx.try_recv() {
            messages.push(msg);
        }
        assert_eq!(messages[0], EgressMessage::WindowState(false));
        assert!(matches!(&messages[1], EgressMessage::Detection(d) if d.person_id == PersonId(5)));
        assert_eq!(messages.len(), 2);
    }

    #[tokio::test]
    async fn test_readings_within_duration_share_a_window() {
        let metrics = Arc::new(Metrics::new());
        let pipeline = Arc::new(FusionPipeline::new(
            Arc::new(FailOnce { calls: AtomicUsize::new(1) }),
            ModalityColumns::base(),
            None,
            Arc::clone(&metrics),
        ));
        let (tx, controller) =
            create_window_controller(Duration::from_millis(200), 16, pipeline, None, Arc::clone(&metrics));
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(controller.run(shutdown_rx));

        for person in [1, 2, 3] {
            tx.send(camera(person)).await.unwrap();
        }
        drop(tx);
        handle.await.unwrap();

        assert_eq!(metrics.windows_opened(), 1);
        assert_eq!(metrics.readings_received(crate::domain::types::Modality::Camera), 3);
        assert_eq!(metrics.pipeline_runs(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_flushes_open_window() {
        let metrics = Arc::new(Metrics::new());
        let pipeline = Arc::new(FusionPipeline::new(
            Arc::new(FailOnce { calls: AtomicUsize::new(1) }),
            ModalityColumns::base(),
            None,
            Arc::clone(&metrics),
        ));
        let (tx, controller) =
            create_window_controller(Duration::from_secs(60), 16, pipeline, None, Arc::clone(&metrics));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(controller.run(shutdown_rx));

        tx.send(camera(9)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(metrics.windows_closed(), 1);
        assert_eq!(metrics.pipeline_runs(), 1);
    }
}
