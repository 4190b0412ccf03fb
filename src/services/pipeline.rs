//! Fusion pipeline - aggregate, join, build features, classify, publish
//!
//! Each run owns the snapshot of the window it was started for, so runs of
//! consecutive windows may overlap freely. Failures abort only the
//! publication step of that window.

use crate::domain::record::MergedPersonRecord;
use crate::error::{FusionError, Result};
use crate::infra::metrics::Metrics;
use crate::io::egress_channel::EgressSender;
use crate::services::aggregator::aggregate;
use crate::services::classifier::Classifier;
use crate::services::features::{apply_labels, to_feature_matrix, ModalityColumns};
use crate::services::join::join;
use crate::services::store::WindowSnapshot;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// A closed window handed from the controller to the pipeline
#[derive(Debug, Clone)]
pub struct ClosedWindow {
    pub id: Uuid,
    pub snapshot: WindowSnapshot,
}

/// Result of one successful pipeline run
#[derive(Debug, Clone, Default)]
pub struct FusionOutcome {
    pub records: Vec<MergedPersonRecord>,
    pub published: usize,
}

pub struct FusionPipeline {
    classifier: Arc<dyn Classifier>,
    columns: ModalityColumns,
    egress: Option<EgressSender>,
    metrics: Arc<Metrics>,
}

impl FusionPipeline {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        columns: ModalityColumns,
        egress: Option<EgressSender>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { classifier, columns, egress, metrics }
    }

    pub fn columns(&self) -> &ModalityColumns {
        &self.columns
    }

    /// Aggregate and join a snapshot into unlabelled records
    pub fn fuse(&self, snapshot: &WindowSnapshot) -> Vec<MergedPersonRecord> {
        join(&aggregate(snapshot), &self.columns)
    }

    /// Run the whole pipeline for one window
    pub async fn run(&self, window: ClosedWindow) -> Result<FusionOutcome> {
        let mut records = self.fuse(&window.snapshot);
        if records.is_empty() {
            debug!(window = %window.id, "fusion_no_persons");
            return Ok(FusionOutcome::default());
        }

        let matrix = to_feature_matrix(&records, &self.columns);
        debug!(window = %window.id, matrix = ?matrix, "feature_matrix");

        let labels = match self.classifier.classify(&matrix).await {
            Ok(labels) => labels,
            Err(e) => {
                self.metrics.record_classifier_failure();
                warn!(window = %window.id, rows = %matrix.len(), error = %e, "classifier_failed");
                return Err(match e {
                    FusionError::ClassifierFailure(_) => e,
                    other => FusionError::ClassifierFailure(other.to_string()),
                });
            }
        };

        if let Err(e) = apply_labels(&mut records, &labels) {
            self.metrics.record_label_mismatch();
            return Err(e);
        }

        let mut published = 0;
        if let Some(ref egress) = self.egress {
            for record in records.iter().filter(|r| r.detection_label) {
                if egress.send_detection(record) {
                    published += 1;
                }
            }
        }

        Ok(FusionOutcome { records, published })
    }

    /// Run and log; errors never propagate past this point
    pub async fn run_logged(self: Arc<Self>, window: ClosedWindow) -> Option<FusionOutcome> {
        let start = Instant::now();
        let window_id = window.id;
        let readings = window.snapshot.len();

        match self.run(window).await {
            Ok(outcome) => {
                let latency_us = start.elapsed().as_micros() as u64;
                self.metrics.record_pipeline_run(latency_us, outcome.records.len(), outcome.published);
                info!(
                    window = %window_id,
                    readings = %readings,
                    persons = %outcome.records.len(),
                    detections = %outcome.published,
                    latency_us = %latency_us,
                    "fusion_complete"
                );
                Some(outcome)
            }
            Err(e) => {
                self.metrics.record_pipeline_failure();
                error!(window = %window_id, error = %e, "fusion_failed");
                None
            }
        }
    }
}
