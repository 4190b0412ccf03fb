//! Error types for the fusion core
//!
//! None of these are fatal: the window controller logs them and keeps
//! accepting windows. An empty modality is not an error at all; it yields a
//! zero-valued summary.

use crate::domain::types::Modality;

#[derive(Debug, thiserror::Error)]
pub enum FusionError {
    #[error("malformed {modality} reading: {reason}")]
    MalformedReading { modality: Modality, reason: String },

    #[error("unknown modality: {0}")]
    UnknownModality(String),

    #[error("label count {labels} does not match record count {records}")]
    SizeMismatch { records: usize, labels: usize },

    #[error("classifier failure: {0}")]
    ClassifierFailure(String),
}

pub type Result<T> = std::result::Result<T, FusionError>;
