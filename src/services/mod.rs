//! Services - the fusion core
//!
//! - `store` - readings of the open window (append / snapshot-and-reset)
//! - `window` - window controller and its open/closed guard
//! - `aggregator` - per-modality window summaries
//! - `join` - per-person merge of the summaries
//! - `features` - feature columns, matrix building and label application
//! - `classifier` - classifier seam (logistic, HTTP)
//! - `pipeline` - aggregate → join → classify → publish for one window

pub mod aggregator;
pub mod classifier;
pub mod features;
pub mod join;
pub mod pipeline;
pub mod store;
pub mod window;

pub use classifier::Classifier;
pub use features::ModalityColumns;
pub use pipeline::{ClosedWindow, FusionOutcome, FusionPipeline};
pub use store::{SensorReadingStore, WindowSnapshot};
pub use window::{create_window_controller, WindowController, WindowGuard};
