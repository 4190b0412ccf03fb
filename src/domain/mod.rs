//! Domain models - sensor readings, window summaries and fused records
//!
//! - `types` - Modality, PersonId, Timestamp and the raw reading variants
//! - `summary` - per-modality reductions of one window
//! - `record` - the fused per-person feature row

pub mod record;
pub mod summary;
pub mod types;

pub use record::MergedPersonRecord;
pub use summary::{CameraSummary, PresenceSummary, RfidSummary, WindowSummaries, WifiSummary};
pub use types::{Modality, PersonId, RawReading, Timestamp};
