//! Checkpoint module for cross-run progress
//!
//! The checkpoint is a single offset: the index of the next search record
//! to examine. It is read once when a run starts and written only after the
//! run's batch has been published.

mod file;

pub use file::FileCheckpointStore;

use crate::HarvestError;

/// Persistent holder of the next offset to harvest
///
/// No concurrent callers are assumed: exactly one run touches the store at
/// a time.
pub trait CheckpointStore: Send {
    /// Returns the stored offset, or 0 when none exists or it is unreadable
    fn load(&self) -> u64;

    /// Durably replaces the stored offset
    fn save(&mut self, offset: u64) -> Result<(), HarvestError>;
}
