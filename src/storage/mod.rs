//! Storage abstractions for targets, observations and archive records.
//!
//! ## Tables
//!
//! ```text
//! {root}/
//! ├── targets.json          # Monitored targets (managed externally)
//! ├── observations.json     # Append-mostly history, pruned by compaction
//! ├── archives.json         # One archive record per target (upserted)
//! └── user_agents.json      # User-Agent pool (read-only lookup)
//! ```

pub mod local;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ArchiveRecord, NewObservation, Observation, Target};

// Re-export for convenience
pub use local::LocalStore;

/// Trait for persistent store backends.
///
/// Every write is its own atomic unit.
#[async_trait]
pub trait Store: Send + Sync {
    /// All monitored targets, ordered by id.
    async fn list_targets(&self) -> Result<Vec<Target>>;

    /// Register or replace a target.
    async fn insert_target(&self, target: Target) -> Result<()>;

    /// The most recently inserted observation of a target.
    async fn get_latest_observation(&self, target_id: i64) -> Result<Option<Observation>>;

    /// Append an observation and return it with its sequence id.
    async fn insert_observation(&self, observation: NewObservation) -> Result<Observation>;

    /// Observation history of a target, oldest first.
    async fn list_observations(&self, target_id: i64) -> Result<Vec<Observation>>;

    /// Delete later duplicates of each fingerprint, for one target or all.
    ///
    /// Returns the number of rows removed.
    async fn delete_duplicate_observations(&self, target_id: Option<i64>) -> Result<usize>;

    /// Insert or overwrite the archive record of a target.
    async fn upsert_archive_record(&self, target_id: i64, archive_url: &str) -> Result<ArchiveRecord>;

    /// Current archive record of a target.
    async fn get_archive_record(&self, target_id: i64) -> Result<Option<ArchiveRecord>>;

    /// A random entry of the User-Agent pool, if the pool is not empty.
    async fn pick_random_user_agent(&self) -> Result<Option<String>>;
}
