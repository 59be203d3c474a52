//! Archive queue entries and persisted archive results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// A pending or in-flight request to archive one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRequest {
    pub target_id: i64,
    pub url: String,
    /// Failed attempts so far
    pub attempt: u32,
    pub enqueued_at: Instant,
}

impl ArchiveRequest {
    pub fn new(target_id: i64, url: impl Into<String>, enqueued_at: Instant) -> Self {
        Self {
            target_id,
            url: url.into(),
            attempt: 0,
            enqueued_at,
        }
    }
}

/// Outcome of the latest successful archive of a target.
///
/// There is at most one record per target; a new success replaces it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArchiveRecord {
    pub target_id: i64,
    pub archive_url: String,
    pub created_at: DateTime<Utc>,
}
