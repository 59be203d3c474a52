//! Observation rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One stored fetch result for a target.
///
/// Rows are immutable. The current observation of a target is the row with
/// the highest `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Observation {
    /// Monotonic sequence id assigned by the store
    pub id: u64,

    pub target_id: i64,

    /// Content hash or normalized Last-Modified value; `None` when unknown
    #[serde(default)]
    pub fingerprint: Option<String>,

    pub observed_at: DateTime<Utc>,

    /// Parsed Last-Modified value (last-modified mode only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,

    /// Literal Last-Modified header (last-modified mode only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_signal: Option<String>,
}

/// An observation that has not been assigned a sequence id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewObservation {
    pub target_id: i64,
    pub fingerprint: Option<String>,
    pub observed_at: DateTime<Utc>,
    pub modified_at: Option<DateTime<Utc>>,
    pub raw_signal: Option<String>,
}

impl NewObservation {
    /// Attach the sequence id chosen by the store.
    pub fn with_id(self, id: u64) -> Observation {
        Observation {
            id,
            target_id: self.target_id,
            fingerprint: self.fingerprint,
            observed_at: self.observed_at,
            modified_at: self.modified_at,
            raw_signal: self.raw_signal,
        }
    }
}
