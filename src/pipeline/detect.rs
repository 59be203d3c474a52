//! Change detection for a single target.

use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};
use crate::models::{DetectionMode, Observation, Target};
use crate::pipeline::fingerprint::{Fingerprint, parse_stored_timestamp};
use crate::storage::Store;

/// Anything that accepts archive requests.
pub trait ArchiveQueue: Send + Sync {
    fn enqueue(&self, target_id: i64, url: &str);
}

/// Outcome of comparing a new fingerprint against the stored history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionState {
    /// First observation of the target
    NoHistory,
    Unchanged,
    Changed,
}

impl DetectionState {
    /// Changed and first-seen targets are archived.
    pub fn needs_archive(self) -> bool {
        matches!(self, DetectionState::NoHistory | DetectionState::Changed)
    }
}

/// Decide whether `new` differs from the latest stored observation.
pub fn decide(
    mode: DetectionMode,
    new: &Fingerprint,
    previous: Option<&Observation>,
) -> DetectionState {
    let Some(previous) = previous else {
        return DetectionState::NoHistory;
    };

    let changed = match mode {
        DetectionMode::ByLastModified => match (new.modified_at, previous_timestamp(previous)) {
            (Some(new_ts), Some(prev_ts)) => new_ts > prev_ts,
            _ => true,
        },
        DetectionMode::ByContentHash => match previous.fingerprint.as_deref() {
            Some(prev) if !prev.is_empty() => prev != new.value,
            _ => true,
        },
    };

    if changed {
        DetectionState::Changed
    } else {
        DetectionState::Unchanged
    }
}

/// Comparable Last-Modified time of a stored observation.
fn previous_timestamp(previous: &Observation) -> Option<DateTime<Utc>> {
    previous.modified_at.or_else(|| {
        previous
            .raw_signal
            .as_deref()
            .or(previous.fingerprint.as_deref())
            .and_then(parse_stored_timestamp)
    })
}

/// Result of one evaluation.
#[derive(Debug, Clone)]
pub struct Detection {
    pub state: DetectionState,
    /// The row written by this evaluation
    pub observation: Observation,
}

/// Compares, records and enqueues for one target at a time.
pub struct ChangeDetector<'a> {
    store: &'a dyn Store,
    queue: &'a dyn ArchiveQueue,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(store: &'a dyn Store, queue: &'a dyn ArchiveQueue) -> Self {
        Self { store, queue }
    }

    /// Evaluate a freshly computed fingerprint for `target`.
    ///
    /// Always writes one observation. Changed and first-seen targets are
    /// enqueued for archiving once the write has succeeded.
    pub async fn evaluate(
        &self,
        target: &Target,
        fingerprint: Fingerprint,
        observed_at: DateTime<Utc>,
    ) -> Result<Detection> {
        let previous = self
            .store
            .get_latest_observation(target.id)
            .await
            .map_err(into_persistence)?;

        let state = decide(target.mode, &fingerprint, previous.as_ref());

        let observation = self
            .store
            .insert_observation(fingerprint.into_observation(target.id, observed_at))
            .await
            .map_err(into_persistence)?;

        match state {
            DetectionState::NoHistory => log::info!("First observation: {}", target.label()),
            DetectionState::Changed => log::info!("Change detected: {}", target.label()),
            DetectionState::Unchanged => log::debug!("Unchanged: {}", target.label()),
        }

        if state.needs_archive() {
            self.queue.enqueue(target.id, &target.url);
        }

        Ok(Detection { state, observation })
    }
}

fn into_persistence(e: AppError) -> AppError {
    match e {
        AppError::Persistence(_) => e,
        other => AppError::persistence(other),
    }
}
