// src/pipeline/cycle.rs

//! One monitoring pass over every registered target.

use chrono::Utc;
use futures::stream::{self, StreamExt};

use crate::error::Result;
use crate::models::{Config, Target};
use crate::pipeline::compact::ResultCompactor;
use crate::pipeline::detect::{ArchiveQueue, ChangeDetector, Detection, DetectionState};
use crate::pipeline::fingerprint::Fingerprint;
use crate::services::ContentFetcher;
use crate::storage::Store;

/// A target whose archive was requested during the cycle.
#[derive(Debug, Clone)]
pub struct ChangedTarget {
    pub target_id: i64,
    pub url: String,
    pub group_key: String,
    pub title: Option<String>,
    /// True when the target had no history before this cycle
    pub first_seen: bool,
}

/// A target that could not be evaluated.
#[derive(Debug, Clone)]
pub struct TargetFailure {
    pub target_id: i64,
    pub url: String,
    pub error: String,
}

/// Outcome of one cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub processed: usize,
    pub changed: Vec<ChangedTarget>,
    pub unchanged: usize,
    pub failures: Vec<TargetFailure>,
    /// Observation rows removed by the closing compaction
    pub compacted: usize,
}

impl CycleReport {
    fn record(&mut self, target: &Target, outcome: Result<Detection>) {
        self.processed += 1;
        match outcome {
            Ok(detection) => match detection.state {
                DetectionState::Unchanged => self.unchanged += 1,
                state => self.changed.push(ChangedTarget {
                    target_id: target.id,
                    url: target.url.clone(),
                    group_key: target.group_key.clone(),
                    title: target.title.clone(),
                    first_seen: state == DetectionState::NoHistory,
                }),
            },
            Err(e) => {
                log::warn!("Failed to evaluate {}: {}", target.label(), e);
                self.failures.push(TargetFailure {
                    target_id: target.id,
                    url: target.url.clone(),
                    error: e.to_string(),
                });
            }
        }
    }
}

/// Evaluate every target once, then compact the history.
///
/// A failure on one target is recorded in the report and never stops the
/// others. Only a failure to list the targets aborts the cycle.
pub async fn run_cycle(
    config: &Config,
    store: &dyn Store,
    fetcher: &dyn ContentFetcher,
    queue: &dyn ArchiveQueue,
) -> Result<CycleReport> {
    let targets = store.list_targets().await?;
    log::info!("Evaluating {} targets", targets.len());

    let user_agent = match store.pick_random_user_agent().await {
        Ok(Some(agent)) => agent,
        Ok(None) => config.crawler.user_agent.clone(),
        Err(e) => {
            log::warn!("User-Agent pool unavailable, using default: {}", e);
            config.crawler.user_agent.clone()
        }
    };

    let detector = ChangeDetector::new(store, queue);
    let concurrency = config.crawler.max_concurrent.max(1);

    let outcomes: Vec<(Target, Result<Detection>)> = stream::iter(targets)
        .map(|target| {
            let detector = &detector;
            let user_agent = user_agent.as_str();
            async move {
                let outcome = evaluate_target(detector, fetcher, &target, user_agent).await;
                (target, outcome)
            }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    let mut report = CycleReport::default();
    for (target, outcome) in outcomes {
        report.record(&target, outcome);
    }

    report.compacted = match ResultCompactor::new(store).compact(None).await {
        Ok(removed) => removed,
        Err(e) => {
            log::warn!("History compaction failed: {}", e);
            0
        }
    };

    Ok(report)
}

async fn evaluate_target(
    detector: &ChangeDetector<'_>,
    fetcher: &dyn ContentFetcher,
    target: &Target,
    user_agent: &str,
) -> Result<Detection> {
    let content = fetcher.fetch_and_extract(target, user_agent).await?;
    let fingerprint = Fingerprint::compute(target.mode, &content)?;
    detector.evaluate(target, fingerprint, Utc::now()).await
}
