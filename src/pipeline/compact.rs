//! Observation history compaction.
//!
//! For each target, only the earliest observation of every distinct
//! fingerprint is kept. The most recent row of a target survives unless the
//! row that would become the most recent carries the same fingerprint, so the
//! fingerprint the change detector compares against never moves.

use std::collections::{BTreeMap, HashSet};

use crate::error::Result;
use crate::models::Observation;
use crate::storage::Store;

/// Ids of the rows that compaction removes from `observations`.
///
/// Rows may belong to several targets and may be in any order. Rows without
/// a fingerprint are never treated as duplicates.
pub fn redundant_ids(observations: &[Observation]) -> HashSet<u64> {
    let mut by_target: BTreeMap<i64, Vec<&Observation>> = BTreeMap::new();
    for obs in observations {
        by_target.entry(obs.target_id).or_default().push(obs);
    }

    let mut redundant = HashSet::new();
    for (_, mut rows) in by_target {
        rows.sort_by_key(|o| o.id);

        let mut first_seen: HashSet<&str> = HashSet::new();
        let mut doomed = Vec::new();
        for row in &rows {
            if let Some(fp) = row.fingerprint.as_deref()
                && !first_seen.insert(fp)
            {
                doomed.push(row.id);
            }
        }

        if let Some(latest) = rows.last()
            && doomed.last() == Some(&latest.id)
        {
            let successor = rows.iter().rev().find(|o| !doomed.contains(&o.id));
            let keeps_fingerprint = successor.is_some_and(|o| o.fingerprint == latest.fingerprint);
            if !keeps_fingerprint {
                doomed.pop();
            }
        }

        redundant.extend(doomed);
    }
    redundant
}

/// Removes redundant observation history through a store.
pub struct ResultCompactor<'a> {
    store: &'a dyn Store,
}

impl<'a> ResultCompactor<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Compact one target, or every target when `target_id` is `None`.
    ///
    /// Returns the number of rows removed. Running it again right away
    /// removes nothing.
    pub async fn compact(&self, target_id: Option<i64>) -> Result<usize> {
        let removed = self.store.delete_duplicate_observations(target_id).await?;
        match target_id {
            Some(id) => log::info!(
                "Compaction: removed {} duplicate rows for target #{}",
                removed,
                id
            ),
            None => log::info!("Compaction: removed {} duplicate rows", removed),
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    use crate::models::NewObservation;
    use crate::storage::LocalStore;

    fn obs(id: u64, target_id: i64, fp: Option<&str>) -> Observation {
        Observation {
            id,
            target_id,
            fingerprint: fp.map(Into::into),
            observed_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            modified_at: None,
            raw_signal: None,
        }
    }

    fn sorted(ids: HashSet<u64>) -> Vec<u64> {
        let mut ids: Vec<u64> = ids.into_iter().collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_keeps_earliest_occurrence() {
        let rows = vec![
            obs(1, 1, Some("abc")),
            obs(2, 1, Some("abc")),
            obs(3, 1, Some("xyz")),
        ];
        assert_eq!(sorted(redundant_ids(&rows)), vec![2]);
    }

    #[test]
    fn test_distinct_history_untouched() {
        let rows = vec![obs(1, 1, Some("a")), obs(2, 1, Some("b")), obs(3, 1, Some("c"))];
        assert!(redundant_ids(&rows).is_empty());
    }

    #[test]
    fn test_unchanged_run_collapses_to_first() {
        let rows = vec![obs(1, 1, Some("a")), obs(2, 1, Some("a")), obs(3, 1, Some("a"))];
        assert_eq!(sorted(redundant_ids(&rows)), vec![2, 3]);
    }

    #[test]
    fn test_latest_protected_when_value_reverted() {
        // a -> b -> a: dropping row 3 would make "b" current
        let rows = vec![obs(1, 1, Some("a")), obs(2, 1, Some("b")), obs(3, 1, Some("a"))];
        assert!(redundant_ids(&rows).is_empty());

        let rows = vec![
            obs(1, 1, Some("a")),
            obs(2, 1, Some("b")),
            obs(3, 1, Some("a")),
            obs(4, 1, Some("a")),
        ];
        assert_eq!(sorted(redundant_ids(&rows)), vec![3]);
    }

    #[test]
    fn test_targets_are_independent() {
        let rows = vec![
            obs(1, 1, Some("same")),
            obs(2, 2, Some("same")),
            obs(3, 1, Some("other")),
            obs(4, 2, Some("other")),
        ];
        assert!(redundant_ids(&rows).is_empty());
    }

    #[test]
    fn test_absent_fingerprints_never_duplicates() {
        let rows = vec![obs(1, 1, None), obs(2, 1, None), obs(3, 1, Some("a"))];
        assert!(redundant_ids(&rows).is_empty());
    }

    #[test]
    fn test_unordered_input() {
        let rows = vec![obs(3, 1, Some("x")), obs(1, 1, Some("x")), obs(2, 1, Some("y"))];
        // Row 3 is current and reverting to "x" past "y" must be kept
        assert!(redundant_ids(&rows).is_empty());
    }

    #[tokio::test]
    async fn test_compact_is_idempotent() {
        let store = LocalStore::in_memory();
        for fp in ["a", "a", "b", "b", "c", "b", "b"] {
            store
                .insert_observation(NewObservation {
                    target_id: 7,
                    fingerprint: Some(fp.into()),
                    observed_at: Utc::now(),
                    modified_at: None,
                    raw_signal: None,
                })
                .await
                .unwrap();
        }

        let compactor = ResultCompactor::new(&store);
        let first = compactor.compact(Some(7)).await.unwrap();
        assert_eq!(first, 3);
        assert_eq!(compactor.compact(Some(7)).await.unwrap(), 0);
        assert_eq!(compactor.compact(None).await.unwrap(), 0);

        let remaining: Vec<_> = store
            .list_observations(7)
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.fingerprint.unwrap())
            .collect();
        assert_eq!(remaining, vec!["a", "b", "c", "b"]);

        let latest = store.get_latest_observation(7).await.unwrap().unwrap();
        assert_eq!(latest.fingerprint.as_deref(), Some("b"));
    }
}
