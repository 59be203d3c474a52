//! Local filesystem store.
//!
//! Keeps every table in memory behind one async lock and mirrors each table
//! to a JSON file under the storage root. A write builds the new table,
//! writes it to a temp file, renames it into place and only then swaps it in
//! memory, so a failed write leaves both copies untouched.
//!
//! Without a root the store lives purely in memory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{ArchiveRecord, NewObservation, Observation, Target};
use crate::pipeline::compact::redundant_ids;
use crate::storage::Store;

const TARGETS: &str = "targets.json";
const OBSERVATIONS: &str = "observations.json";
const ARCHIVES: &str = "archives.json";
const USER_AGENTS: &str = "user_agents.json";

/// Observation rows plus the sequence counter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ObservationTable {
    next_id: u64,
    rows: Vec<Observation>,
}

#[derive(Debug, Default)]
struct Tables {
    targets: Vec<Target>,
    observations: ObservationTable,
    archives: BTreeMap<i64, ArchiveRecord>,
    user_agents: Vec<String>,
}

/// JSON-file backed store.
pub struct LocalStore {
    root: Option<PathBuf>,
    tables: Mutex<Tables>,
}

impl LocalStore {
    /// Create an empty in-memory store.
    pub fn in_memory() -> Self {
        Self {
            root: None,
            tables: Mutex::new(Tables::default()),
        }
    }

    /// Create an empty store that writes to `root`, ignoring existing files.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            tables: Mutex::new(Tables::default()),
        }
    }

    /// Open the store at `root`, loading any tables already there.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let mut targets: Vec<Target> = read_json(&root, TARGETS).await?.unwrap_or_default();
        targets.sort_by_key(|t| t.id);
        let mut observations: ObservationTable =
            read_json(&root, OBSERVATIONS).await?.unwrap_or_default();
        observations.rows.sort_by_key(|o| o.id);
        let max_id = observations.rows.last().map_or(0, |o| o.id);
        observations.next_id = observations.next_id.max(max_id + 1);
        let archives: Vec<ArchiveRecord> = read_json(&root, ARCHIVES).await?.unwrap_or_default();
        let user_agents: Vec<String> = read_json(&root, USER_AGENTS).await?.unwrap_or_default();

        log::debug!(
            "Opened store at {}: {} targets, {} observations, {} archive records",
            root.display(),
            targets.len(),
            observations.rows.len(),
            archives.len()
        );

        Ok(Self {
            root: Some(root),
            tables: Mutex::new(Tables {
                targets,
                observations,
                archives: archives.into_iter().map(|a| (a.target_id, a)).collect(),
                user_agents,
            }),
        })
    }

    /// Add an entry to the User-Agent pool. Duplicates are ignored.
    pub async fn add_user_agent(&self, agent: &str) -> Result<bool> {
        let agent = agent.trim();
        if agent.is_empty() {
            return Err(AppError::validation("user agent is empty"));
        }
        let mut tables = self.tables.lock().await;
        if tables.user_agents.iter().any(|a| a == agent) {
            return Ok(false);
        }
        let mut pool = tables.user_agents.clone();
        pool.push(agent.to_string());
        self.persist(USER_AGENTS, &pool).await?;
        tables.user_agents = pool;
        Ok(true)
    }

    /// Write one table, mapping failures to persistence errors.
    async fn persist<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let Some(root) = &self.root else {
            return Ok(());
        };
        write_json(root, key, value)
            .await
            .map_err(|e| AppError::persistence(format!("writing {key}: {e}")))
    }
}

#[async_trait]
impl Store for LocalStore {
    async fn list_targets(&self) -> Result<Vec<Target>> {
        Ok(self.tables.lock().await.targets.clone())
    }

    async fn insert_target(&self, target: Target) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let mut targets = tables.targets.clone();
        match targets.iter_mut().find(|t| t.id == target.id) {
            Some(existing) => *existing = target,
            None => targets.push(target),
        }
        targets.sort_by_key(|t| t.id);
        self.persist(TARGETS, &targets).await?;
        tables.targets = targets;
        Ok(())
    }

    async fn get_latest_observation(&self, target_id: i64) -> Result<Option<Observation>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .observations
            .rows
            .iter()
            .filter(|o| o.target_id == target_id)
            .max_by_key(|o| o.id)
            .cloned())
    }

    async fn insert_observation(&self, observation: NewObservation) -> Result<Observation> {
        let mut tables = self.tables.lock().await;
        let mut table = tables.observations.clone();
        let id = table.next_id.max(1);
        let row = observation.with_id(id);
        table.rows.push(row.clone());
        table.next_id = id + 1;
        self.persist(OBSERVATIONS, &table).await?;
        tables.observations = table;
        Ok(row)
    }

    async fn list_observations(&self, target_id: i64) -> Result<Vec<Observation>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .observations
            .rows
            .iter()
            .filter(|o| o.target_id == target_id)
            .cloned()
            .collect())
    }

    async fn delete_duplicate_observations(&self, target_id: Option<i64>) -> Result<usize> {
        let mut tables = self.tables.lock().await;
        let scope: Vec<Observation> = tables
            .observations
            .rows
            .iter()
            .filter(|o| target_id.is_none_or(|id| o.target_id == id))
            .cloned()
            .collect();
        let redundant = redundant_ids(&scope);
        if redundant.is_empty() {
            return Ok(0);
        }

        let mut table = tables.observations.clone();
        let before = table.rows.len();
        table.rows.retain(|o| !redundant.contains(&o.id));
        let removed = before - table.rows.len();
        self.persist(OBSERVATIONS, &table).await?;
        tables.observations = table;
        Ok(removed)
    }

    async fn upsert_archive_record(&self, target_id: i64, archive_url: &str) -> Result<ArchiveRecord> {
        let mut tables = self.tables.lock().await;
        let record = ArchiveRecord {
            target_id,
            archive_url: archive_url.to_string(),
            created_at: Utc::now(),
        };
        let mut archives = tables.archives.clone();
        archives.insert(target_id, record.clone());
        let rows: Vec<&ArchiveRecord> = archives.values().collect();
        self.persist(ARCHIVES, &rows).await?;
        tables.archives = archives;
        Ok(record)
    }

    async fn get_archive_record(&self, target_id: i64) -> Result<Option<ArchiveRecord>> {
        Ok(self.tables.lock().await.archives.get(&target_id).cloned())
    }

    async fn pick_random_user_agent(&self) -> Result<Option<String>> {
        let tables = self.tables.lock().await;
        let picked = tables.user_agents.choose(&mut rand::thread_rng()).cloned();
        Ok(picked)
    }
}

/// Write bytes atomically (write to temp, then rename).
async fn write_bytes(root: &Path, key: &str, bytes: &[u8]) -> Result<()> {
    let path = root.join(key);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp, &path).await?;
    Ok(())
}

/// Write JSON data.
async fn write_json<T: Serialize + ?Sized>(root: &Path, key: &str, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_bytes(root, key, &bytes).await
}

/// Read JSON data, returning None if the file doesn't exist.
async fn read_json<T: DeserializeOwned>(root: &Path, key: &str) -> Result<Option<T>> {
    match tokio::fs::read(root.join(key)).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::Io(e)),
    }
}
