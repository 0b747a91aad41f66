// ABOUTME: Per-environment deployment records and their persistence.
// ABOUTME: JSON files under the state directory, or an in-memory map for tests and dry runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::types::{EnvironmentName, ImageRef};

/// What is running in an environment and what ran before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub environment: EnvironmentName,
    pub current: Option<ImageRef>,
    pub previous: Option<ImageRef>,
    /// Set between snapshot and the end of a production promotion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingPromotion>,
    pub updated_at: DateTime<Utc>,
}

/// A promotion that captured a snapshot and has not finished yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPromotion {
    pub candidate: ImageRef,
    /// Snapshot taken before the candidate replaced anything.
    pub previous: Option<ImageRef>,
    pub started_at: DateTime<Utc>,
}

impl DeploymentRecord {
    pub fn new(environment: EnvironmentName) -> Self {
        Self {
            environment,
            current: None,
            previous: None,
            pending: None,
            updated_at: Utc::now(),
        }
    }

    /// Image a manual rollback should restore.
    ///
    /// An interrupted promotion wins: its snapshot is what ran before the
    /// candidate touched the environment.
    pub fn rollback_target(&self) -> Option<&ImageRef> {
        match &self.pending {
            Some(pending) => pending.previous.as_ref(),
            None => self.previous.as_ref(),
        }
    }

    /// What a manual rollback has to do, or `None` when there is nothing to undo.
    pub fn rollback_plan(&self) -> Option<RollbackPlan<'_>> {
        match (&self.pending, &self.previous) {
            (Some(pending), _) => Some(match &pending.previous {
                Some(image) => RollbackPlan::Restore(image),
                None => RollbackPlan::Clear,
            }),
            (None, Some(image)) => Some(RollbackPlan::Restore(image)),
            (None, None) => None,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Manual rollback action derived from a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackPlan<'a> {
    /// Put this image back.
    Restore(&'a ImageRef),
    /// An interrupted promotion had nothing to replace: remove the candidate
    /// and leave the environment empty.
    Clear,
}

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("failed to access deployment record {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("deployment record {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Storage for deployment records, one per environment.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn load(&self, env: &EnvironmentName) -> Result<Option<DeploymentRecord>, RecordError>;

    async fn save(&self, record: &DeploymentRecord) -> Result<(), RecordError>;

    /// Load the record, or a fresh empty one if none exists.
    async fn load_or_new(&self, env: &EnvironmentName) -> Result<DeploymentRecord, RecordError> {
        Ok(self
            .load(env)
            .await?
            .unwrap_or_else(|| DeploymentRecord::new(env.clone())))
    }
}

/// One `<environment>.json` per environment in a directory.
#[derive(Debug, Clone)]
pub struct FileRecordStore {
    dir: PathBuf,
}

impl FileRecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store for one application under a state directory.
    pub fn for_app(state_dir: &Path, app: &str) -> Self {
        Self::new(state_dir.join(app))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, env: &EnvironmentName) -> PathBuf {
        self.dir.join(format!("{}.json", env))
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn load(&self, env: &EnvironmentName) -> Result<Option<DeploymentRecord>, RecordError> {
        let path = self.path(env);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(RecordError::Io { path, source }),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| RecordError::Corrupt { path, source })
    }

    async fn save(&self, record: &DeploymentRecord) -> Result<(), RecordError> {
        let path = self.path(&record.environment);
        let io_err = |source| RecordError::Io {
            path: path.clone(),
            source,
        };

        tokio::fs::create_dir_all(&self.dir).await.map_err(io_err)?;

        let json = serde_json::to_string_pretty(record).map_err(|source| RecordError::Corrupt {
            path: path.clone(),
            source,
        })?;

        // Write-then-rename so a crash never leaves a truncated record.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &path).await.map_err(io_err)?;

        tracing::debug!(path = %path.display(), "saved deployment record");
        Ok(())
    }
}

/// Records kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<EnvironmentName, DeploymentRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn load(&self, env: &EnvironmentName) -> Result<Option<DeploymentRecord>, RecordError> {
        Ok(self.records.lock().get(env).cloned())
    }

    async fn save(&self, record: &DeploymentRecord) -> Result<(), RecordError> {
        self.records
            .lock()
            .insert(record.environment.clone(), record.clone());
        Ok(())
    }
}
