//! Append-only persistence for [`AnalysisRecord`]s.
//!
//! A store only ever receives inserts. Nothing in this crate reads, updates
//! or deletes records once written.

use crate::output::AnalysisRecord;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to serialise record: {0}")]
    Serialise(#[from] serde_json::Error),
    #[error("failed to write to store '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Document-store collaborator: one insert per request.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// Persist `record` and return its id.
    async fn insert(&self, record: &AnalysisRecord) -> Result<String, StoreError>;
}

/// Appends one JSON document per line to a file.
#[derive(Debug)]
pub struct JsonlStore {
    path: PathBuf,
    // Serialises writers so concurrent requests never interleave lines.
    write_lock: Mutex<()>,
}

impl JsonlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl AnalysisStore for JsonlStore {
    async fn insert(&self, record: &AnalysisRecord) -> Result<String, StoreError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_err(e))?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_err(e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| self.io_err(e))?;
        file.flush().await.map_err(|e| self.io_err(e))?;

        debug!("Stored record {} in {}", record.id, self.path.display());
        Ok(record.id.to_string())
    }
}

/// Keeps records in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<AnalysisRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything inserted so far, in insertion order.
    pub async fn records(&self) -> Vec<AnalysisRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl AnalysisStore for MemoryStore {
    async fn insert(&self, record: &AnalysisRecord) -> Result<String, StoreError> {
        self.records.lock().await.push(record.clone());
        Ok(record.id.to_string())
    }
}
