//! Outcome store: where terminal results of acquisition requests go.
//!
//! Persistent storage belongs to the embedding application; the pipeline
//! only needs [`OutcomeStore`]. Two implementations ship here:
//! [`MemoryStore`] for tests and ephemeral runs, and [`JsonlStore`], an
//! append-only JSON-lines ledger with size-based rotation.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;

use crate::types::{ArchiveError, ArchiveResult, ExtractedRecord, FailureRecord};

/// Maximum ledger size before rotation (50 MB).
const MAX_LEDGER_SIZE: u64 = 50 * 1024 * 1024;

/// Maximum number of rotated ledger files to keep.
const MAX_ROTATIONS: u32 = 5;

/// Receives exactly one terminal outcome per acquisition request.
#[async_trait]
pub trait OutcomeStore: Send + Sync {
    async fn record_success(&self, record: &ExtractedRecord) -> ArchiveResult<()>;

    async fn record_failure(&self, failure: &FailureRecord) -> ArchiveResult<()>;
}

/// Keeps outcomes in memory.
#[derive(Default)]
pub struct MemoryStore {
    successes: Mutex<Vec<ExtractedRecord>>,
    failures: Mutex<Vec<FailureRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn successes(&self) -> Vec<ExtractedRecord> {
        self.successes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn failures(&self) -> Vec<FailureRecord> {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl OutcomeStore for MemoryStore {
    async fn record_success(&self, record: &ExtractedRecord) -> ArchiveResult<()> {
        self.successes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
        Ok(())
    }

    async fn record_failure(&self, failure: &FailureRecord) -> ArchiveResult<()> {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(failure.clone());
        Ok(())
    }
}

/// A single ledger line.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
enum LedgerEntry<'a> {
    Succeeded {
        recorded_at: String,
        record: &'a ExtractedRecord,
    },
    Failed {
        recorded_at: String,
        failure: &'a FailureRecord,
    },
}

struct LedgerFile {
    file: File,
    /// Approximate current size (re-read on open).
    current_size: u64,
}

/// Append-only JSONL ledger with automatic rotation.
pub struct JsonlStore {
    path: PathBuf,
    max_size: u64,
    inner: Mutex<LedgerFile>,
}

impl JsonlStore {
    /// Open or create the ledger file.
    pub fn open(path: impl AsRef<Path>) -> ArchiveResult<Self> {
        Self::with_max_size(path, MAX_LEDGER_SIZE)
    }

    pub fn with_max_size(path: impl AsRef<Path>, max_size: u64) -> ArchiveResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| io_error(&path, e))?;
            }
        }
        let file = open_append(&path)?;
        let current_size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            path,
            max_size,
            inner: Mutex::new(LedgerFile { file, current_size }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, entry: &LedgerEntry<'_>) -> ArchiveResult<()> {
        let json = serde_json::to_string(entry)
            .map_err(|e| ArchiveError::Internal(format!("ledger serialization: {e}")))?;

        let mut ledger = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if ledger.current_size >= self.max_size {
            self.rotate(&mut ledger)?;
        }
        writeln!(ledger.file, "{json}").map_err(|e| io_error(&self.path, e))?;
        ledger.current_size += json.len() as u64 + 1;
        Ok(())
    }

    /// Rotate: ledger.jsonl.4 → .5 (dropping the old .5), …, ledger.jsonl → .1.
    fn rotate(&self, ledger: &mut LedgerFile) -> ArchiveResult<()> {
        ledger.file.flush().map_err(|e| io_error(&self.path, e))?;

        let oldest = rotation_path(&self.path, MAX_ROTATIONS);
        if oldest.exists() {
            let _ = std::fs::remove_file(&oldest);
        }
        for i in (1..MAX_ROTATIONS).rev() {
            let from = rotation_path(&self.path, i);
            if from.exists() {
                let _ = std::fs::rename(&from, rotation_path(&self.path, i + 1));
            }
        }
        std::fs::rename(&self.path, rotation_path(&self.path, 1))
            .map_err(|e| io_error(&self.path, e))?;

        ledger.file = open_append(&self.path)?;
        ledger.current_size = 0;
        tracing::info!(path = %self.path.display(), "rotated outcome ledger");
        Ok(())
    }
}

#[async_trait]
impl OutcomeStore for JsonlStore {
    async fn record_success(&self, record: &ExtractedRecord) -> ArchiveResult<()> {
        self.append(&LedgerEntry::Succeeded {
            recorded_at: Utc::now().to_rfc3339(),
            record,
        })
    }

    async fn record_failure(&self, failure: &FailureRecord) -> ArchiveResult<()> {
        self.append(&LedgerEntry::Failed {
            recorded_at: Utc::now().to_rfc3339(),
            failure,
        })
    }
}

fn open_append(path: &Path) -> ArchiveResult<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| io_error(path, e))
}

fn io_error(path: &Path, e: std::io::Error) -> ArchiveError {
    ArchiveError::Internal(format!("ledger {}: {e}", path.display()))
}

/// Build path for a rotated ledger file: `outcomes.jsonl.1`, `.2`, etc.
fn rotation_path(base: &Path, index: u32) -> PathBuf {
    let name = format!(
        "{}.{index}",
        base.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("outcomes.jsonl")
    );
    base.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ErrorKind, Stage};

    fn failure(target: &str) -> FailureRecord {
        FailureRecord {
            target: target.to_string(),
            archive_id: None,
            kind: ErrorKind::UpstreamUnavailable,
            stage: Some(Stage::Submitting),
            attempts: 3,
            error_message: "no redirect after submission".into(),
            failed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_memory_store_records() {
        let store = MemoryStore::new();
        store.record_failure(&failure("https://x.com/a")).await.unwrap();
        assert_eq!(store.failures().len(), 1);
        assert!(store.successes().is_empty());
    }

    #[tokio::test]
    async fn test_jsonl_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger").join("outcomes.jsonl");
        let store = JsonlStore::open(&path).unwrap();

        store.record_failure(&failure("https://x.com/a")).await.unwrap();
        store.record_failure(&failure("https://x.com/b")).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["outcome"], "failed");
        assert_eq!(lines[0]["failure"]["kind"], "upstream_unavailable");
        assert_eq!(lines[1]["failure"]["target"], "https://x.com/b");
    }

    #[tokio::test]
    async fn test_jsonl_rotates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outcomes.jsonl");
        let store = JsonlStore::with_max_size(&path, 10).unwrap();

        store.record_failure(&failure("https://x.com/a")).await.unwrap();
        store.record_failure(&failure("https://x.com/b")).await.unwrap();

        let rotated = std::fs::read_to_string(rotation_path(&path, 1)).unwrap();
        assert!(rotated.contains("https://x.com/a"));
        let current = std::fs::read_to_string(&path).unwrap();
        assert!(current.contains("https://x.com/b"));
        assert_eq!(current.lines().count(), 1);
    }
}
