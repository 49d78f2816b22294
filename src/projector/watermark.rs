//! Persisted watermark with optimistic concurrency
//!
//! The watermark is the single piece of shared mutable state across projector
//! runs. Writes are conditional on the version read: two concurrent runs
//! advancing from the same base watermark cannot both succeed, so a batch can
//! never be silently dropped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from watermark storage
#[derive(Debug, Error)]
pub enum WatermarkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed watermark document: {0}")]
    Parse(#[from] serde_json::Error),

    /// Conditional-write rejection: another run advanced the watermark first.
    /// Abort, do not retry blindly — the other run is making progress.
    #[error("Watermark version conflict: expected {expected}, found {found}")]
    Conflict { expected: u64, found: u64 },
}

pub type WatermarkResult<T> = Result<T, WatermarkError>;

/// The persisted watermark document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatermarkState {
    /// Timestamp of the last fully applied batch
    pub last_sync_timestamp: DateTime<Utc>,
    /// Monotonic version for conditional writes; first write produces 1
    pub version: u64,
}

/// Watermark storage with read / conditional-write semantics.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Current watermark, or None before the first projector run
    async fn read(&self) -> WatermarkResult<Option<WatermarkState>>;

    /// Advance the watermark. Succeeds only when the stored version still
    /// equals `expected_version` (0 when no watermark exists yet); returns
    /// the new state on success, `Conflict` otherwise.
    async fn write(
        &self,
        timestamp: DateTime<Utc>,
        expected_version: u64,
    ) -> WatermarkResult<WatermarkState>;
}

/// File-backed watermark store. The version counter in the document stands in
/// for the blob lease/etag the production store uses.
#[derive(Debug, Clone)]
pub struct FileWatermarkStore {
    path: PathBuf,
}

impl FileWatermarkStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        FileWatermarkStore {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn read_sync(&self) -> WatermarkResult<Option<WatermarkState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&text)?))
    }
}

#[async_trait]
impl WatermarkStore for FileWatermarkStore {
    async fn read(&self) -> WatermarkResult<Option<WatermarkState>> {
        self.read_sync()
    }

    async fn write(
        &self,
        timestamp: DateTime<Utc>,
        expected_version: u64,
    ) -> WatermarkResult<WatermarkState> {
        let current_version = self.read_sync()?.map(|s| s.version).unwrap_or(0);
        if current_version != expected_version {
            return Err(WatermarkError::Conflict {
                expected: expected_version,
                found: current_version,
            });
        }
        let state = WatermarkState {
            last_sync_timestamp: timestamp,
            version: current_version + 1,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Write-then-rename keeps readers from seeing a torn document.
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(&state)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 14, minute, 0).unwrap()
    }

    #[tokio::test]
    async fn test_absent_watermark_reads_none() {
        let dir = TempDir::new().unwrap();
        let store = FileWatermarkStore::new(dir.path().join("watermark.json"));
        assert_eq!(store.read().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_first_write_and_read_back() {
        let dir = TempDir::new().unwrap();
        let store = FileWatermarkStore::new(dir.path().join("watermark.json"));

        let state = store.write(ts(5), 0).await.unwrap();
        assert_eq!(state.version, 1);
        assert_eq!(state.last_sync_timestamp, ts(5));

        let back = store.read().await.unwrap().unwrap();
        assert_eq!(back, state);
    }

    #[tokio::test]
    async fn test_conditional_write_conflict() {
        let dir = TempDir::new().unwrap();
        let store = FileWatermarkStore::new(dir.path().join("watermark.json"));
        store.write(ts(5), 0).await.unwrap();

        // A writer still holding the pre-write version must be rejected.
        let result = store.write(ts(10), 0).await;
        assert!(matches!(
            result,
            Err(WatermarkError::Conflict {
                expected: 0,
                found: 1
            })
        ));
    }

    #[tokio::test]
    async fn test_sequential_advances() {
        let dir = TempDir::new().unwrap();
        let store = FileWatermarkStore::new(dir.path().join("watermark.json"));

        let s1 = store.write(ts(1), 0).await.unwrap();
        let s2 = store.write(ts(2), s1.version).await.unwrap();
        let s3 = store.write(ts(3), s2.version).await.unwrap();
        assert_eq!(s3.version, 3);
        assert_eq!(s3.last_sync_timestamp, ts(3));
    }
}
