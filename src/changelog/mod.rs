//! Snapshot and change-log readers
//!
//! The pipeline consumes collection output through two seams: a snapshot
//! reader (the set of entity records of one type as of a point in time, and
//! the previous known state) and a change-log reader (ordered change events
//! strictly after a watermark). The shipped implementations are backed by
//! append-only JSON-Lines files, one JSON object per line — the same flat
//! format the collectors write.

use crate::diff::ChangeEvent;
use crate::model::EntityRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Errors from snapshot/change-log storage
#[derive(Debug, Error)]
pub enum ChangeLogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed record on line {line}: {source}")]
    Parse {
        line: usize,
        source: serde_json::Error,
    },

    #[error("No snapshot found for entity type {0}")]
    NoSnapshot(String),
}

pub type ChangeLogResult<T> = Result<T, ChangeLogError>;

/// Source of collected snapshots.
pub trait SnapshotReader: Send + Sync {
    /// The full snapshot of one entity type as of a point in time (the
    /// latest snapshot at or before `as_of`)
    fn read_snapshot(
        &self,
        entity_type: &str,
        as_of: DateTime<Utc>,
    ) -> ChangeLogResult<Vec<EntityRecord>>;

    /// The previous known state of one entity type, keyed by object id.
    /// Empty on cold start.
    fn read_previous_state(
        &self,
        entity_type: &str,
    ) -> ChangeLogResult<FxHashMap<String, EntityRecord>>;
}

/// Ordered change-event source for the projector.
#[async_trait]
pub trait ChangeLogReader: Send + Sync {
    /// Read one page of change events strictly after `watermark`, ordered by
    /// (changeTimestamp, sequence) ascending.
    ///
    /// A page holds at least `page_size` events when more are available, but
    /// never splits a timestamp across pages: all events sharing the last
    /// timestamp of the page are included with it. A page shorter than
    /// `page_size` signals end-of-log.
    async fn read_changes_since(
        &self,
        watermark: Option<DateTime<Utc>>,
        page_size: usize,
    ) -> ChangeLogResult<Vec<ChangeEvent>>;
}

const SNAPSHOT_TS_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";

/// Directory-backed snapshot store: one subdirectory per entity type, one
/// JSON-Lines file per collection run, named by collection timestamp.
#[derive(Debug, Clone)]
pub struct JsonlSnapshotStore {
    root: PathBuf,
}

impl JsonlSnapshotStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        JsonlSnapshotStore {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Persist one collection run. Snapshots are immutable once written.
    pub fn write_snapshot(
        &self,
        entity_type: &str,
        timestamp: DateTime<Utc>,
        records: &[EntityRecord],
    ) -> ChangeLogResult<()> {
        let dir = self.root.join(entity_type);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.jsonl", timestamp.format(SNAPSHOT_TS_FORMAT)));
        let mut file = fs::File::create(path)?;
        for record in records {
            serde_json::to_writer(&mut file, record)
                .map_err(|source| ChangeLogError::Parse { line: 0, source })?;
            file.write_all(b"\n")?;
        }
        file.flush()?;
        Ok(())
    }

    /// Collection timestamps available for an entity type, ascending
    pub fn list_timestamps(&self, entity_type: &str) -> ChangeLogResult<Vec<DateTime<Utc>>> {
        let dir = self.root.join(entity_type);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut timestamps = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".jsonl")) else {
                continue;
            };
            match chrono::NaiveDateTime::parse_from_str(stem, SNAPSHOT_TS_FORMAT) {
                Ok(naive) => timestamps.push(naive.and_utc()),
                Err(_) => warn!(file = %name.to_string_lossy(), "ignoring non-snapshot file"),
            }
        }
        timestamps.sort_unstable();
        Ok(timestamps)
    }

    fn read_file(&self, entity_type: &str, timestamp: DateTime<Utc>) -> ChangeLogResult<Vec<EntityRecord>> {
        let path = self
            .root
            .join(entity_type)
            .join(format!("{}.jsonl", timestamp.format(SNAPSHOT_TS_FORMAT)));
        let reader = BufReader::new(fs::File::open(path)?);
        let mut records = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<EntityRecord>(&line) {
                Ok(record) => records.push(record),
                Err(source) => {
                    // One bad line never poisons the snapshot.
                    warn!(line = index + 1, error = %source, "skipping malformed snapshot record");
                }
            }
        }
        Ok(records)
    }
}

impl SnapshotReader for JsonlSnapshotStore {
    fn read_snapshot(
        &self,
        entity_type: &str,
        as_of: DateTime<Utc>,
    ) -> ChangeLogResult<Vec<EntityRecord>> {
        let timestamps = self.list_timestamps(entity_type)?;
        let Some(ts) = timestamps.into_iter().filter(|ts| *ts <= as_of).next_back() else {
            return Err(ChangeLogError::NoSnapshot(entity_type.to_string()));
        };
        self.read_file(entity_type, ts)
    }

    fn read_previous_state(
        &self,
        entity_type: &str,
    ) -> ChangeLogResult<FxHashMap<String, EntityRecord>> {
        let timestamps = self.list_timestamps(entity_type)?;
        let Some(ts) = timestamps.last().copied() else {
            return Ok(FxHashMap::default());
        };
        let records = self.read_file(entity_type, ts)?;
        Ok(records
            .into_iter()
            .map(|record| (record.object_id.clone(), record))
            .collect())
    }
}

/// File-backed change log: one append-only JSON-Lines file.
#[derive(Debug, Clone)]
pub struct JsonlChangeLog {
    path: PathBuf,
}

impl JsonlChangeLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        JsonlChangeLog {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Append events to the log
    pub fn append(&self, events: &[ChangeEvent]) -> ChangeLogResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        for event in events {
            serde_json::to_writer(&mut file, event)
                .map_err(|source| ChangeLogError::Parse { line: 0, source })?;
            file.write_all(b"\n")?;
        }
        file.flush()?;
        Ok(())
    }

    fn read_all(&self) -> ChangeLogResult<Vec<ChangeEvent>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(fs::File::open(&self.path)?);
        let mut events = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ChangeEvent>(&line) {
                Ok(event) => events.push(event),
                Err(source) => {
                    warn!(line = index + 1, error = %source, "skipping malformed change event");
                }
            }
        }
        Ok(events)
    }
}

#[async_trait]
impl ChangeLogReader for JsonlChangeLog {
    async fn read_changes_since(
        &self,
        watermark: Option<DateTime<Utc>>,
        page_size: usize,
    ) -> ChangeLogResult<Vec<ChangeEvent>> {
        let mut events = self.read_all()?;
        if let Some(watermark) = watermark {
            events.retain(|event| event.change_timestamp > watermark);
        }
        events.sort_by(|a, b| {
            (a.change_timestamp, a.sequence).cmp(&(b.change_timestamp, b.sequence))
        });
        if events.len() > page_size {
            // Extend the page so a timestamp never splits across pages;
            // the watermark is timestamp-granular.
            let boundary = events[page_size - 1].change_timestamp;
            let cut = events[page_size..]
                .iter()
                .position(|event| event.change_timestamp > boundary)
                .map(|offset| page_size + offset)
                .unwrap_or(events.len());
            events.truncate(cut);
        }
        Ok(events)
    }
}
