//! Graph projector
//!
//! Consumes the time-ordered change log in pages and applies each page to the
//! graph sink: all vertex changes first, then all edge changes, because an
//! edge referencing a not-yet-created vertex is a store-level integrity
//! violation. The two-phase split makes the ordering invariant structural
//! rather than something checked at runtime. Within a phase, concurrency is
//! per target identifier: writes to the same vertex or edge stay in log
//! order even when the page spans several emitter runs.
//!
//! After a page is fully applied the watermark advances to the page's maximum
//! change timestamp via conditional write, bounding reprocessing on crash to
//! one page. Sink operations are idempotent, so redelivery is safe.

pub mod watermark;

pub use watermark::{FileWatermarkStore, WatermarkError, WatermarkResult, WatermarkState, WatermarkStore};

use crate::changelog::{ChangeLogError, ChangeLogReader};
use crate::diff::{ChangeEvent, ChangeKind, ChangeTarget};
use crate::graph::{EdgeKind, GraphEdge, GraphSink, SinkError, Vertex};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Hard failures that end a run before the log is drained.
#[derive(Debug, Error)]
pub enum ProjectorError {
    #[error("Change log error: {0}")]
    ChangeLog(#[from] ChangeLogError),

    #[error("Watermark error: {0}")]
    Watermark(#[from] WatermarkError),
}

pub type ProjectorResult<T> = Result<T, ProjectorError>;

/// Tuning knobs for one projector run.
#[derive(Debug, Clone)]
pub struct ProjectorConfig {
    /// Change-log page size; a short page ends the run
    pub page_size: usize,
    /// Concurrent sink applies within one phase
    pub max_concurrency: usize,
    /// Retry attempts per change for transient sink failures
    pub retry_budget: u32,
    /// Base backoff delay, doubled per attempt
    pub retry_base_delay: Duration,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        ProjectorConfig {
            page_size: 500,
            max_concurrency: 8,
            retry_budget: 3,
            retry_base_delay: Duration::from_millis(50),
        }
    }
}

/// Structured result of one run. Partial success (some pages applied, one
/// failed) is reported as such, never masked.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub pages: u64,
    pub vertices_applied: u64,
    pub edges_applied: u64,
    pub deletes_applied: u64,
    /// Changes the sink rejected (malformed references etc.); non-fatal
    pub errors: u64,
    pub final_watermark: Option<DateTime<Utc>>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

enum Applied {
    VertexUpsert,
    EdgeUpsert,
    Delete,
}

enum ApplyFailure {
    /// Sink rejected the change; counted, run continues
    Rejected(String),
    /// Transient failures exhausted the retry budget; run aborts without
    /// advancing the watermark
    Exhausted(String),
}

/// Concurrency key of a change event: the sink identifier it writes to.
fn target_key(event: &ChangeEvent) -> String {
    match &event.target {
        ChangeTarget::Vertex { .. } => event.entity_id.clone(),
        ChangeTarget::Edge {
            source_id,
            target_id,
            edge_kind,
            ..
        } => format!("{}|{}|{}", source_id, target_id, edge_kind),
    }
}

/// Applies the change log to a graph sink, resuming from the persisted
/// watermark.
pub struct Projector<'a> {
    changelog: &'a dyn ChangeLogReader,
    sink: &'a dyn GraphSink,
    watermarks: &'a dyn WatermarkStore,
    config: ProjectorConfig,
}

impl<'a> Projector<'a> {
    pub fn new(
        changelog: &'a dyn ChangeLogReader,
        sink: &'a dyn GraphSink,
        watermarks: &'a dyn WatermarkStore,
        config: ProjectorConfig,
    ) -> Self {
        Projector {
            changelog,
            sink,
            watermarks,
            config,
        }
    }

    /// Run until the change log is drained or a hard error occurs.
    pub async fn run(&self) -> ProjectorResult<RunReport> {
        let never_cancelled = AtomicBool::new(false);
        self.run_with_cancel(&never_cancelled).await
    }

    /// Like [`run`](Self::run), but checks the flag between pages; a
    /// cancelled run stops cleanly with the watermark at the last fully
    /// applied page.
    pub async fn run_with_cancel(&self, cancel: &AtomicBool) -> ProjectorResult<RunReport> {
        let mut report = RunReport {
            success: true,
            ..RunReport::default()
        };

        let state = self.watermarks.read().await?;
        let mut version = state.map(|s| s.version).unwrap_or(0);
        let mut watermark = state.map(|s| s.last_sync_timestamp);
        report.final_watermark = watermark;

        loop {
            if cancel.load(Ordering::Relaxed) {
                info!("projector run cancelled between pages");
                break;
            }

            let page = self
                .changelog
                .read_changes_since(watermark, self.config.page_size)
                .await?;
            if page.is_empty() {
                break;
            }
            report.pages += 1;
            let page_len = page.len();
            let batch_max = page
                .iter()
                .map(|event| event.change_timestamp)
                .max()
                .unwrap_or_else(Utc::now);

            // Vertex phase strictly before edge phase.
            let (vertex_events, edge_events): (Vec<&ChangeEvent>, Vec<&ChangeEvent>) =
                page.iter().partition(|event| event.is_vertex());
            debug!(
                vertices = vertex_events.len(),
                edges = edge_events.len(),
                "applying page"
            );

            for phase in [vertex_events, edge_events] {
                // Writes to the same identifier must land in log order, so
                // concurrency is per identifier: groups run concurrently,
                // events within a group sequentially. The page is already
                // sorted by (timestamp, sequence) and grouping preserves it.
                let mut groups: IndexMap<String, Vec<&ChangeEvent>> = IndexMap::new();
                for event in phase {
                    groups.entry(target_key(event)).or_default().push(event);
                }
                let results: Vec<Result<Applied, ApplyFailure>> =
                    stream::iter(groups.into_values())
                        .map(|group| self.apply_group(group))
                        .buffer_unordered(self.config.max_concurrency)
                        .collect::<Vec<Vec<_>>>()
                        .await
                        .into_iter()
                        .flatten()
                        .collect();

                for result in results {
                    match result {
                        Ok(Applied::VertexUpsert) => report.vertices_applied += 1,
                        Ok(Applied::EdgeUpsert) => report.edges_applied += 1,
                        Ok(Applied::Delete) => report.deletes_applied += 1,
                        Err(ApplyFailure::Rejected(reason)) => {
                            warn!(%reason, "sink rejected change");
                            report.errors += 1;
                        }
                        Err(ApplyFailure::Exhausted(reason)) => {
                            // Watermark stays put; the next run re-delivers
                            // this page.
                            warn!(%reason, "retry budget exhausted, aborting run");
                            report.success = false;
                            report.failure = Some(reason);
                            return Ok(report);
                        }
                    }
                }
            }

            let new_state = self.watermarks.write(batch_max, version).await?;
            version = new_state.version;
            watermark = Some(batch_max);
            report.final_watermark = watermark;

            if page_len < self.config.page_size {
                break;
            }
        }

        info!(
            pages = report.pages,
            vertices = report.vertices_applied,
            edges = report.edges_applied,
            deletes = report.deletes_applied,
            errors = report.errors,
            "projector run complete"
        );
        Ok(report)
    }

    /// Apply a same-identifier group of events in log order.
    async fn apply_group(&self, group: Vec<&ChangeEvent>) -> Vec<Result<Applied, ApplyFailure>> {
        let mut results = Vec::with_capacity(group.len());
        for event in group {
            let result = self.apply_with_retry(event).await;
            let exhausted = matches!(result, Err(ApplyFailure::Exhausted(_)));
            results.push(result);
            if exhausted {
                break;
            }
        }
        results
    }

    async fn apply_with_retry(&self, event: &ChangeEvent) -> Result<Applied, ApplyFailure> {
        let mut delay = self.config.retry_base_delay;
        let mut attempt = 0u32;
        loop {
            match self.apply_once(event).await {
                Ok(applied) => return Ok(applied),
                Err(SinkError::Rejected(reason)) => {
                    return Err(ApplyFailure::Rejected(format!(
                        "{} ({})",
                        reason, event.entity_id
                    )))
                }
                Err(SinkError::Transient(reason)) => {
                    attempt += 1;
                    if attempt >= self.config.retry_budget {
                        return Err(ApplyFailure::Exhausted(format!(
                            "{} ({})",
                            reason, event.entity_id
                        )));
                    }
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }

    async fn apply_once(&self, event: &ChangeEvent) -> Result<Applied, SinkError> {
        match (&event.target, event.change_type) {
            (ChangeTarget::Vertex { label, properties }, ChangeKind::Create | ChangeKind::Update) => {
                self.sink
                    .upsert_vertex(Vertex::new(
                        &event.entity_id,
                        label.as_str(),
                        &event.partition_key,
                        properties.clone(),
                    ))
                    .await?;
                Ok(Applied::VertexUpsert)
            }
            (ChangeTarget::Vertex { .. }, ChangeKind::Delete) => {
                self.sink.remove_vertex(&event.entity_id).await?;
                Ok(Applied::Delete)
            }
            (
                ChangeTarget::Edge {
                    source_id,
                    target_id,
                    edge_kind,
                    properties,
                },
                ChangeKind::Create | ChangeKind::Update,
            ) => {
                self.sink
                    .upsert_edge(GraphEdge::new(
                        source_id,
                        target_id,
                        edge_kind.as_str(),
                        properties.clone(),
                    ))
                    .await?;
                Ok(Applied::EdgeUpsert)
            }
            (
                ChangeTarget::Edge {
                    source_id,
                    target_id,
                    edge_kind,
                    ..
                },
                ChangeKind::Delete,
            ) => {
                self.sink
                    .remove_edge(source_id, target_id, &EdgeKind::new(edge_kind.as_str()))
                    .await?;
                Ok(Applied::Delete)
            }
        }
    }
}
