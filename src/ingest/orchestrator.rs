// ABOUTME: Sync orchestrator - decides whether a cycle exports and then runs it
// ABOUTME: First-run check, per-table change aggregation, archive, full re-export

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::fmt;

use super::archiver::{ArchiveReport, Archiver};
use super::detector::UpdateDetector;
use super::export::Exporter;
use super::inventory::SnapshotInventory;
use super::source::SourceDatabase;
use super::watermark::{Watermark, WatermarkStore};
use crate::config::IngestConfig;
use crate::filters::TableFilter;
use crate::store::ObjectStore;

/// Why a cycle re-exports every table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportReason {
    /// Nothing has been exported yet.
    FirstRun,
    /// A table has no watermark, e.g. it was added to the schema.
    NeverExported(String),
    /// A table has rows modified after its watermark.
    Changed(String),
    /// A table has a watermark but its live artifact is gone, e.g. after a
    /// cycle that failed between archiving and re-exporting it.
    MissingArtifact(String),
}

impl fmt::Display for ExportReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportReason::FirstRun => write!(f, "no previous export found"),
            ExportReason::NeverExported(table) => write!(f, "{} has never been exported", table),
            ExportReason::Changed(table) => write!(f, "{} has been updated", table),
            ExportReason::MissingArtifact(table) => write!(f, "{} has no live export", table),
        }
    }
}

/// The cycle's go/no-go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    ExportAll(ExportReason),
    Skip,
}

/// Statistics from an exporting cycle.
#[derive(Debug, Clone, Default)]
pub struct ExportStats {
    pub tables_exported: usize,
    pub rows_exported: u64,
    pub archive: ArchiveReport,
    pub duration_ms: u64,
}

/// How a cycle ended.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Exported {
        reason: ExportReason,
        stats: ExportStats,
    },
    Skipped,
}

/// Per-table verdict of the change-detection phase.
enum TableCheck {
    Unchanged,
    ForcesExport(ExportReason),
}

/// Composes inventory, watermarks, detection, archiving and export into one
/// sync cycle.
///
/// A cycle either exports every table or none: a single changed or new table
/// triggers a full re-export so the exported batch stays consistent.
pub struct SyncOrchestrator<'a> {
    config: &'a IngestConfig,
    source: &'a dyn SourceDatabase,
    store: &'a dyn ObjectStore,
}

impl<'a> SyncOrchestrator<'a> {
    pub fn new(
        config: &'a IngestConfig,
        source: &'a dyn SourceDatabase,
        store: &'a dyn ObjectStore,
    ) -> Self {
        Self {
            config,
            source,
            store,
        }
    }

    /// Run one full cycle: list tables, decide, then export or skip.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let start = std::time::Instant::now();
        let filter = self.config.table_filter()?;
        let tables = self.list_tables(&filter).await?;
        tracing::info!("Found {} tables to mirror", tables.len());

        let has_artifacts = SnapshotInventory::new(self.store, &self.config.layout)
            .has_any_artifacts()
            .await?;

        let decision = self.decide(has_artifacts, &tables).await?;
        let reason = match decision {
            Decision::Skip => {
                tracing::info!("No table changed since the last export, nothing to do");
                return Ok(CycleOutcome::Skipped);
            }
            Decision::ExportAll(reason) => reason,
        };

        tracing::info!("Exporting all tables: {}", reason);
        let cycle_started_at = self
            .source
            .current_timestamp()
            .await
            .context("Failed to read the source clock")?;

        let archive = if has_artifacts {
            let prior = self.prior_watermark(&tables, cycle_started_at).await?;
            Archiver::new(self.store, &self.config.layout)
                .archive(prior)
                .await
        } else {
            ArchiveReport::default()
        };
        if !archive.is_success() {
            tracing::warn!(
                "Archiving had {} failures, continuing with export",
                archive.failures.len()
            );
        }

        let exporter = Exporter::new(self.source, self.store, &self.config.layout);
        let mut stats = ExportStats {
            archive,
            ..ExportStats::default()
        };

        for table in &tables {
            let export = exporter.export_table(table, cycle_started_at).await?;
            stats.tables_exported += 1;
            stats.rows_exported += export.rows;
        }

        stats.duration_ms = start.elapsed().as_millis() as u64;
        Ok(CycleOutcome::Exported { reason, stats })
    }

    /// Decide whether this cycle exports.
    ///
    /// Without artifacts the answer is always a full export. Otherwise every
    /// table is checked concurrently and the first table that needs an export
    /// settles it; the remaining checks are dropped. A failed check fails the
    /// decision only when no table forces an export, so the outcome does not
    /// depend on which check finishes first.
    pub async fn decide(&self, has_artifacts: bool, tables: &[String]) -> Result<Decision> {
        if !has_artifacts {
            tracing::info!("Target store holds no exports yet");
            return Ok(Decision::ExportAll(ExportReason::FirstRun));
        }

        let watermarks = WatermarkStore::new(self.store, &self.config.layout);
        let detector = UpdateDetector::new(self.source);

        let mut checks = stream::iter(tables)
            .map(|table| self.check_table(&watermarks, &detector, table))
            .buffer_unordered(self.config.detect_concurrency.max(1));

        let mut first_error = None;
        while let Some(check) = checks.next().await {
            match check {
                Ok(TableCheck::ForcesExport(reason)) => {
                    if let Some(e) = &first_error {
                        tracing::warn!("Exporting despite a failed change check: {:#}", e);
                    }
                    return Ok(Decision::ExportAll(reason));
                }
                Ok(TableCheck::Unchanged) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(Decision::Skip),
        }
    }

    async fn check_table(
        &self,
        watermarks: &WatermarkStore<'_>,
        detector: &UpdateDetector<'_>,
        table: &str,
    ) -> Result<TableCheck> {
        match watermarks.get(table).await? {
            Watermark::Absent => {
                tracing::info!("{} has no previous export watermark", table);
                Ok(TableCheck::ForcesExport(ExportReason::NeverExported(
                    table.to_string(),
                )))
            }
            Watermark::At(since) => {
                // A failed cycle can leave a table archived but not re-exported.
                if !self.has_live_artifact(table).await? {
                    tracing::warn!("{} has a watermark but no live export", table);
                    Ok(TableCheck::ForcesExport(ExportReason::MissingArtifact(
                        table.to_string(),
                    )))
                } else if detector.has_changed_since(table, since).await? {
                    Ok(TableCheck::ForcesExport(ExportReason::Changed(
                        table.to_string(),
                    )))
                } else {
                    Ok(TableCheck::Unchanged)
                }
            }
        }
    }

    async fn has_live_artifact(&self, table: &str) -> Result<bool> {
        let key = self.config.layout.live_key(table);
        self.store
            .exists(&key)
            .await
            .with_context(|| format!("Failed to check for live export {}", key))
    }

    /// Watermark the live artifacts were exported at.
    ///
    /// Falls back to the cycle start when artifacts exist without any
    /// watermark, so they are still archived rather than overwritten.
    async fn prior_watermark(
        &self,
        tables: &[String],
        cycle_started_at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        let latest = WatermarkStore::new(self.store, &self.config.layout)
            .latest(tables)
            .await?;
        Ok(latest.unwrap_or_else(|| {
            tracing::warn!(
                "Live exports exist but no watermark does; archiving under {}",
                cycle_started_at
            );
            cycle_started_at
        }))
    }

    async fn list_tables(&self, filter: &TableFilter) -> Result<Vec<String>> {
        let tables = self
            .source
            .list_tables()
            .await
            .context("Failed to list source tables")?;
        Ok(filter.apply(tables))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::test_utils::{at, FakeSource};
    use crate::store::MemoryStore;

    fn tables(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    /// Record a previous export of `table`: live artifact plus watermark.
    async fn seed_export(
        store: &MemoryStore,
        config: &IngestConfig,
        table: &str,
        ts: DateTime<Utc>,
    ) {
        store
            .put(&config.layout.live_key(table), b"id\n".to_vec(), "text/csv")
            .await
            .unwrap();
        WatermarkStore::new(store, &config.layout)
            .advance(table, ts, 1)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_first_run_ignores_per_table_state() {
        let config = IngestConfig::default();
        let source = FakeSource::new().with_table("orders", &[at(1)]);
        let store = MemoryStore::new();
        let orchestrator = SyncOrchestrator::new(&config, &source, &store);

        let decision = orchestrator.decide(false, &tables(&["orders"])).await.unwrap();

        assert_eq!(decision, Decision::ExportAll(ExportReason::FirstRun));
        assert_eq!(source.detection_calls(), 0);
    }

    #[tokio::test]
    async fn test_unchanged_tables_skip() {
        let config = IngestConfig::default();
        let source = FakeSource::new()
            .with_table("orders", &[at(1), at(2)])
            .with_table("staff", &[at(3)]);
        let store = MemoryStore::new();
        seed_export(&store, &config, "orders", at(2)).await;
        seed_export(&store, &config, "staff", at(3)).await;

        let orchestrator = SyncOrchestrator::new(&config, &source, &store);
        let decision = orchestrator
            .decide(true, &tables(&["orders", "staff"]))
            .await
            .unwrap();

        assert_eq!(decision, Decision::Skip);
        assert_eq!(source.detection_calls(), 2);
    }

    #[tokio::test]
    async fn test_missing_watermark_forces_export() {
        let config = IngestConfig::default();
        let source = FakeSource::new()
            .with_table("orders", &[at(1)])
            .with_table("staff", &[at(1)]);
        let store = MemoryStore::new();
        seed_export(&store, &config, "staff", at(1)).await;

        let orchestrator = SyncOrchestrator::new(&config, &source, &store);
        let decision = orchestrator
            .decide(true, &tables(&["orders", "staff"]))
            .await
            .unwrap();

        assert_eq!(
            decision,
            Decision::ExportAll(ExportReason::NeverExported("orders".to_string()))
        );
    }

    #[tokio::test]
    async fn test_changed_table_forces_export() {
        let config = IngestConfig {
            detect_concurrency: 1,
            ..IngestConfig::default()
        };
        let source = FakeSource::new()
            .with_table("orders", &[at(1), at(5)])
            .with_table("staff", &[at(1)]);
        let store = MemoryStore::new();
        seed_export(&store, &config, "orders", at(1)).await;
        seed_export(&store, &config, "staff", at(1)).await;

        let orchestrator = SyncOrchestrator::new(&config, &source, &store);
        let decision = orchestrator
            .decide(true, &tables(&["orders", "staff"]))
            .await
            .unwrap();

        assert_eq!(
            decision,
            Decision::ExportAll(ExportReason::Changed("orders".to_string()))
        );
        // Sequential checks stop at the first table that forces an export.
        assert_eq!(source.detection_calls(), 1);
    }

    #[tokio::test]
    async fn test_detection_failure_is_fatal() {
        let config = IngestConfig::default();
        let source = FakeSource::new()
            .with_table("orders", &[at(1)])
            .with_table("staff", &[at(1)]);
        source.fail_detection("staff");
        let store = MemoryStore::new();
        seed_export(&store, &config, "orders", at(1)).await;
        seed_export(&store, &config, "staff", at(1)).await;

        let orchestrator = SyncOrchestrator::new(&config, &source, &store);
        let result = orchestrator.decide(true, &tables(&["orders", "staff"])).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_watermark_without_live_artifact_forces_export() {
        let config = IngestConfig::default();
        let source = FakeSource::new()
            .with_table("orders", &[at(1)])
            .with_table("staff", &[at(1)]);
        let store = MemoryStore::new();
        seed_export(&store, &config, "orders", at(1)).await;
        WatermarkStore::new(&store, &config.layout)
            .advance("staff", at(1), 1)
            .await
            .unwrap();

        let orchestrator = SyncOrchestrator::new(&config, &source, &store);
        let decision = orchestrator
            .decide(true, &tables(&["orders", "staff"]))
            .await
            .unwrap();

        assert_eq!(
            decision,
            Decision::ExportAll(ExportReason::MissingArtifact("staff".to_string()))
        );
    }

    #[tokio::test]
    async fn test_change_wins_over_failed_check() {
        let config = IngestConfig {
            detect_concurrency: 1,
            ..IngestConfig::default()
        };
        let source = FakeSource::new()
            .with_table("orders", &[at(1)])
            .with_table("staff", &[at(1), at(5)]);
        source.fail_detection("orders");
        let store = MemoryStore::new();
        seed_export(&store, &config, "orders", at(1)).await;
        seed_export(&store, &config, "staff", at(1)).await;

        let orchestrator = SyncOrchestrator::new(&config, &source, &store);
        let decision = orchestrator
            .decide(true, &tables(&["orders", "staff"]))
            .await
            .unwrap();

        // The failing check settles first, the change still decides.
        assert_eq!(
            decision,
            Decision::ExportAll(ExportReason::Changed("staff".to_string()))
        );
        assert_eq!(source.detection_calls(), 2);
    }

    #[tokio::test]
    async fn test_run_cycle_archives_then_reexports() {
        let config = IngestConfig::default();
        let source = FakeSource::new()
            .with_table("orders", &[at(2)])
            .with_table("staff", &[])
            .with_clock(at(6));
        let store = MemoryStore::new();
        let orchestrator = SyncOrchestrator::new(&config, &source, &store);

        orchestrator.run_cycle().await.unwrap();
        let watermarks = WatermarkStore::new(&store, &config.layout);
        // Empty tables take the source clock as watermark.
        assert_eq!(watermarks.get("staff").await.unwrap(), Watermark::At(at(6)));

        source.touch("orders", at(8));
        let outcome = orchestrator.run_cycle().await.unwrap();

        let CycleOutcome::Exported { reason, stats } = outcome else {
            panic!("touched table must trigger an export");
        };
        assert_eq!(reason, ExportReason::Changed("orders".to_string()));
        assert_eq!(stats.tables_exported, 2);
        assert_eq!(stats.archive.label.as_deref(), Some("2024-05-01T06:00:00.000000Z"));
        assert!(store
            .exists("archive/2024-05-01T06:00:00.000000Z/staff.csv")
            .await
            .unwrap());
        assert_eq!(watermarks.get("orders").await.unwrap(), Watermark::At(at(8)));
    }

    #[test]
    fn test_export_reason_display() {
        assert_eq!(ExportReason::FirstRun.to_string(), "no previous export found");
        assert_eq!(
            ExportReason::Changed("orders".to_string()).to_string(),
            "orders has been updated"
        );
        assert_eq!(
            ExportReason::NeverExported("staff".to_string()).to_string(),
            "staff has never been exported"
        );
        assert_eq!(
            ExportReason::MissingArtifact("orders".to_string()).to_string(),
            "orders has no live export"
        );
    }
}
