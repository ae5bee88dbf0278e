// ABOUTME: Incremental snapshot ingestion - decide, archive and export
// ABOUTME: Wires the source database and target store into one sync cycle

pub mod archiver;
pub mod detector;
pub mod export;
pub mod inventory;
pub mod orchestrator;
pub mod source;
pub mod watermark;

#[cfg(test)]
mod test_utils;

pub use archiver::{ArchiveReport, Archiver};
pub use detector::UpdateDetector;
pub use export::{encode_csv, Exporter, TableExport};
pub use inventory::SnapshotInventory;
pub use orchestrator::{CycleOutcome, Decision, ExportReason, ExportStats, SyncOrchestrator};
pub use source::{PgSource, SourceDatabase, TableData};
pub use watermark::{Watermark, WatermarkRecord, WatermarkStore};

use anyhow::{Context, Result};

use crate::config::IngestConfig;
use crate::utils::redact_url;

/// Run one ingestion cycle against the configured source and target.
///
/// Connects to the source once and shares the connection for the whole
/// cycle. Errors are returned to the caller with the failing operation in
/// their context chain.
pub async fn run(config: &IngestConfig) -> Result<CycleOutcome> {
    tracing::info!(
        "Starting ingestion cycle: {} -> {}",
        redact_url(&config.source.url),
        config.target.describe()
    );

    let client = crate::postgres::connect_with_retry(
        &config.source.url,
        config.source.allow_self_signed_certs,
    )
    .await
    .context("Failed to connect to source database")?;
    tracing::info!("Connected to source database");

    let store = crate::store::open(&config.target)
        .await
        .context("Failed to open target store")?;

    let source = PgSource::new(&client, &config.source.schema, &config.source.modified_column);
    let outcome = SyncOrchestrator::new(config, &source, store.as_ref())
        .run_cycle()
        .await?;

    match &outcome {
        CycleOutcome::Exported { reason, stats } => tracing::info!(
            "Ingestion cycle exported {} tables ({} rows, {} archived) in {}ms: {}",
            stats.tables_exported,
            stats.rows_exported,
            stats.archive.moved.len(),
            stats.duration_ms,
            reason
        ),
        CycleOutcome::Skipped => tracing::info!("Ingestion cycle skipped: no updates"),
    }

    Ok(outcome)
}
