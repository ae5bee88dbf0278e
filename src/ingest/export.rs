// ABOUTME: Exporter - fetches a table, encodes it as CSV and writes the live artifact
// ABOUTME: Advances the table's watermark only after the artifact is stored

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

use super::source::{SourceDatabase, TableData};
use super::watermark::WatermarkStore;
use crate::store::{KeyLayout, ObjectStore, CSV_CONTENT_TYPE};

/// Result of exporting one table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableExport {
    pub table: String,
    pub key: String,
    pub rows: u64,
    pub bytes: usize,
    pub watermark: DateTime<Utc>,
}

pub struct Exporter<'a> {
    source: &'a dyn SourceDatabase,
    store: &'a dyn ObjectStore,
    layout: &'a KeyLayout,
}

impl<'a> Exporter<'a> {
    pub fn new(
        source: &'a dyn SourceDatabase,
        store: &'a dyn ObjectStore,
        layout: &'a KeyLayout,
    ) -> Self {
        Self {
            source,
            store,
            layout,
        }
    }

    /// Export `table` to its live key and advance its watermark.
    ///
    /// `cycle_started_at` becomes the watermark of a table without rows, so
    /// an empty table is not mistaken for a never-exported one next cycle.
    pub async fn export_table(
        &self,
        table: &str,
        cycle_started_at: DateTime<Utc>,
    ) -> Result<TableExport> {
        let data = self
            .source
            .fetch_table(table)
            .await
            .with_context(|| format!("Failed to fetch table {}", table))?;
        let rows = data.rows.len() as u64;

        let body = encode_csv(&data).with_context(|| format!("Failed to encode table {}", table))?;
        let bytes = body.len();
        let key = self.layout.live_key(table);

        self.store
            .put(&key, body, CSV_CONTENT_TYPE)
            .await
            .with_context(|| format!("Failed to upload {}", key))?;

        let watermark = WatermarkStore::new(self.store, self.layout)
            .advance(table, data.max_modified.unwrap_or(cycle_started_at), rows)
            .await?;

        tracing::info!(
            "Exported {} ({} rows, {} bytes) to {}, watermark {}",
            table,
            rows,
            bytes,
            key,
            watermark
        );

        Ok(TableExport {
            table: table.to_string(),
            key,
            rows,
            bytes,
            watermark,
        })
    }
}

/// Encode a table as CSV: a header row, then one record per row with NULL as
/// an empty field.
pub fn encode_csv(data: &TableData) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&data.columns)?;
    for row in &data.rows {
        writer.write_record(row.iter().map(|value| value.as_deref().unwrap_or("")))?;
    }
    writer.flush()?;
    writer
        .into_inner()
        .map_err(|e| anyhow!("Failed to finish CSV output: {}", e.error()))
}
