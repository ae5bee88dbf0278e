// ABOUTME: Watermark store - one JSON object per table in the target store
// ABOUTME: Tracks the latest modification timestamp covered by the live export

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{KeyLayout, ObjectStore, JSON_CONTENT_TYPE};

const RECORD_VERSION: u32 = 1;

/// Export watermark of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Watermark {
    /// The table has never been exported.
    Absent,
    /// Rows modified up to and including this instant are in the live export.
    At(DateTime<Utc>),
}

/// Persisted form of a watermark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkRecord {
    pub table: String,
    /// High-water mark of the table's modification column
    pub last_modified: DateTime<Utc>,
    /// When the export that produced this watermark finished
    pub exported_at: DateTime<Utc>,
    /// Rows in the exported artifact
    pub row_count: u64,
    /// Version of the record format
    pub version: u32,
}

/// Reads and advances per-table watermarks.
pub struct WatermarkStore<'a> {
    store: &'a dyn ObjectStore,
    layout: &'a KeyLayout,
}

impl<'a> WatermarkStore<'a> {
    pub fn new(store: &'a dyn ObjectStore, layout: &'a KeyLayout) -> Self {
        Self { store, layout }
    }

    /// Look up a table's watermark.
    ///
    /// A missing object is [`Watermark::Absent`]. An unreadable record is
    /// logged and also treated as absent, so the table gets a fresh export.
    pub async fn get(&self, table: &str) -> Result<Watermark> {
        Ok(match self.record(table).await? {
            Some(record) => Watermark::At(record.last_modified),
            None => Watermark::Absent,
        })
    }

    /// Full record for a table, if one is stored and parses.
    pub async fn record(&self, table: &str) -> Result<Option<WatermarkRecord>> {
        let key = self.layout.watermark_key(table);
        let Some(bytes) = self
            .store
            .get(&key)
            .await
            .with_context(|| format!("Failed to read watermark for {}", table))?
        else {
            return Ok(None);
        };

        match serde_json::from_slice::<WatermarkRecord>(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!(
                    "Ignoring unreadable watermark {} for {}: {}. Table will be exported in full.",
                    key,
                    table,
                    e
                );
                Ok(None)
            }
        }
    }

    /// Most recent watermark across `tables`, `None` if none has one.
    pub async fn latest(&self, tables: &[String]) -> Result<Option<DateTime<Utc>>> {
        let mut latest = None;
        for table in tables {
            if let Watermark::At(ts) = self.get(table).await? {
                latest = latest.max(Some(ts));
            }
        }
        Ok(latest)
    }

    /// Record a successful export of `table` covering rows up to `last_modified`.
    ///
    /// The stored watermark never moves backwards: the effective value is the
    /// later of the stored one and `last_modified`, and is returned.
    pub async fn advance(
        &self,
        table: &str,
        last_modified: DateTime<Utc>,
        row_count: u64,
    ) -> Result<DateTime<Utc>> {
        let effective = match self.get(table).await? {
            Watermark::At(previous) if previous > last_modified => {
                tracing::warn!(
                    "Watermark for {} would move backwards ({} -> {}); keeping {}",
                    table,
                    previous,
                    last_modified,
                    previous
                );
                previous
            }
            _ => last_modified,
        };

        let record = WatermarkRecord {
            table: table.to_string(),
            last_modified: effective,
            exported_at: Utc::now(),
            row_count,
            version: RECORD_VERSION,
        };
        let body =
            serde_json::to_vec_pretty(&record).context("Failed to serialize watermark record")?;

        self.store
            .put(&self.layout.watermark_key(table), body, JSON_CONTENT_TYPE)
            .await
            .with_context(|| format!("Failed to write watermark for {}", table))?;

        Ok(effective)
    }
}
