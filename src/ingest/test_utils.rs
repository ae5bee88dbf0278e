//! Shared fixtures for the ingest unit tests.

#![cfg(test)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::source::{SourceDatabase, TableData};

/// Fixed test clock: 2024-05-01 at `hour`:00 UTC.
pub fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
}

/// In-memory source whose rows are just modification timestamps.
#[derive(Default)]
pub struct FakeSource {
    tables: Mutex<BTreeMap<String, Vec<DateTime<Utc>>>>,
    failing: Mutex<HashSet<String>>,
    detection_calls: AtomicUsize,
    now: Mutex<Option<DateTime<Utc>>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, table: &str, modified: &[DateTime<Utc>]) -> Self {
        self.tables
            .lock()
            .unwrap()
            .insert(table.to_string(), modified.to_vec());
        self
    }

    pub fn with_clock(self, now: DateTime<Utc>) -> Self {
        *self.now.lock().unwrap() = Some(now);
        self
    }

    /// Add a row modified at `ts`.
    pub fn touch(&self, table: &str, ts: DateTime<Utc>) {
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(ts);
    }

    pub fn fail_detection(&self, table: &str) {
        self.failing.lock().unwrap().insert(table.to_string());
    }

    pub fn detection_calls(&self) -> usize {
        self.detection_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceDatabase for FakeSource {
    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.tables.lock().unwrap().keys().cloned().collect())
    }

    async fn has_rows_modified_after(&self, table: &str, since: DateTime<Utc>) -> Result<bool> {
        self.detection_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(table) {
            bail!("relation \"{}\" does not exist", table);
        }
        let tables = self.tables.lock().unwrap();
        let Some(modified) = tables.get(table) else {
            bail!("relation \"{}\" does not exist", table);
        };
        Ok(modified.iter().any(|ts| *ts > since))
    }

    async fn fetch_table(&self, table: &str) -> Result<TableData> {
        let tables = self.tables.lock().unwrap();
        let Some(modified) = tables.get(table) else {
            bail!("relation \"{}\" does not exist", table);
        };
        Ok(TableData {
            columns: vec!["id".to_string(), "last_updated".to_string()],
            rows: modified
                .iter()
                .enumerate()
                .map(|(i, ts)| vec![Some((i + 1).to_string()), Some(ts.to_rfc3339())])
                .collect(),
            max_modified: modified.iter().max().copied(),
        })
    }

    async fn current_timestamp(&self) -> Result<DateTime<Utc>> {
        Ok(self.now.lock().unwrap().unwrap_or_else(|| at(23)))
    }
}
