// ABOUTME: Archiver - moves live artifacts aside before they are re-exported
// ABOUTME: Archive directories are named after the watermark being superseded

use chrono::{DateTime, Utc};

use crate::store::{archive_label, KeyLayout, ObjectStore};

/// Collision suffixes tried before giving up on an archive destination.
const MAX_ARCHIVE_ATTEMPTS: u32 = 100;

/// Outcome of one archive pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArchiveReport {
    /// Archive directory label, `None` when there was nothing to archive
    pub label: Option<String>,
    /// (live key, archive key) pairs that were moved
    pub moved: Vec<(String, String)>,
    pub failures: Vec<String>,
}

impl ArchiveReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct Archiver<'a> {
    store: &'a dyn ObjectStore,
    layout: &'a KeyLayout,
}

impl<'a> Archiver<'a> {
    pub fn new(store: &'a dyn ObjectStore, layout: &'a KeyLayout) -> Self {
        Self { store, layout }
    }

    /// Move every live artifact under `archive/<prior_watermark>/`.
    ///
    /// `prior_watermark` must be the watermark the live artifacts were exported
    /// at, not the one the coming export will produce. Best effort: failures
    /// are collected in the report and logged, never returned as errors.
    pub async fn archive(&self, prior_watermark: DateTime<Utc>) -> ArchiveReport {
        let mut report = ArchiveReport::default();
        let live_dir = self.layout.live_dir();

        let live_keys = match self.store.list_keys(&live_dir).await {
            Ok(keys) => keys,
            Err(e) => {
                let msg = format!("Failed to list live artifacts under {}: {:#}", live_dir, e);
                tracing::warn!("{}", msg);
                report.failures.push(msg);
                return report;
            }
        };

        if live_keys.is_empty() {
            tracing::debug!("No live artifacts to archive");
            return report;
        }

        let label = archive_label(prior_watermark);
        tracing::info!(
            "Archiving {} live artifacts under {}",
            live_keys.len(),
            label
        );

        for live_key in live_keys {
            match self.archive_one(&live_key, &label).await {
                Ok(archive_key) => report.moved.push((live_key, archive_key)),
                Err(e) => {
                    let msg = format!("Failed to archive {}: {:#}", live_key, e);
                    tracing::warn!("{}", msg);
                    report.failures.push(msg);
                }
            }
        }

        report.label = Some(label);
        report
    }

    async fn archive_one(&self, live_key: &str, label: &str) -> anyhow::Result<String> {
        let file_name = self
            .layout
            .live_file_name(live_key)
            .ok_or_else(|| anyhow::anyhow!("{} is not under the live prefix", live_key))?;

        for attempt in 0..MAX_ARCHIVE_ATTEMPTS {
            let archive_key = self.layout.archive_key(label, file_name, attempt);
            if self.store.exists(&archive_key).await? {
                continue;
            }
            self.store.rename(live_key, &archive_key).await?;
            return Ok(archive_key);
        }

        anyhow::bail!(
            "no free archive key for {} after {} attempts",
            live_key,
            MAX_ARCHIVE_ATTEMPTS
        )
    }
}
