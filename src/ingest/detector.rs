// ABOUTME: Update detector - asks the source whether a table changed since its watermark
// ABOUTME: Read-only and independent per table, so checks can run concurrently

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use super::source::SourceDatabase;

pub struct UpdateDetector<'a> {
    source: &'a dyn SourceDatabase,
}

impl<'a> UpdateDetector<'a> {
    pub fn new(source: &'a dyn SourceDatabase) -> Self {
        Self { source }
    }

    /// `true` if any row of `table` was modified strictly after `watermark`.
    ///
    /// Errors are returned, never folded into "unchanged": a failed probe must
    /// not make the cycle skip a real update.
    pub async fn has_changed_since(&self, table: &str, watermark: DateTime<Utc>) -> Result<bool> {
        let changed = self
            .source
            .has_rows_modified_after(table, watermark)
            .await
            .with_context(|| format!("Change detection failed for table {}", table))?;

        if changed {
            tracing::info!("{} has rows modified after {}", table, watermark);
        } else {
            tracing::debug!("No changes in {} since {}", table, watermark);
        }

        Ok(changed)
    }
}
