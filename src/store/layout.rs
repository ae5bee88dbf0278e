// ABOUTME: Key naming convention for live artifacts, archives and watermarks
// ABOUTME: Every object key the ingestor reads or writes is built here

use anyhow::{bail, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;

/// Where things live inside the target store.
///
/// ```text
/// <live_prefix>/<table>.<extension>                 current export
/// <archive_prefix>/<label>/<table>.<extension>      superseded export
/// <watermark_prefix>/<table>.json                   last export watermark
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeyLayout {
    pub live_prefix: String,
    pub archive_prefix: String,
    pub watermark_prefix: String,
    pub extension: String,
}

impl Default for KeyLayout {
    fn default() -> Self {
        Self {
            live_prefix: "current".to_string(),
            archive_prefix: "archive".to_string(),
            watermark_prefix: "watermarks".to_string(),
            extension: "csv".to_string(),
        }
    }
}

impl KeyLayout {
    /// Prefix (with trailing slash) holding every live artifact.
    pub fn live_dir(&self) -> String {
        format!("{}/", trim_slashes(&self.live_prefix))
    }

    pub fn live_key(&self, table: &str) -> String {
        format!("{}{}.{}", self.live_dir(), table, self.extension)
    }

    /// Archive key for a file that used to sit directly under the live prefix.
    ///
    /// `attempt` > 0 inserts a numeric suffix before the extension so an
    /// existing archive object is never replaced.
    pub fn archive_key(&self, label: &str, file_name: &str, attempt: u32) -> String {
        let file_name = if attempt == 0 {
            file_name.to_string()
        } else {
            match file_name.rsplit_once('.') {
                Some((stem, ext)) => format!("{}.{}.{}", stem, attempt, ext),
                None => format!("{}.{}", file_name, attempt),
            }
        };
        format!(
            "{}/{}/{}",
            trim_slashes(&self.archive_prefix),
            label,
            file_name
        )
    }

    pub fn watermark_key(&self, table: &str) -> String {
        format!("{}/{}.json", trim_slashes(&self.watermark_prefix), table)
    }

    /// The part of a live key below the live prefix (`current/orders.csv` -> `orders.csv`).
    pub fn live_file_name<'k>(&self, live_key: &'k str) -> Option<&'k str> {
        live_key
            .strip_prefix(self.live_dir().as_str())
            .filter(|name| !name.is_empty())
    }

    pub fn validate(&self) -> Result<()> {
        let prefixes = [
            ("live_prefix", trim_slashes(&self.live_prefix)),
            ("archive_prefix", trim_slashes(&self.archive_prefix)),
            ("watermark_prefix", trim_slashes(&self.watermark_prefix)),
        ];

        for (name, prefix) in &prefixes {
            if prefix.is_empty() {
                bail!("layout.{} cannot be empty", name);
            }
        }

        for (i, (name_a, a)) in prefixes.iter().enumerate() {
            for (name_b, b) in prefixes.iter().skip(i + 1) {
                if nested(a, b) || nested(b, a) {
                    bail!(
                        "layout.{} ('{}') and layout.{} ('{}') must not overlap",
                        name_a,
                        a,
                        name_b,
                        b
                    );
                }
            }
        }

        if self.extension.is_empty() || self.extension.contains('/') {
            bail!("layout.extension must be a plain file extension");
        }

        Ok(())
    }
}

/// Archive directory name for a superseded watermark.
pub fn archive_label(watermark: DateTime<Utc>) -> String {
    watermark.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn trim_slashes(prefix: &str) -> &str {
    prefix.trim_matches('/')
}

fn nested(outer: &str, inner: &str) -> bool {
    outer == inner || inner.starts_with(&format!("{}/", outer))
}
