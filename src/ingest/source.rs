// ABOUTME: Source database collaborator - lists tables, detects and fetches rows
// ABOUTME: PostgreSQL implementation reads through a shared tokio-postgres client

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::Client;

use crate::utils::quote_ident;

/// A full table read, every value rendered as text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
    /// Latest modification timestamp at the time of the read, `None` for an empty table
    pub max_modified: Option<DateTime<Utc>>,
}

/// Read-only view of the database being mirrored.
#[async_trait]
pub trait SourceDatabase: Send + Sync {
    /// Tables eligible for export, in a stable order.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Whether any row of `table` was modified strictly after `since`.
    async fn has_rows_modified_after(&self, table: &str, since: DateTime<Utc>) -> Result<bool>;

    async fn fetch_table(&self, table: &str) -> Result<TableData>;

    /// The database clock, used as the watermark of tables with no rows.
    async fn current_timestamp(&self) -> Result<DateTime<Utc>>;
}

/// Source backed by a PostgreSQL schema.
///
/// Every table is expected to carry a modification timestamp column
/// (`modified_column`). Its values are compared as `timestamptz`; plain
/// `timestamp` columns are interpreted in the session time zone, which
/// [`crate::postgres::connect`] pins to UTC.
pub struct PgSource<'a> {
    client: &'a Client,
    schema: String,
    modified_column: String,
}

impl<'a> PgSource<'a> {
    pub fn new(client: &'a Client, schema: &str, modified_column: &str) -> Self {
        Self {
            client,
            schema: schema.to_string(),
            modified_column: modified_column.to_string(),
        }
    }

    fn qualified(&self, table: &str) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(table))
    }

    async fn column_names(&self, table: &str) -> Result<Vec<String>> {
        let rows = self
            .client
            .query(
                "SELECT column_name::text
                 FROM information_schema.columns
                 WHERE table_schema = $1 AND table_name = $2
                 ORDER BY ordinal_position",
                &[&self.schema, &table],
            )
            .await
            .with_context(|| format!("Failed to get columns for {}.{}", self.schema, table))?;

        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn max_modified(&self, table: &str) -> Result<Option<DateTime<Utc>>> {
        let query = format!(
            "SELECT max({})::timestamptz FROM {}",
            quote_ident(&self.modified_column),
            self.qualified(table)
        );
        let row = self
            .client
            .query_one(&query, &[])
            .await
            .with_context(|| {
                format!(
                    "Failed to read max({}) from {}.{}",
                    self.modified_column, self.schema, table
                )
            })?;
        Ok(row.get(0))
    }
}

#[async_trait]
impl<'a> SourceDatabase for PgSource<'a> {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let rows = self
            .client
            .query(
                "SELECT tablename::text FROM pg_tables WHERE schemaname = $1 ORDER BY tablename",
                &[&self.schema],
            )
            .await
            .with_context(|| format!("Failed to list tables in schema {}", self.schema))?;

        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn has_rows_modified_after(&self, table: &str, since: DateTime<Utc>) -> Result<bool> {
        let query = build_change_probe(&self.schema, table, &self.modified_column);
        let row = self
            .client
            .query_one(&query, &[&since])
            .await
            .with_context(|| {
                format!(
                    "Failed to check {}.{} for rows modified after {}",
                    self.schema, table, since
                )
            })?;
        Ok(row.get(0))
    }

    async fn fetch_table(&self, table: &str) -> Result<TableData> {
        let columns = self.column_names(table).await?;
        if columns.is_empty() {
            anyhow::bail!("Table {}.{} has no columns or does not exist", self.schema, table);
        }

        // Read the high-water mark first: rows touched between the two queries
        // land in this export and are simply exported again next cycle.
        let max_modified = self.max_modified(table).await?;

        let select_list = columns
            .iter()
            .map(|c| format!("{}::text", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");
        let query = format!("SELECT {} FROM {}", select_list, self.qualified(table));

        let rows = self
            .client
            .query(&query, &[])
            .await
            .with_context(|| format!("Failed to fetch rows from {}.{}", self.schema, table))?;

        let rows = rows
            .iter()
            .map(|row| {
                (0..columns.len())
                    .map(|i| row.get::<_, Option<String>>(i))
                    .collect()
            })
            .collect();

        Ok(TableData {
            columns,
            rows,
            max_modified,
        })
    }

    async fn current_timestamp(&self) -> Result<DateTime<Utc>> {
        let row = self
            .client
            .query_one("SELECT now()", &[])
            .await
            .context("Failed to read database clock")?;
        Ok(row.get(0))
    }
}

/// `EXISTS` probe for rows newer than the `$1` watermark.
fn build_change_probe(schema: &str, table: &str, modified_column: &str) -> String {
    format!(
        "SELECT EXISTS (SELECT 1 FROM {}.{} WHERE {} > $1::timestamptz)",
        quote_ident(schema),
        quote_ident(table),
        quote_ident(modified_column)
    )
}
