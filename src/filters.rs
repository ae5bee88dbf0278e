// ABOUTME: Table selection rules for the export cycle
// ABOUTME: Applies include/exclude lists to the tables listed from the source schema

use anyhow::{bail, Result};

use crate::utils::validate_postgres_identifier;

/// Decides which source tables take part in a sync cycle.
///
/// Include and exclude lists are mutually exclusive. An empty filter selects
/// every table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableFilter {
    include_tables: Vec<String>,
    exclude_tables: Vec<String>,
}

impl TableFilter {
    pub fn new(include_tables: Vec<String>, exclude_tables: Vec<String>) -> Result<Self> {
        if !include_tables.is_empty() && !exclude_tables.is_empty() {
            bail!("Cannot use both include_tables and exclude_tables. Choose one.");
        }

        for table in include_tables.iter().chain(exclude_tables.iter()) {
            validate_postgres_identifier(table)?;
        }

        Ok(Self {
            include_tables,
            exclude_tables,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.include_tables.is_empty() && self.exclude_tables.is_empty()
    }

    /// Check whether a single table should be exported.
    pub fn should_export(&self, table: &str) -> bool {
        if !self.include_tables.is_empty() {
            return self.include_tables.iter().any(|t| t == table);
        }
        !self.exclude_tables.iter().any(|t| t == table)
    }

    /// Keep only the selected tables, preserving the listing order.
    pub fn apply(&self, tables: Vec<String>) -> Vec<String> {
        if self.is_empty() {
            return tables;
        }
        tables
            .into_iter()
            .filter(|table| self.should_export(table))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_new_rejects_include_and_exclude() {
        let result = TableFilter::new(tables(&["orders"]), tables(&["staff"]));
        assert!(result.is_err());
    }

    #[test]
    fn test_new_rejects_invalid_identifier() {
        assert!(TableFilter::new(tables(&["bad-name"]), vec![]).is_err());
    }

    #[test]
    fn test_empty_filter_exports_everything() {
        let filter = TableFilter::default();
        assert!(filter.is_empty());
        assert_eq!(
            filter.apply(tables(&["orders", "staff"])),
            tables(&["orders", "staff"])
        );
    }

    #[test]
    fn test_include_list() {
        let filter = TableFilter::new(tables(&["orders"]), vec![]).unwrap();
        assert!(filter.should_export("orders"));
        assert!(!filter.should_export("staff"));
        assert_eq!(filter.apply(tables(&["staff", "orders"])), tables(&["orders"]));
    }

    #[test]
    fn test_exclude_list() {
        let filter = TableFilter::new(vec![], tables(&["_prisma_migrations"])).unwrap();
        assert!(filter.should_export("orders"));
        assert!(!filter.should_export("_prisma_migrations"));
        assert_eq!(
            filter.apply(tables(&["_prisma_migrations", "orders", "staff"])),
            tables(&["orders", "staff"])
        );
    }
}
