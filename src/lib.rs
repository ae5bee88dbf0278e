// ABOUTME: Library root for snapshot-ingestor
// ABOUTME: Mirrors PostgreSQL tables to CSV objects, re-exporting only on change

pub mod config;
pub mod filters;
pub mod ingest;
pub mod postgres;
pub mod store;
pub mod utils;

pub use config::{IngestConfig, SourceConfig, TargetConfig};
pub use ingest::{run, CycleOutcome, Decision, ExportReason};
