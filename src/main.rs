// ABOUTME: Entry point for scheduled ingestion runs
// ABOUTME: Builds the config from file and environment, runs one cycle, logs the outcome

use anyhow::Context;
use clap::Parser;
use snapshot_ingestor::{IngestConfig, TargetConfig};
use std::path::PathBuf;

/// Every option can be given through the environment, so a scheduler can
/// invoke the binary without arguments.
#[derive(Parser, Debug)]
#[command(name = "snapshot-ingestor")]
#[command(about = "Mirror PostgreSQL tables to CSV objects when their data changes", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to an ingest.toml configuration file
    #[arg(long, env = "INGEST_CONFIG")]
    config: Option<PathBuf>,
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, env = "INGEST_LOG", default_value = "info")]
    log: String,
    /// Source PostgreSQL connection URL
    #[arg(long, env = "SOURCE_DATABASE_URL", hide_env_values = true)]
    source_url: Option<String>,
    /// Source schema to export
    #[arg(long, env = "INGEST_SCHEMA")]
    schema: Option<String>,
    /// Modification timestamp column present on every table
    #[arg(long, env = "INGEST_MODIFIED_COLUMN")]
    modified_column: Option<String>,
    /// Export only these tables (comma-separated)
    #[arg(long, env = "INGEST_INCLUDE_TABLES", value_delimiter = ',')]
    include_tables: Option<Vec<String>>,
    /// Skip these tables (comma-separated)
    #[arg(long, env = "INGEST_EXCLUDE_TABLES", value_delimiter = ',')]
    exclude_tables: Option<Vec<String>>,
    /// Target S3 bucket
    #[arg(long, env = "INGEST_BUCKET", conflicts_with = "local_root")]
    bucket: Option<String>,
    /// AWS region of the target bucket
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,
    /// Custom S3 endpoint (MinIO, LocalStack); enables path-style addressing
    #[arg(long, env = "INGEST_S3_ENDPOINT")]
    s3_endpoint: Option<String>,
    /// Write to a local directory instead of S3
    #[arg(long, env = "INGEST_LOCAL_ROOT")]
    local_root: Option<PathBuf>,
    /// Allow self-signed TLS certificates (insecure - use only for testing)
    #[arg(long, env = "INGEST_ALLOW_SELF_SIGNED_CERTS")]
    allow_self_signed_certs: bool,
}

impl Cli {
    /// Load the config file (if any) and apply command line / environment overrides.
    fn into_config(self) -> anyhow::Result<IngestConfig> {
        let mut config = match &self.config {
            Some(path) => IngestConfig::from_file(path)?,
            None => IngestConfig::default(),
        };

        if let Some(url) = self.source_url {
            config.source.url = url;
        }
        if let Some(schema) = self.schema {
            config.source.schema = schema;
        }
        if let Some(column) = self.modified_column {
            config.source.modified_column = column;
        }
        if let Some(tables) = self.include_tables {
            config.source.include_tables = tables;
        }
        if let Some(tables) = self.exclude_tables {
            config.source.exclude_tables = tables;
        }
        if self.allow_self_signed_certs {
            config.source.allow_self_signed_certs = true;
        }

        if let Some(root) = self.local_root {
            config.target = TargetConfig::Local { root };
        } else if let Some(new_bucket) = self.bucket {
            if !matches!(config.target, TargetConfig::S3 { .. }) {
                config.target = TargetConfig::default();
            }
            if let TargetConfig::S3 { bucket, .. } = &mut config.target {
                *bucket = new_bucket;
            }
        }

        if let TargetConfig::S3 {
            region,
            endpoint,
            force_path_style,
            ..
        } = &mut config.target
        {
            if self.region.is_some() {
                *region = self.region;
            }
            if self.s3_endpoint.is_some() {
                *endpoint = self.s3_endpoint;
                *force_path_style = true;
            }
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // 1. RUST_LOG environment variable has highest precedence
    // 2. --log / INGEST_LOG is used if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    // A broken configuration is the one failure the scheduler should see.
    let config = cli.into_config()?;
    config.validate().context("Invalid ingest configuration")?;

    // Cycle failures are logged and the run completes; the next scheduled
    // invocation starts from scratch.
    if let Err(e) = snapshot_ingestor::run(&config).await {
        tracing::error!("Ingestion cycle failed: {:?}", e);
    }

    Ok(())
}
