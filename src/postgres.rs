// ABOUTME: PostgreSQL connection helpers for the source database
// ABOUTME: Builds a TLS-capable tokio-postgres client with UTC session time zone

use anyhow::{Context, Result};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use std::time::Duration;
use tokio_postgres::Client;

use crate::utils::{redact_url, retry_with_backoff};

const CONNECT_RETRIES: u32 = 3;
const CONNECT_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Connect to PostgreSQL once.
///
/// TLS is negotiated according to the `sslmode` in the URL. The session time
/// zone is pinned to UTC so that `timestamp` columns compare consistently
/// against the `timestamptz` watermarks.
pub async fn connect(url: &str, allow_self_signed_certs: bool) -> Result<Client> {
    let connector = TlsConnector::builder()
        .danger_accept_invalid_certs(allow_self_signed_certs)
        .build()
        .context("Failed to build TLS connector")?;
    let tls = MakeTlsConnector::new(connector);

    let (client, connection) = tokio_postgres::connect(url, tls)
        .await
        .with_context(|| format!("Failed to connect to {}", redact_url(url)))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Source connection error: {}", e);
        }
    });

    client
        .batch_execute("SET TIME ZONE 'UTC'")
        .await
        .context("Failed to set session time zone")?;

    Ok(client)
}

/// Connect to PostgreSQL, retrying transient failures with exponential backoff.
pub async fn connect_with_retry(url: &str, allow_self_signed_certs: bool) -> Result<Client> {
    retry_with_backoff(
        || connect(url, allow_self_signed_certs),
        CONNECT_RETRIES,
        CONNECT_INITIAL_DELAY,
        "Source database connection",
    )
    .await
}
