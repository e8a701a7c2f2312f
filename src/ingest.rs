//! Download the public crash dataset into the raw object.
//!
//! The body must parse as a crash CSV with at least one row before it
//! replaces whatever is stored at the raw key.

use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info};

use crate::config::IngestConfig;
use crate::error::{DwhError, Result};
use crate::storage::Storage;
use crate::transform::parse_csv;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub source_url: String,
    pub key: String,
    pub bytes: usize,
    pub rows: usize,
}

/// GET the configured dataset URL.
pub async fn fetch(config: &IngestConfig) -> Result<Bytes> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(concat!("aircrash-dwh/", env!("CARGO_PKG_VERSION")))
        .build()?;

    debug!(url = %config.source_url, "Downloading dataset");
    let response = client.get(&config.source_url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(DwhError::download(format!(
            "GET {} returned {}",
            config.source_url, status
        )));
    }
    Ok(response.bytes().await?)
}

/// Check that `data` is a crash CSV, then write it to `raw_key`.
/// Returns the number of data rows.
pub async fn store_raw(storage: &Storage, raw_key: &str, data: Bytes) -> Result<usize> {
    let (_, report) = parse_csv(&data).map_err(|e| {
        DwhError::download(format!("downloaded content is not a crash CSV: {}", e))
    })?;
    if report.rows_read == 0 {
        return Err(DwhError::download("downloaded CSV has a header but no rows"));
    }

    storage.write(raw_key, data.to_vec()).await?;
    Ok(report.rows_read)
}

/// Download the dataset and store it at `raw_key`.
pub async fn run_ingest(
    config: &IngestConfig,
    storage: &Storage,
    raw_key: &str,
) -> Result<IngestReport> {
    info!(url = %config.source_url, key = %raw_key, "Starting ingest");
    let data = fetch(config).await?;
    let bytes = data.len();
    let rows = store_raw(storage, raw_key, data).await?;

    info!(bytes, rows, path = %storage.uri(raw_key), "Ingest complete");
    Ok(IngestReport {
        source_url: config.source_url.clone(),
        key: raw_key.to_string(),
        bytes,
        rows,
    })
}
