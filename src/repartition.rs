//! Rewrite a legacy partition layout into canonical year folders.
//!
//! Legacy files live at keys such as
//! `{legacy}/Year=1985/data.parquet/part-0.parquet` or
//! `{legacy}/Year=1985/Month=3/...`. Each file is decoded in memory and
//! re-encoded as snappy Parquet under `{output}year=1985/`.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::error::{DwhError, Result};
use crate::parquet::{decode_batches, encode_batches, SNAPPY_PARQUET_SUFFIX};
use crate::partition::{normalize_prefix, parse_year, partition_folder, prefixes_overlap};
use crate::storage::{list_objects_recursive, Storage};

/// What happens to files already present in a destination year folder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RewriteMode {
    /// Clear each destination year folder once per run, just before the
    /// first successful write into it.
    #[default]
    TruncatePartition,
    /// Leave existing files; same-source rewrites still overwrite in place.
    Append,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RewriteReport {
    /// Source `.parquet` files with a year key.
    pub discovered: usize,
    pub rewritten: usize,
    pub failed: usize,
    /// Source keys that failed, in processing order.
    pub failed_paths: Vec<String>,
    /// Destination year folders written to.
    pub years: BTreeSet<i32>,
}

impl RewriteReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Migrates every legacy file under one prefix into another.
pub struct Rewriter<'a> {
    storage: &'a Storage,
    legacy_prefix: String,
    output_prefix: String,
    mode: RewriteMode,
}

impl<'a> Rewriter<'a> {
    pub fn new(storage: &'a Storage, legacy_prefix: &str, output_prefix: &str) -> Self {
        Self {
            storage,
            legacy_prefix: normalize_prefix(legacy_prefix),
            output_prefix: normalize_prefix(output_prefix),
            mode: RewriteMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: RewriteMode) -> Self {
        self.mode = mode;
        self
    }

    /// Rewrite every legacy file. Overlapping prefixes and listing failures
    /// are fatal; per-file failures are logged, counted, and skipped.
    pub async fn run(&self) -> Result<RewriteReport> {
        if prefixes_overlap(&self.legacy_prefix, &self.output_prefix) {
            return Err(DwhError::invalid_config(format!(
                "legacy prefix '{}' and output prefix '{}' overlap",
                self.legacy_prefix, self.output_prefix
            )));
        }

        let sources = self.sources().await?;
        info!(
            legacy = %self.legacy_prefix,
            output = %self.output_prefix,
            files = sources.len(),
            mode = ?self.mode,
            "Starting repartition"
        );

        let mut report = RewriteReport {
            discovered: sources.len(),
            ..RewriteReport::default()
        };
        let mut cleared = BTreeSet::new();

        for (year, key) in sources {
            match self.rewrite_file(year, &key, &mut cleared).await {
                Ok(destination) => {
                    debug!(year, source = %key, destination = %destination, "Rewrote file");
                    report.rewritten += 1;
                    report.years.insert(year);
                }
                Err(e) => {
                    warn!(year, path = %key, error = %e, "Failed to rewrite file");
                    report.failed += 1;
                    report.failed_paths.push(key);
                }
            }
        }

        info!(
            rewritten = report.rewritten,
            failed = report.failed,
            years = report.years.len(),
            "Repartition complete"
        );
        Ok(report)
    }

    /// Legacy `.parquet` files carrying a year key, paired with that year.
    async fn sources(&self) -> Result<Vec<(i32, String)>> {
        let files = list_objects_recursive(self.storage, &self.legacy_prefix).await?;

        let mut sources = Vec::new();
        for key in files {
            if !key.ends_with(".parquet") {
                continue;
            }
            let relative = key.strip_prefix(&self.legacy_prefix).unwrap_or(&key);
            match parse_year(relative) {
                Some(year) => sources.push((year, key)),
                None => debug!(path = %key, "No year key in path; skipping"),
            }
        }
        Ok(sources)
    }

    /// Decode and re-encode one file, then write it. In truncate mode the
    /// destination folder is cleared right before the first write for its
    /// year; a year whose clear fails is retried by its next file.
    async fn rewrite_file(
        &self,
        year: i32,
        key: &str,
        cleared: &mut BTreeSet<i32>,
    ) -> Result<String> {
        let data = self.storage.read(key).await?;
        let (schema, batches) = decode_batches(data)?;
        let encoded = encode_batches(schema, &batches)?;

        if self.mode == RewriteMode::TruncatePartition && !cleared.contains(&year) {
            let folder = partition_folder(&self.output_prefix, year);
            self.storage.remove_prefix(&folder).await?;
            debug!(year, path = %folder, "Cleared destination folder");
            cleared.insert(year);
        }

        let destination = output_key(&self.output_prefix, year, key);
        self.storage.write(&destination, encoded).await?;
        Ok(destination)
    }
}

/// Destination key for a source file, stable across runs.
pub fn output_key(output_prefix: &str, year: i32, source_key: &str) -> String {
    let digest = blake3::hash(source_key.as_bytes());
    let hash = hex::encode(&digest.as_bytes()[..8]);
    format!(
        "{}part-{}{}",
        partition_folder(output_prefix, year),
        hash,
        SNAPPY_PARQUET_SUFFIX
    )
}
