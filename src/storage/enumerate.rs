//! Partition discovery by prefix listing.
//!
//! Listing goes through OpenDAL's lister. Each request asks for at most
//! [`LIST_PAGE_SIZE`] keys; on S3 the lister re-issues ListObjectsV2 with the
//! continuation token until the response is no longer truncated, and the
//! entry stream ends only after the last page. Callers never see page
//! boundaries.

use futures::TryStreamExt;
use tracing::{debug, info};

use super::Storage;
use crate::error::{DwhError, Result};
use crate::partition::{dedup_by_year, normalize_prefix, parse_year, PartitionSpec};

/// Keys requested per listing call.
pub const LIST_PAGE_SIZE: usize = 1000;

/// Immediate child folders of `prefix` (delimiter listing, non-recursive).
///
/// Returned keys end with `/`. Order follows the listing.
pub async fn enumerate_partition_prefixes(storage: &Storage, prefix: &str) -> Result<Vec<String>> {
    let prefix = normalize_prefix(prefix);
    let mut lister = storage
        .operator()
        .lister_with(&prefix)
        .limit(LIST_PAGE_SIZE)
        .await
        .map_err(|e| DwhError::storage(format!("Failed to list '{}': {}", prefix, e)))?;

    let mut folders = Vec::new();
    while let Some(entry) = lister
        .try_next()
        .await
        .map_err(|e| DwhError::storage(format!("Failed to list '{}': {}", prefix, e)))?
    {
        let path = entry.path();
        if path == prefix {
            continue;
        }
        if entry.metadata().mode().is_dir() {
            folders.push(path.to_string());
        }
    }

    debug!(prefix = %prefix, count = folders.len(), "Listed partition folders");
    Ok(folders)
}

/// Every file below `prefix`, at any depth.
pub async fn list_objects_recursive(storage: &Storage, prefix: &str) -> Result<Vec<String>> {
    let prefix = normalize_prefix(prefix);
    let mut lister = storage
        .operator()
        .lister_with(&prefix)
        .recursive(true)
        .limit(LIST_PAGE_SIZE)
        .await
        .map_err(|e| DwhError::storage(format!("Failed to list '{}': {}", prefix, e)))?;

    let mut files = Vec::new();
    while let Some(entry) = lister
        .try_next()
        .await
        .map_err(|e| DwhError::storage(format!("Failed to list '{}': {}", prefix, e)))?
    {
        if entry.metadata().mode().is_file() {
            files.push(entry.path().to_string());
        }
    }

    Ok(files)
}

/// Discover one partition per year folder under `prefix`.
///
/// Folders without a `year=YYYY` key are skipped. Duplicate years keep the
/// first folder listed.
pub async fn discover_partitions(storage: &Storage, prefix: &str) -> Result<Vec<PartitionSpec>> {
    let folders = enumerate_partition_prefixes(storage, prefix).await?;

    let mut specs = Vec::with_capacity(folders.len());
    for folder in folders {
        match parse_year(&folder) {
            Some(year) => specs.push(PartitionSpec::new(year, storage.uri(&folder))),
            None => debug!(folder = %folder, "No year key in folder; skipping"),
        }
    }

    let specs = dedup_by_year(specs);
    info!(prefix = %prefix, partitions = specs.len(), "Discovered partitions");
    Ok(specs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opendal::{services, Operator};

    async fn storage_with(keys: &[&str]) -> Storage {
        let op = Operator::new(services::Memory::default()).unwrap().finish();
        for key in keys {
            op.write(key, b"x".to_vec()).await.unwrap();
        }
        Storage::new(op, "bucket")
    }

    #[tokio::test]
    async fn lists_only_immediate_folders() {
        let storage = storage_with(&[
            "processed/year=1985/part-0.parquet",
            "processed/year=1990/part-0.parquet",
            "processed/year=1990/nested/deep.parquet",
            "processed/_SUCCESS",
        ])
        .await;

        let mut folders = enumerate_partition_prefixes(&storage, "processed").await.unwrap();
        folders.sort();
        assert_eq!(
            folders,
            vec![
                "processed/year=1985/".to_string(),
                "processed/year=1990/".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn discovers_non_contiguous_years_and_skips_other_folders() {
        let storage = storage_with(&[
            "processed/year=1933/a.parquet",
            "processed/year=2009/b.parquet",
            "processed/tmp/c.parquet",
        ])
        .await;

        let mut specs = discover_partitions(&storage, "processed/").await.unwrap();
        specs.sort();
        assert_eq!(
            specs,
            vec![
                PartitionSpec::new(1933, "s3://bucket/processed/year=1933/"),
                PartitionSpec::new(2009, "s3://bucket/processed/year=2009/"),
            ]
        );
    }

    #[tokio::test]
    async fn recursive_listing_returns_files() {
        let storage = storage_with(&[
            "legacy/Year=1981/Month=1/data.parquet/part-0.parquet",
            "legacy/Year=1982/data.parquet/part-1.parquet",
        ])
        .await;

        let mut files = list_objects_recursive(&storage, "legacy/").await.unwrap();
        files.sort();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("part-0.parquet"));
    }

    #[tokio::test]
    async fn listing_spans_more_than_one_page() {
        let op = Operator::new(services::Memory::default()).unwrap().finish();
        let years: Vec<i32> = (1000..1000 + 2 * LIST_PAGE_SIZE as i32 + 7).collect();
        for year in &years {
            op.write(&format!("processed/year={}/part-0.parquet", year), b"x".to_vec())
                .await
                .unwrap();
        }
        let storage = Storage::new(op, "bucket");

        let specs = discover_partitions(&storage, "processed/").await.unwrap();
        let mut found: Vec<i32> = specs.iter().map(|s| s.year).collect();
        found.sort();
        assert_eq!(found, years);

        let files = list_objects_recursive(&storage, "processed/").await.unwrap();
        assert_eq!(files.len(), years.len());
    }

    #[tokio::test]
    async fn empty_prefix_yields_nothing() {
        let storage = storage_with(&[]).await;
        assert!(discover_partitions(&storage, "processed/").await.unwrap().is_empty());
    }
}
