//! Object storage access.
//!
//! Wraps an OpenDAL operator rooted at the bucket together with the bucket
//! name, so keys can be turned into the `s3://` locations the catalog sees.

mod enumerate;

use opendal::Operator;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::{DwhError, Result};

pub use enumerate::{discover_partitions, enumerate_partition_prefixes, list_objects_recursive};

/// Bucket-rooted storage handle.
#[derive(Clone, Debug)]
pub struct Storage {
    operator: Operator,
    bucket: String,
}

impl Storage {
    pub fn new(operator: Operator, bucket: impl Into<String>) -> Self {
        Self {
            operator,
            bucket: bucket.into(),
        }
    }

    /// Build the operator for the configured backend.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        if config.bucket.is_empty() {
            return Err(DwhError::invalid_config("storage bucket is not set"));
        }

        let operator = match config.backend {
            StorageBackend::Fs => {
                let fs = config.fs.as_ref().ok_or_else(|| {
                    DwhError::invalid_config("fs config required for filesystem backend")
                })?;

                let fs_builder = opendal::services::Fs::default().root(&fs.path);
                Operator::new(fs_builder)
                    .map_err(|e| {
                        DwhError::storage(format!("Failed to create filesystem operator: {}", e))
                    })?
                    .finish()
            }
            StorageBackend::S3 => {
                let mut s3_builder = opendal::services::S3::default()
                    .bucket(&config.bucket)
                    .region(&config.region);

                if let Some(endpoint) = &config.endpoint {
                    s3_builder = s3_builder.endpoint(endpoint);
                }

                Operator::new(s3_builder)
                    .map_err(|e| DwhError::storage(format!("Failed to create S3 operator: {}", e)))?
                    .finish()
            }
        };

        tracing::debug!(backend = %config.backend, bucket = %config.bucket, "Storage operator initialized");
        Ok(Self::new(operator, config.bucket.clone()))
    }

    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Catalog-facing URI for a key, e.g. `s3://bucket/processed/year=1985/`.
    pub fn uri(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key.trim_start_matches('/'))
    }

    pub async fn read(&self, key: &str) -> Result<bytes::Bytes> {
        let buffer = self
            .operator
            .read(key)
            .await
            .map_err(|e| DwhError::storage(format!("Failed to read '{}': {}", key, e)))?;
        Ok(buffer.to_bytes())
    }

    pub async fn write(&self, key: &str, data: Vec<u8>) -> Result<()> {
        self.operator
            .write(key, data)
            .await
            .map_err(|e| DwhError::storage(format!("Failed to write '{}': {}", key, e)))?;
        Ok(())
    }

    /// Delete everything under `prefix`.
    pub async fn remove_prefix(&self, prefix: &str) -> Result<()> {
        self.operator
            .remove_all(prefix)
            .await
            .map_err(|e| DwhError::storage(format!("Failed to clear '{}': {}", prefix, e)))
    }
}
