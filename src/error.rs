//! Error types for warehouse, storage and provisioning operations.

use thiserror::Error;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// E001: Required setting missing or invalid
    E001InvalidConfig,
    /// E002: Partition key or location rejected
    E002InvalidPartition,
    /// E003: Warehouse catalog statement failed
    E003CatalogFailure,
    /// E004: Object storage read, write or listing failed
    E004StorageFailure,
    /// E005: Parquet or CSV encoding/decoding failed
    E005CodecFailure,
    /// E006: External tool (terraform, dbt) failed with a non-tolerated error
    E006ProvisionFailure,
    /// E007: Dataset download failed or returned unusable content
    E007DownloadFailure,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::E001InvalidConfig => "E001",
            Self::E002InvalidPartition => "E002",
            Self::E003CatalogFailure => "E003",
            Self::E004StorageFailure => "E004",
            Self::E005CodecFailure => "E005",
            Self::E006ProvisionFailure => "E006",
            Self::E007DownloadFailure => "E007",
        }
    }
}

/// Errors raised by the partition lifecycle components
#[derive(Debug, Error)]
pub enum DwhError {
    #[error("[{code}] Invalid configuration: {message}")]
    InvalidConfig { code: &'static str, message: String },

    #[error("[{code}] Invalid partition: {message}")]
    InvalidPartition { code: &'static str, message: String },

    #[error("[{code}] Catalog statement failed: {message}")]
    Catalog { code: &'static str, message: String },

    #[error("[{code}] Storage operation failed: {message}")]
    Storage { code: &'static str, message: String },

    #[error("[{code}] Codec failure: {message}")]
    Codec { code: &'static str, message: String },

    #[error("[{code}] Provisioning failed: {message}")]
    Provision { code: &'static str, message: String },

    #[error("[{code}] Download failed: {message}")]
    Download { code: &'static str, message: String },
}

impl DwhError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            code: ErrorCode::E001InvalidConfig.as_str(),
            message: message.into(),
        }
    }

    pub fn invalid_partition(message: impl Into<String>) -> Self {
        Self::InvalidPartition {
            code: ErrorCode::E002InvalidPartition.as_str(),
            message: message.into(),
        }
    }

    pub fn catalog(message: impl Into<String>) -> Self {
        Self::Catalog {
            code: ErrorCode::E003CatalogFailure.as_str(),
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            code: ErrorCode::E004StorageFailure.as_str(),
            message: message.into(),
        }
    }

    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            code: ErrorCode::E005CodecFailure.as_str(),
            message: message.into(),
        }
    }

    pub fn provision(message: impl Into<String>) -> Self {
        Self::Provision {
            code: ErrorCode::E006ProvisionFailure.as_str(),
            message: message.into(),
        }
    }

    pub fn download(message: impl Into<String>) -> Self {
        Self::Download {
            code: ErrorCode::E007DownloadFailure.as_str(),
            message: message.into(),
        }
    }

    /// Stable code of this error (e.g. "E003").
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { code, .. }
            | Self::InvalidPartition { code, .. }
            | Self::Catalog { code, .. }
            | Self::Storage { code, .. }
            | Self::Codec { code, .. }
            | Self::Provision { code, .. }
            | Self::Download { code, .. } => *code,
        }
    }
}

impl From<opendal::Error> for DwhError {
    fn from(err: opendal::Error) -> Self {
        Self::storage(err.to_string())
    }
}

impl From<sqlx::Error> for DwhError {
    fn from(err: sqlx::Error) -> Self {
        Self::catalog(err.to_string())
    }
}

impl From<reqwest::Error> for DwhError {
    fn from(err: reqwest::Error) -> Self {
        Self::download(err.to_string())
    }
}

impl From<parquet::errors::ParquetError> for DwhError {
    fn from(err: parquet::errors::ParquetError) -> Self {
        Self::codec(err.to_string())
    }
}

impl From<arrow::error::ArrowError> for DwhError {
    fn from(err: arrow::error::ArrowError) -> Self {
        Self::codec(err.to_string())
    }
}

/// Result type alias for DwhError
pub type Result<T> = std::result::Result<T, DwhError>;
