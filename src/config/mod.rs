// Runtime configuration
//
// Sources, highest priority first:
// 1. Environment variables (AIRCRASH_* plus the standard REDSHIFT_*, S3_BUCKET,
//    AWS_REGION, TF_OUTPUTS_PATH, DBT_PROFILES_DIR names)
// 2. Config file from --config, AIRCRASH_CONFIG, or ./aircrash.toml
// 3. Defaults
//
// A .env file in the working directory is loaded into the process
// environment before any of the above are read.

use anyhow::Result;
use serde::{Deserialize, Serialize};

mod env_overrides;
mod sources;
mod validation;

pub use env_overrides::{EnvSource, MapEnvSource, ENV_PREFIX};
pub use validation::Requirement;

/// Main runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub warehouse: WarehouseConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub layout: LayoutConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub provision: ProvisionConfig,

    #[serde(default)]
    pub dbt: DbtConfig,

    #[serde(default)]
    pub profiles: ProfilesConfig,

    #[serde(default)]
    pub log: LogConfig,
}

/// Warehouse connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_warehouse_port")]
    pub port: u16,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub user: String,
    /// Only ever supplied through the environment.
    #[serde(default, skip_serializing)]
    pub password: String,
    /// IAM role the external schema assumes to read storage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,
    #[serde(default = "default_true")]
    pub require_ssl: bool,
}

fn default_warehouse_port() -> u16 {
    5439
}

fn default_true() -> bool {
    true
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_warehouse_port(),
            database: String::new(),
            user: String::new(),
            password: String::new(),
            role_arn: None,
            require_ssl: true,
        }
    }
}

/// Object storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Bucket name; also used to build `s3://` locations for the catalog
    #[serde(default)]
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs: Option<FsConfig>,
}

fn default_region() -> String {
    "us-west-2".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::S3,
            bucket: String::new(),
            region: default_region(),
            endpoint: None,
            fs: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Fs,
    S3,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Fs => write!(f, "fs"),
            StorageBackend::S3 => write!(f, "s3"),
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fs" | "filesystem" => Ok(StorageBackend::Fs),
            "s3" | "aws" => Ok(StorageBackend::S3),
            _ => anyhow::bail!("Unsupported storage backend: {}. Supported: fs, s3", s),
        }
    }
}

/// Local directory standing in for the bucket root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsConfig {
    pub path: String,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            path: "./data".to_string(),
        }
    }
}

/// Object key layout inside the bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Raw CSV export of the crash dataset
    pub raw_key: String,
    /// Canonical `year=YYYY/` layout read by the external table
    pub processed_prefix: String,
    /// Legacy `Year=YYYY/` layout migrated by `repartition`
    pub legacy_prefix: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            raw_key: "plane_crashes/raw_hf_airplane_crashes.csv".to_string(),
            processed_prefix: "plane_crashes/processed_parquet/".to_string(),
            legacy_prefix: "plane_crashes/processed_parquet_year_only/".to_string(),
        }
    }
}

/// External schema and table names
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub schema: String,
    pub table: String,
    /// Data-catalog database backing the external schema
    pub external_database: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            schema: "spectrum_schema".to_string(),
            table: "airplane_crashes_parquet".to_string(),
            external_database: "airplane_crashes".to_string(),
        }
    }
}

/// Public dataset download into `layout.raw_key`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// HTTP(S) URL of the crash dataset CSV
    pub source_url: String,
    pub timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            source_url: "https://huggingface.co/datasets/nateraw/airplane-crashes-and-fatalities/resolve/main/Airplane_Crashes_and_Fatalities_Since_1908.csv".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Infrastructure tool invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    pub terraform_bin: String,
    pub terraform_dir: String,
    /// Where `terraform output -json` is written and read back from
    pub outputs_path: String,
    /// Error text that does not fail an apply (resources that already exist)
    pub tolerated_errors: Vec<String>,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            terraform_bin: "terraform".to_string(),
            terraform_dir: "terraform".to_string(),
            outputs_path: "terraform/tf_outputs.json".to_string(),
            tolerated_errors: vec![
                "InvalidPermission.Duplicate".to_string(),
                "EntityAlreadyExists".to_string(),
                "InvalidGroup.Duplicate".to_string(),
                "already exists".to_string(),
            ],
        }
    }
}

/// dbt model run after profiles are written
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DbtConfig {
    pub bin: String,
    /// dbt project directory, where `dbt run` is executed
    pub project_dir: String,
}

impl Default for DbtConfig {
    fn default() -> Self {
        Self {
            bin: "dbt".to_string(),
            project_dir: "aircrash_dwh".to_string(),
        }
    }
}

/// dbt profile generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilesConfig {
    /// Defaults to `$HOME/.dbt`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    pub profile_name: String,
    pub target: String,
    pub schema: String,
    pub threads: u16,
}

impl Default for ProfilesConfig {
    fn default() -> Self {
        Self {
            dir: None,
            profile_name: "aircrash_dwh".to_string(),
            target: "dev".to_string(),
            schema: "public".to_string(),
            threads: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl RuntimeConfig {
    /// Load from `.env`, the default file locations, and the process environment.
    pub fn load() -> Result<Self> {
        sources::load_config(None)
    }

    /// Load with an explicit config file (CLI `--config`).
    pub fn load_from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        sources::load_config(Some(path.as_ref()))
    }

    /// Parse TOML content and layer overrides from `env` on top.
    pub fn from_toml_with_env<E: EnvSource>(content: &str, env: &E) -> Result<Self> {
        let mut config: RuntimeConfig = toml::from_str(content)?;
        config.apply_env_overrides_from(env)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides from a custom source.
    pub fn apply_env_overrides_from<E: EnvSource>(&mut self, env: &E) -> Result<()> {
        env_overrides::apply_env_overrides(self, env)
    }

    /// Validate the general shape of the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    /// Fail unless every setting needed by a command is present.
    pub fn require(&self, requirements: &[Requirement]) -> Result<()> {
        validation::validate_requirements(self, requirements)
    }

    /// Bucket URI prefix used for catalog locations, e.g. `s3://bucket/`.
    pub fn bucket_uri(&self) -> String {
        format!("s3://{}/", self.storage.bucket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_backend_from_str() {
        assert_eq!("fs".parse::<StorageBackend>().unwrap(), StorageBackend::Fs);
        assert_eq!("s3".parse::<StorageBackend>().unwrap(), StorageBackend::S3);
        assert_eq!(
            "filesystem".parse::<StorageBackend>().unwrap(),
            StorageBackend::Fs
        );
        assert!("gcs".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_default_configs() {
        let config = RuntimeConfig::default();
        assert_eq!(config.warehouse.port, 5439);
        assert_eq!(config.storage.backend, StorageBackend::S3);
        assert_eq!(config.catalog.table, "airplane_crashes_parquet");
        assert_eq!(config.layout.processed_prefix, "plane_crashes/processed_parquet/");
        assert_eq!(config.provision.tolerated_errors.len(), 4);
        assert_eq!(config.log.format, LogFormat::Text);
    }

    #[test]
    fn test_toml_sections_are_optional() {
        let config = RuntimeConfig::from_toml_with_env(
            r#"
            [storage]
            backend = "fs"
            bucket = "local-bucket"

            [storage.fs]
            path = "/tmp/aircrash"

            [catalog]
            schema = "spectrum_schema"
            table = "crashes"
            external_database = "airplane_crashes"
            "#,
            &MapEnvSource::default(),
        )
        .unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Fs);
        assert_eq!(config.catalog.table, "crashes");
        assert_eq!(config.warehouse.port, 5439);
        assert_eq!(config.bucket_uri(), "s3://local-bucket/");
    }

    #[test]
    fn test_legacy_prefix_without_slash_still_overlaps() {
        let err = RuntimeConfig::from_toml_with_env(
            r#"
            [layout]
            legacy_prefix = "plane_crashes/processed_parquet"
            "#,
            &MapEnvSource::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("overlaps"), "{err}");
    }

    #[test]
    fn test_password_is_never_serialized() {
        let mut config = RuntimeConfig::default();
        config.warehouse.password = "hunter2".to_string();
        let rendered = toml::to_string(&config).unwrap();
        assert!(!rendered.contains("hunter2"));
    }
}
