use super::{FsConfig, LogFormat, RuntimeConfig, StorageBackend};
use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;

pub const ENV_PREFIX: &str = "AIRCRASH_";

/// Abstraction over environment-variable lookups so tests can supply their
/// own source of overrides.
pub trait EnvSource {
    /// Get a variable with the AIRCRASH_ prefix applied.
    fn get(&self, key: &str) -> Option<String>;

    /// Get a variable WITHOUT the AIRCRASH_ prefix.
    /// Used for the standard names shared with the rest of the pipeline
    /// (REDSHIFT_HOST, S3_BUCKET, ...).
    fn get_raw(&self, key: &str) -> Option<String>;
}

/// In-memory environment keyed by full variable name.
#[derive(Debug, Default, Clone)]
pub struct MapEnvSource {
    vars: HashMap<String, String>,
}

impl MapEnvSource {
    pub fn new<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl EnvSource for MapEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        self.vars.get(&format!("{}{}", ENV_PREFIX, key)).cloned()
    }

    fn get_raw(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

/// Apply environment-variable overrides (highest priority) to the runtime config.
pub fn apply_env_overrides<E: EnvSource>(config: &mut RuntimeConfig, env: &E) -> Result<()> {
    // Warehouse connection (standard names)
    if let Some(host) = get_raw_env_string(env, "REDSHIFT_HOST") {
        config.warehouse.host = host;
    }
    if let Some(port) = get_raw_env_string(env, "REDSHIFT_PORT") {
        config.warehouse.port = port
            .parse::<u16>()
            .map_err(|e| anyhow!("Failed to parse REDSHIFT_PORT: {}", e))?;
    }
    if let Some(db) = get_raw_env_string(env, "REDSHIFT_DB") {
        config.warehouse.database = db;
    }
    if let Some(user) = get_raw_env_string(env, "REDSHIFT_USER") {
        config.warehouse.user = user;
    }
    if let Some(password) = get_raw_env_string(env, "REDSHIFT_PASSWORD") {
        config.warehouse.password = password;
    }
    if let Some(role) = get_raw_env_string(env, "REDSHIFT_ROLE_ARN") {
        config.warehouse.role_arn = Some(role);
    }
    if let Some(val) = get_env_bool(env, "REQUIRE_SSL")? {
        config.warehouse.require_ssl = val;
    }

    // Storage
    if let Some(bucket) = get_raw_env_string(env, "S3_BUCKET") {
        config.storage.bucket = bucket;
    }
    if let Some(region) = get_raw_env_string(env, "AWS_REGION") {
        config.storage.region = region;
    }
    if let Some(endpoint) = get_raw_env_string(env, "AWS_ENDPOINT_URL") {
        config.storage.endpoint = Some(endpoint);
    }
    if let Some(backend) = get_env_string(env, "STORAGE_BACKEND") {
        config.storage.backend = backend
            .parse::<StorageBackend>()
            .context("Invalid AIRCRASH_STORAGE_BACKEND value")?;
    }
    if let Some(path) = get_env_string(env, "STORAGE_PATH") {
        config.storage.fs.get_or_insert_with(FsConfig::default).path = path;
    }

    // Layout
    if let Some(key) = get_env_string(env, "RAW_KEY") {
        config.layout.raw_key = key;
    }
    if let Some(prefix) = get_env_string(env, "PROCESSED_PREFIX") {
        config.layout.processed_prefix = crate::partition::normalize_prefix(&prefix);
    }
    if let Some(prefix) = get_env_string(env, "LEGACY_PREFIX") {
        config.layout.legacy_prefix = crate::partition::normalize_prefix(&prefix);
    }

    // Catalog names
    if let Some(schema) = get_env_string(env, "CATALOG_SCHEMA") {
        config.catalog.schema = schema;
    }
    if let Some(table) = get_env_string(env, "CATALOG_TABLE") {
        config.catalog.table = table;
    }
    if let Some(db) = get_env_string(env, "EXTERNAL_DATABASE") {
        config.catalog.external_database = db;
    }

    // Provisioning and profiles
    if let Some(dir) = get_env_string(env, "TERRAFORM_DIR") {
        config.provision.terraform_dir = dir;
    }
    if let Some(bin) = get_env_string(env, "TERRAFORM_BIN") {
        config.provision.terraform_bin = bin;
    }
    if let Some(path) = get_raw_env_string(env, "TF_OUTPUTS_PATH") {
        config.provision.outputs_path = path;
    }
    if let Some(list) = get_env_string(env, "TOLERATED_ERRORS") {
        config.provision.tolerated_errors = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }
    if let Some(dir) = get_raw_env_string(env, "DBT_PROFILES_DIR") {
        config.profiles.dir = Some(dir);
    }
    if let Some(bin) = get_env_string(env, "DBT_BIN") {
        config.dbt.bin = bin;
    }
    if let Some(dir) = get_env_string(env, "DBT_PROJECT_DIR") {
        config.dbt.project_dir = dir;
    }

    // Ingest
    if let Some(url) = get_env_string(env, "SOURCE_URL") {
        config.ingest.source_url = url;
    }

    // Logging
    if let Some(level) = get_env_string(env, "LOG_LEVEL") {
        config.log.level = level;
    }
    if let Some(format) = get_env_string(env, "LOG_FORMAT") {
        config.log.format = match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };
    }

    Ok(())
}

fn get_env_string<E: EnvSource>(env: &E, key: &str) -> Option<String> {
    env.get(key).filter(|v| !v.is_empty())
}

fn get_raw_env_string<E: EnvSource>(env: &E, key: &str) -> Option<String> {
    env.get_raw(key).filter(|v| !v.is_empty())
}

fn get_env_bool<E: EnvSource>(env: &E, key: &str) -> Result<Option<bool>> {
    match get_env_string(env, key) {
        Some(val) => {
            let parsed = val.parse::<bool>().map_err(|e| {
                anyhow!(
                    "Failed to parse {}{} (expected bool): {}",
                    ENV_PREFIX,
                    key,
                    e
                )
            })?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_names_fill_warehouse_and_bucket() {
        let env = MapEnvSource::new([
            ("REDSHIFT_HOST", "demo.example.com"),
            ("REDSHIFT_PORT", "5440"),
            ("REDSHIFT_DB", "demo_db"),
            ("REDSHIFT_USER", "admin"),
            ("REDSHIFT_PASSWORD", "secret"),
            ("REDSHIFT_ROLE_ARN", "arn:aws:iam::1:role/spectrum"),
            ("S3_BUCKET", "crash-bucket"),
        ]);
        let mut config = RuntimeConfig::default();
        apply_env_overrides(&mut config, &env).unwrap();

        assert_eq!(config.warehouse.host, "demo.example.com");
        assert_eq!(config.warehouse.port, 5440);
        assert_eq!(config.warehouse.database, "demo_db");
        assert_eq!(config.warehouse.password, "secret");
        assert_eq!(
            config.warehouse.role_arn.as_deref(),
            Some("arn:aws:iam::1:role/spectrum")
        );
        assert_eq!(config.storage.bucket, "crash-bucket");
    }

    #[test]
    fn prefixed_names_override_layout_and_logging() {
        let env = MapEnvSource::new([
            ("AIRCRASH_PROCESSED_PREFIX", "processed"),
            ("AIRCRASH_LOG_FORMAT", "JSON"),
            ("AIRCRASH_STORAGE_BACKEND", "fs"),
            ("AIRCRASH_STORAGE_PATH", "/tmp/data"),
            ("AIRCRASH_TOLERATED_ERRORS", "already exists, Duplicate ,"),
        ]);
        let mut config = RuntimeConfig::default();
        apply_env_overrides(&mut config, &env).unwrap();

        assert_eq!(config.layout.processed_prefix, "processed/");
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.storage.backend, StorageBackend::Fs);
        assert_eq!(config.storage.fs.unwrap().path, "/tmp/data");
        assert_eq!(
            config.provision.tolerated_errors,
            vec!["already exists".to_string(), "Duplicate".to_string()]
        );
    }

    #[test]
    fn malformed_port_is_an_error() {
        let env = MapEnvSource::new([("REDSHIFT_PORT", "fifty")]);
        let mut config = RuntimeConfig::default();
        assert!(apply_env_overrides(&mut config, &env).is_err());
    }
}
