// Configuration validation
//
// General shape checks run on every load. Command-specific settings are
// checked through `Requirement`s before the command touches the network.

use super::*;
use crate::catalog::Ident;
use crate::error::DwhError;
use crate::partition::{is_root_prefix, key_under_prefix, prefixes_overlap};
use anyhow::{bail, Result};
use tracing::warn;

/// Settings a command cannot run without.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// REDSHIFT_HOST, REDSHIFT_DB, REDSHIFT_USER, REDSHIFT_PASSWORD
    Warehouse,
    /// REDSHIFT_ROLE_ARN
    RoleArn,
    /// S3_BUCKET
    Bucket,
    /// REDSHIFT_PASSWORD alone (profile generation)
    WarehousePassword,
}

pub fn validate_config(config: &RuntimeConfig) -> Result<()> {
    validate_storage_config(&config.storage)?;
    validate_layout_config(&config.layout)?;
    validate_catalog_config(&config.catalog)?;

    if config.warehouse.port == 0 {
        bail!("warehouse.port must be greater than 0");
    }

    let url = &config.ingest.source_url;
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("ingest.source_url must be an http(s) URL, got '{}'", url);
    }
    if config.ingest.timeout_secs == 0 {
        bail!("ingest.timeout_secs must be greater than 0");
    }

    if config.profiles.threads == 0 {
        bail!("profiles.threads must be greater than 0");
    }

    if config.provision.tolerated_errors.is_empty() {
        warn!("provision.tolerated_errors is empty; every apply failure will be fatal");
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<()> {
    if config.backend == StorageBackend::Fs {
        let fs = config
            .fs
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("fs storage backend requires 'fs' configuration"))?;

        if fs.path.is_empty() {
            bail!(
                "Filesystem path is required\n\n\
                How to fix:\n\
                  • Environment: export {}STORAGE_PATH=/data/aircrash\n\
                  • TOML: [storage.fs]\n              path = \"/data/aircrash\"\n",
                ENV_PREFIX
            );
        }
    }

    if config.backend == StorageBackend::S3 && config.region.is_empty() {
        bail!(
            "S3 region is required\n\n\
            How to fix:\n\
              • Environment: export AWS_REGION=us-west-2\n\
              • TOML: [storage]\n              region = \"us-west-2\"\n"
        );
    }

    Ok(())
}

fn validate_layout_config(config: &LayoutConfig) -> Result<()> {
    if config.raw_key.is_empty() || config.raw_key.ends_with('/') {
        bail!("layout.raw_key must name an object, got '{}'", config.raw_key);
    }
    if is_root_prefix(&config.processed_prefix) {
        bail!(
            "layout.processed_prefix must name a folder, got '{}'; \
            the transform clears it before writing",
            config.processed_prefix
        );
    }
    if prefixes_overlap(&config.processed_prefix, &config.legacy_prefix) {
        bail!(
            "layout.legacy_prefix '{}' overlaps layout.processed_prefix '{}'; \
            neither may equal or contain the other",
            config.legacy_prefix,
            config.processed_prefix
        );
    }
    if key_under_prefix(&config.raw_key, &config.processed_prefix) {
        bail!(
            "layout.raw_key '{}' lies under layout.processed_prefix '{}'",
            config.raw_key,
            config.processed_prefix
        );
    }
    Ok(())
}

fn validate_catalog_config(config: &CatalogConfig) -> Result<()> {
    Ident::new(&config.schema)?;
    Ident::new(&config.table)?;
    Ident::new(&config.external_database)?;
    Ok(())
}

pub fn validate_requirements(config: &RuntimeConfig, requirements: &[Requirement]) -> Result<()> {
    for requirement in requirements {
        match requirement {
            Requirement::Warehouse => {
                let w = &config.warehouse;
                require(&w.host, "REDSHIFT_HOST", "warehouse.host")?;
                require(&w.database, "REDSHIFT_DB", "warehouse.database")?;
                require(&w.user, "REDSHIFT_USER", "warehouse.user")?;
                require_password(config)?;
            }
            Requirement::WarehousePassword => require_password(config)?,
            Requirement::RoleArn => {
                let role = config.warehouse.role_arn.as_deref().unwrap_or_default();
                require(role, "REDSHIFT_ROLE_ARN", "warehouse.role_arn")?;
            }
            Requirement::Bucket => {
                require(&config.storage.bucket, "S3_BUCKET", "storage.bucket")?;
            }
        }
    }
    Ok(())
}

fn require_password(config: &RuntimeConfig) -> Result<()> {
    if config.warehouse.password.is_empty() {
        return Err(DwhError::invalid_config(
            "REDSHIFT_PASSWORD is required\n\n\
            How to fix:\n\
              • Environment: export REDSHIFT_PASSWORD=...\n\
              • .env file: REDSHIFT_PASSWORD=...\n\
            The password is never read from config files.",
        )
        .into());
    }
    Ok(())
}

fn require(value: &str, env_name: &str, toml_key: &str) -> Result<()> {
    if value.is_empty() {
        let (section, key) = toml_key.split_once('.').unwrap_or(("", toml_key));
        return Err(DwhError::invalid_config(format!(
            "{} is required\n\n\
            How to fix:\n\
              • Environment: export {}=...\n\
              • TOML: [{}]\n              {} = \"...\"\n",
            env_name, env_name, section, key
        ))
        .into());
    }
    Ok(())
}
