// Initialization for CLI commands
//
// Logging setup and construction of the catalog and storage handles from
// RuntimeConfig.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::catalog::{Catalog, DryRunCatalog, ExternalSchema, RedshiftCatalog, TableRef};
use crate::config::{LogConfig, LogFormat, Requirement, RuntimeConfig};
use crate::storage::Storage;

/// Initialize tracing from LogConfig. Repeated calls keep the first subscriber.
pub fn init_tracing(config: &LogConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    // Logs go to stderr so dry-run SQL on stdout stays clean
    let _ = match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().json().with_writer(std::io::stderr)),
        ),
        LogFormat::Text => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().with_writer(std::io::stderr)),
        ),
    };
}

/// The managed external table.
pub fn table_ref(config: &RuntimeConfig) -> Result<TableRef> {
    Ok(TableRef::new(&config.catalog.schema, &config.catalog.table)?)
}

pub fn external_schema(config: &RuntimeConfig) -> Result<ExternalSchema> {
    config.require(&[Requirement::RoleArn])?;
    let role = config.warehouse.role_arn.clone().unwrap_or_default();
    Ok(ExternalSchema::new(
        &config.catalog.schema,
        &config.catalog.external_database,
        &role,
    )?)
}

/// Warehouse connection, or a printing stand-in for `--dry-run`.
pub async fn init_catalog(config: &RuntimeConfig, dry_run: bool) -> Result<Arc<dyn Catalog>> {
    if dry_run {
        info!("Dry run: statements are printed, not executed");
        return Ok(Arc::new(DryRunCatalog));
    }

    config.require(&[Requirement::Warehouse])?;
    let catalog = RedshiftCatalog::connect(&config.warehouse)
        .await
        .context("Failed to connect to the warehouse")?;
    Ok(Arc::new(catalog))
}

pub fn init_storage(config: &RuntimeConfig) -> Result<Storage> {
    config.require(&[Requirement::Bucket])?;
    info!(
        backend = %config.storage.backend,
        bucket = %config.storage.bucket,
        "Initializing storage"
    );
    Storage::from_config(&config.storage).context("Failed to initialize storage")
}
