//! End-to-end flow: provision, ingest, transform, table, partitions,
//! profiles, dbt.
//!
//! Steps run in order and any fatal step stops the flow. Partition
//! failures are collected in the report instead. A dry run skips every
//! step that writes to storage or runs dbt, and prints catalog SQL.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::catalog::{
    create_external_table, BatchReport, Catalog, ExternalSchema, PartitionRegistry,
    TableDefinition, TableRef,
};
use crate::config::RuntimeConfig;
use crate::dbt;
use crate::ingest::{run_ingest, IngestReport};
use crate::init::init_catalog;
use crate::partition::normalize_prefix;
use crate::profiles;
use crate::provision::{self, ApplyOutcome};
use crate::record::arrow_schema;
use crate::storage::{discover_partitions, Storage};
use crate::transform::{run_transform, TransformReport};

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub skip_provision: bool,
    pub skip_ingest: bool,
    pub skip_transform: bool,
    pub skip_profiles: bool,
    pub skip_dbt: bool,
    /// Overwrite an existing profiles.yml without asking
    pub force_profiles: bool,
    pub home: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct PipelineReport {
    pub provision: Option<ApplyOutcome>,
    pub ingest: Option<IngestReport>,
    pub transform: Option<TransformReport>,
    pub partitions: BatchReport,
    pub profile_path: Option<PathBuf>,
    pub dbt_ran: bool,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        self.partitions.is_success()
    }
}

pub struct Pipeline<'a> {
    config: &'a RuntimeConfig,
    storage: Storage,
    external: ExternalSchema,
    table: TableRef,
    dry_run: bool,
    catalog: Option<Arc<dyn Catalog>>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a RuntimeConfig,
        storage: Storage,
        external: ExternalSchema,
        table: TableRef,
    ) -> Self {
        Self {
            config,
            storage,
            external,
            table,
            dry_run: false,
            catalog: None,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Use `catalog` instead of connecting after provisioning.
    pub fn with_catalog(mut self, catalog: Arc<dyn Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// The warehouse may only exist once provisioning has run, so the
    /// connection is opened here rather than up front.
    async fn catalog(&self) -> Result<Arc<dyn Catalog>> {
        match &self.catalog {
            Some(catalog) => Ok(catalog.clone()),
            None => init_catalog(self.config, self.dry_run).await,
        }
    }

    pub async fn run(&self, options: &PipelineOptions) -> Result<PipelineReport> {
        let mut report = PipelineReport::default();
        let layout = &self.config.layout;

        if options.skip_provision {
            info!("Skipping provisioning");
        } else {
            let outcome = provision::apply(&self.config.provision)
                .await
                .context("Provisioning failed")?;
            provision::refresh_outputs(&self.config.provision)
                .await
                .context("Failed to read terraform outputs")?;
            report.provision = Some(outcome);
        }

        if options.skip_ingest || self.dry_run {
            info!(dry_run = self.dry_run, "Skipping ingest");
        } else {
            let ingested = run_ingest(&self.config.ingest, &self.storage, &layout.raw_key)
                .await
                .context("Ingest failed")?;
            report.ingest = Some(ingested);
        }

        if options.skip_transform || self.dry_run {
            info!(dry_run = self.dry_run, "Skipping transform");
        } else {
            let transformed = run_transform(&self.storage, &layout.raw_key, &layout.processed_prefix)
                .await
                .context("Transform failed")?;
            report.transform = Some(transformed);
        }

        let catalog = self.catalog().await?;
        let processed = normalize_prefix(&layout.processed_prefix);
        let definition = TableDefinition::from_arrow(
            self.table.clone(),
            &arrow_schema(),
            self.storage.uri(&processed),
        )?;
        create_external_table(catalog.as_ref(), &self.external, definition)
            .await
            .context("Failed to create external table")?;

        let specs = discover_partitions(&self.storage, &processed)
            .await
            .context("Failed to discover partitions")?;
        let registry = PartitionRegistry::new(catalog, self.table.clone());
        report.partitions = registry.add_partitions(&specs).await;
        if !report.partitions.is_success() {
            warn!(
                failed = ?report.partitions.failed_years(),
                "Some partitions were not registered"
            );
        }

        if options.skip_profiles {
            info!("Skipping profile generation");
        } else {
            report.profile_path =
                profiles::generate(self.config, options.home.clone(), options.force_profiles)?;
        }

        if options.skip_dbt || self.dry_run {
            info!(dry_run = self.dry_run, "Skipping dbt run");
        } else {
            let profiles_dir = profiles::profiles_dir(self.config, options.home.clone())?;
            dbt::run_models(&self.config.dbt, &profiles_dir, &self.config.profiles.target)
                .await
                .context("dbt run failed")?;
            report.dbt_ran = true;
        }

        info!(
            partitions = report.partitions.succeeded.len(),
            failed = report.partitions.failed.len(),
            "Pipeline complete"
        );
        Ok(report)
    }
}
