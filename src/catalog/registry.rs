//! Partition registration against an external table.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

use super::{Catalog, Statement, TableRef};
use crate::error::Result;
use crate::partition::{dedup_by_year, parse_year, validate_location, PartitionSpec};

/// Outcome of a batch of independent partition operations.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: Vec<i32>,
    pub failed: Vec<PartitionFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionFailure {
    pub year: i32,
    pub error: String,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_years(&self) -> Vec<i32> {
        self.failed.iter().map(|f| f.year).collect()
    }
}

/// Registers and removes year partitions of one external table.
///
/// Every partition is handled independently: a failure is logged with its
/// year and recorded, and the batch carries on.
#[derive(Clone)]
pub struct PartitionRegistry {
    catalog: Arc<dyn Catalog>,
    table: TableRef,
}

impl PartitionRegistry {
    pub fn new(catalog: Arc<dyn Catalog>, table: TableRef) -> Self {
        Self { catalog, table }
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    /// Register `location` for `year` unless the year is already registered.
    pub async fn add_partition(&self, year: i32, location: &str) -> Result<()> {
        validate_location(year, location)?;
        self.catalog
            .execute(&Statement::AddPartition {
                table: self.table.clone(),
                year,
                location: location.to_string(),
            })
            .await
    }

    /// Remove the catalog entry for `year`. Files in storage are untouched.
    pub async fn drop_partition(&self, year: i32) -> Result<()> {
        self.catalog
            .execute(&Statement::DropPartition {
                table: self.table.clone(),
                year,
            })
            .await
    }

    /// All registered partitions, sorted by year.
    pub async fn list_partitions(&self) -> Result<Vec<PartitionSpec>> {
        let locations = self.catalog.partition_locations(&self.table).await?;

        let mut partitions = Vec::with_capacity(locations.len());
        for location in locations {
            match parse_year(&location) {
                Some(year) => partitions.push(PartitionSpec::new(year, location)),
                None => warn!(
                    table = %self.table,
                    location = %location,
                    "Registered partition location carries no year; skipping"
                ),
            }
        }
        partitions.sort();
        Ok(partitions)
    }

    /// Add partitions in discovery order, first location per year wins.
    pub async fn add_partitions(&self, specs: &[PartitionSpec]) -> BatchReport {
        let mut report = BatchReport::default();

        for spec in dedup_by_year(specs.iter().cloned()) {
            info!(year = spec.year, location = %spec.location, "Registering partition");
            match self.add_partition(spec.year, &spec.location).await {
                Ok(()) => report.succeeded.push(spec.year),
                Err(e) => {
                    warn!(year = spec.year, error = %e, "Failed to add partition");
                    report.failed.push(PartitionFailure {
                        year: spec.year,
                        error: e.to_string(),
                    });
                }
            }
        }

        report
    }

    /// Drop the given years, deduplicated and in ascending order.
    pub async fn drop_partitions(&self, years: impl IntoIterator<Item = i32>) -> BatchReport {
        let years: BTreeSet<i32> = years.into_iter().collect();
        let mut report = BatchReport::default();

        for year in years {
            info!(year, "Dropping partition");
            match self.drop_partition(year).await {
                Ok(()) => report.succeeded.push(year),
                Err(e) => {
                    warn!(year, error = %e, "Failed to drop partition");
                    report.failed.push(PartitionFailure {
                        year,
                        error: e.to_string(),
                    });
                }
            }
        }

        report
    }

    /// Drop every partition currently registered for the table.
    pub async fn drop_all_partitions(&self) -> Result<BatchReport> {
        let partitions = self.list_partitions().await?;
        info!(count = partitions.len(), table = %self.table, "Found partitions to drop");
        Ok(self
            .drop_partitions(partitions.into_iter().map(|p| p.year))
            .await)
    }
}
