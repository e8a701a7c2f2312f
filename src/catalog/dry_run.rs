//! Catalog for `--dry-run`: rendered SQL goes to stdout, nothing reaches
//! the warehouse.

use async_trait::async_trait;
use tracing::info;

use super::{Catalog, Statement, TableRef};
use crate::error::Result;

/// Prints statements instead of executing them. Partition listings are empty.
#[derive(Debug, Default)]
pub struct DryRunCatalog;

#[async_trait]
impl Catalog for DryRunCatalog {
    async fn execute(&self, statement: &Statement) -> Result<()> {
        info!(kind = statement.kind(), "dry-run: statement not executed");
        println!("{};", statement.to_sql());
        Ok(())
    }

    async fn partition_locations(&self, table: &TableRef) -> Result<Vec<String>> {
        info!(table = %table, "dry-run: partition listing skipped");
        Ok(Vec::new())
    }
}
