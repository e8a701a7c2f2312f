//! Warehouse catalog access.
//!
//! `Catalog` is the seam between partition lifecycle logic and a concrete
//! warehouse. Statements run one at a time with autocommit; nothing here
//! opens a transaction across partitions.

mod dry_run;
mod memory;
mod redshift;
mod registry;
mod statement;
mod table;

use async_trait::async_trait;

use crate::error::Result;

pub use dry_run::DryRunCatalog;
pub use memory::MemoryCatalog;
pub use redshift::RedshiftCatalog;
pub use registry::{BatchReport, PartitionFailure, PartitionRegistry};
pub use statement::{quote_literal, Column, ColumnType, Ident, Statement, TableDefinition, TableRef};
pub use table::{create_external_table, ExternalSchema};

/// A warehouse catalog that executes typed statements.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Execute one statement (autocommit).
    async fn execute(&self, statement: &Statement) -> Result<()>;

    /// Storage locations of every partition registered for `table`, as
    /// reported by the catalog's partition metadata view.
    async fn partition_locations(&self, table: &TableRef) -> Result<Vec<String>>;
}
