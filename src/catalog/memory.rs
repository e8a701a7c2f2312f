//! In-process catalog with external-table semantics.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use super::{Catalog, Ident, Statement, TableRef};
use crate::error::{DwhError, Result};

#[derive(Debug, Default)]
struct CatalogState {
    schemas: BTreeSet<Ident>,
    tables: BTreeMap<TableRef, BTreeMap<i32, String>>,
    history: Vec<String>,
}

/// Catalog held in memory.
///
/// Mirrors the warehouse behavior the partition lifecycle depends on:
/// `ADD IF NOT EXISTS` keeps the first registered location, dropping a table
/// discards its partitions, and statements against missing objects fail.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    state: Mutex<CatalogState>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// SQL text of every successfully applied statement, in order.
    pub fn history(&self) -> Vec<String> {
        self.lock().map(|s| s.history.clone()).unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, CatalogState>> {
        self.state
            .lock()
            .map_err(|_| DwhError::catalog("memory catalog lock poisoned"))
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn execute(&self, statement: &Statement) -> Result<()> {
        let mut state = self.lock()?;

        match statement {
            Statement::CreateExternalSchema { schema, .. } => {
                state.schemas.insert(schema.clone());
            }
            Statement::DropTable { table } => {
                state.tables.remove(table);
            }
            Statement::CreateExternalTable { definition } => {
                if !state.schemas.contains(&definition.table.schema) {
                    return Err(DwhError::catalog(format!(
                        "schema \"{}\" does not exist",
                        definition.table.schema
                    )));
                }
                if state.tables.contains_key(&definition.table) {
                    return Err(DwhError::catalog(format!(
                        "relation \"{}\" already exists",
                        definition.table
                    )));
                }
                state
                    .tables
                    .insert(definition.table.clone(), BTreeMap::new());
            }
            Statement::AddPartition {
                table,
                year,
                location,
            } => {
                let partitions = state.tables.get_mut(table).ok_or_else(|| {
                    DwhError::catalog(format!("relation \"{}\" does not exist", table))
                })?;
                partitions
                    .entry(*year)
                    .or_insert_with(|| location.clone());
            }
            Statement::DropPartition { table, year } => {
                let partitions = state.tables.get_mut(table).ok_or_else(|| {
                    DwhError::catalog(format!("relation \"{}\" does not exist", table))
                })?;
                if partitions.remove(year).is_none() {
                    return Err(DwhError::catalog(format!(
                        "partition (year={}) of \"{}\" does not exist",
                        year, table
                    )));
                }
            }
        }

        state.history.push(statement.to_sql());
        Ok(())
    }

    async fn partition_locations(&self, table: &TableRef) -> Result<Vec<String>> {
        let state = self.lock()?;
        Ok(state
            .tables
            .get(table)
            .map(|partitions| partitions.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnType, Column, TableDefinition};

    fn table() -> TableRef {
        TableRef::new("spectrum_schema", "crashes").unwrap()
    }

    async fn catalog_with_table() -> MemoryCatalog {
        let catalog = MemoryCatalog::new();
        catalog
            .execute(&Statement::CreateExternalSchema {
                schema: Ident::new("spectrum_schema").unwrap(),
                database: Ident::new("airplane_crashes").unwrap(),
                iam_role: "arn:aws:iam::123456789012:role/spectrum".to_string(),
            })
            .await
            .unwrap();
        catalog
            .execute(&Statement::CreateExternalTable {
                definition: TableDefinition {
                    table: table(),
                    columns: vec![Column {
                        name: Ident::new("location").unwrap(),
                        column_type: ColumnType::Varchar,
                    }],
                    location: "s3://bucket/processed/".to_string(),
                },
            })
            .await
            .unwrap();
        catalog
    }

    #[tokio::test]
    async fn add_if_not_exists_keeps_first_location() {
        let catalog = catalog_with_table().await;
        for location in ["s3://b/p/year=1985/", "s3://b/q/year=1985/"] {
            catalog
                .execute(&Statement::AddPartition {
                    table: table(),
                    year: 1985,
                    location: location.to_string(),
                })
                .await
                .unwrap();
        }
        let locations = catalog.partition_locations(&table()).await.unwrap();
        assert_eq!(locations, vec!["s3://b/p/year=1985/".to_string()]);
    }

    #[tokio::test]
    async fn statements_against_missing_objects_fail() {
        let catalog = MemoryCatalog::new();
        let err = catalog
            .execute(&Statement::AddPartition {
                table: table(),
                year: 1985,
                location: "s3://b/p/year=1985/".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "E003");

        let catalog = catalog_with_table().await;
        assert!(catalog
            .execute(&Statement::DropPartition {
                table: table(),
                year: 1999,
            })
            .await
            .is_err());
    }

    #[tokio::test]
    async fn drop_table_discards_partitions() {
        let catalog = catalog_with_table().await;
        catalog
            .execute(&Statement::AddPartition {
                table: table(),
                year: 1990,
                location: "s3://b/p/year=1990/".to_string(),
            })
            .await
            .unwrap();
        catalog
            .execute(&Statement::DropTable { table: table() })
            .await
            .unwrap();
        assert!(catalog.partition_locations(&table()).await.unwrap().is_empty());
        assert_eq!(catalog.history().len(), 4);
    }
}
