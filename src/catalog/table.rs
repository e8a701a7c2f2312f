//! External schema and table definition.
//!
//! There is no migration path: a schema change drops and recreates the
//! table, which discards every partition registration.

use tracing::info;

use super::{Catalog, Ident, Statement, TableDefinition};
use crate::error::{DwhError, Result};

/// External schema mapped onto a data-catalog database.
#[derive(Debug, Clone)]
pub struct ExternalSchema {
    pub schema: Ident,
    pub database: Ident,
    pub iam_role: String,
}

impl ExternalSchema {
    pub fn new(schema: &str, database: &str, iam_role: &str) -> Result<Self> {
        if !iam_role.starts_with("arn:") {
            return Err(DwhError::invalid_config(format!(
                "IAM role '{}' is not an ARN",
                iam_role
            )));
        }
        Ok(Self {
            schema: Ident::new(schema)?,
            database: Ident::new(database)?,
            iam_role: iam_role.to_string(),
        })
    }
}

/// Create the external schema if missing, then drop and recreate the table.
pub async fn create_external_table(
    catalog: &dyn Catalog,
    external: &ExternalSchema,
    definition: TableDefinition,
) -> Result<()> {
    if definition.table.schema != external.schema {
        return Err(DwhError::invalid_config(format!(
            "table {} is not in external schema {}",
            definition.table, external.schema
        )));
    }

    info!(schema = %external.schema, "Creating external schema if not exists");
    catalog
        .execute(&Statement::CreateExternalSchema {
            schema: external.schema.clone(),
            database: external.database.clone(),
            iam_role: external.iam_role.clone(),
        })
        .await?;

    info!(table = %definition.table, "Dropping old table if exists");
    catalog
        .execute(&Statement::DropTable {
            table: definition.table.clone(),
        })
        .await?;

    info!(
        table = %definition.table,
        location = %definition.location,
        columns = definition.columns.len(),
        "Creating external table"
    );
    catalog
        .execute(&Statement::CreateExternalTable { definition })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MemoryCatalog, TableRef};

    fn definition() -> TableDefinition {
        TableDefinition {
            table: TableRef::new("spectrum_schema", "crashes").unwrap(),
            columns: Vec::new(),
            location: "s3://bucket/processed/".to_string(),
        }
    }

    #[test]
    fn role_must_be_an_arn() {
        assert!(ExternalSchema::new("spectrum_schema", "db", "role/spectrum").is_err());
        assert!(ExternalSchema::new("spectrum_schema", "db", "arn:aws:iam::1:role/x").is_ok());
    }

    #[tokio::test]
    async fn create_is_repeatable() {
        let catalog = MemoryCatalog::new();
        let external =
            ExternalSchema::new("spectrum_schema", "airplane_crashes", "arn:aws:iam::1:role/x")
                .unwrap();

        create_external_table(&catalog, &external, definition())
            .await
            .unwrap();
        create_external_table(&catalog, &external, definition())
            .await
            .unwrap();

        let history = catalog.history();
        assert_eq!(history.len(), 6);
        assert!(history[1].starts_with("DROP TABLE IF EXISTS"));
    }

    #[tokio::test]
    async fn table_must_live_in_external_schema() {
        let catalog = MemoryCatalog::new();
        let external =
            ExternalSchema::new("other_schema", "airplane_crashes", "arn:aws:iam::1:role/x")
                .unwrap();
        assert!(create_external_table(&catalog, &external, definition())
            .await
            .is_err());
        assert!(catalog.history().is_empty());
    }
}
