//! Typed catalog statements.
//!
//! Statements are built from validated identifiers and typed values and only
//! rendered to SQL at the connection boundary. External-table DDL cannot take
//! bind parameters, so rendering quotes every literal and identifiers are
//! restricted to `[A-Za-z_][A-Za-z0-9_]*`.

use arrow::datatypes::{DataType, Schema};
use std::fmt;

use crate::error::{DwhError, Result};
use crate::partition::PARTITION_COLUMN;

const MAX_IDENT_LEN: usize = 127;

/// A validated, lowercase SQL identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ident(String);

impl Ident {
    pub fn new(raw: &str) -> Result<Self> {
        let mut chars = raw.chars();
        let valid_start = chars
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false);
        let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

        if !valid_start || !valid_rest || raw.len() > MAX_IDENT_LEN {
            return Err(DwhError::invalid_config(format!(
                "'{}' is not a valid identifier (expected [A-Za-z_][A-Za-z0-9_]*, max {} chars)",
                raw, MAX_IDENT_LEN
            )));
        }

        Ok(Self(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableRef {
    pub schema: Ident,
    pub table: Ident,
}

impl TableRef {
    pub fn new(schema: &str, table: &str) -> Result<Self> {
        Ok(Self {
            schema: Ident::new(schema)?,
            table: Ident::new(table)?,
        })
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Column types supported by the external table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Date,
    Varchar,
    Int,
    Boolean,
}

impl ColumnType {
    fn from_arrow(data_type: &DataType) -> Result<Self> {
        match data_type {
            DataType::Date32 => Ok(Self::Date),
            DataType::Utf8 => Ok(Self::Varchar),
            DataType::Int32 => Ok(Self::Int),
            DataType::Boolean => Ok(Self::Boolean),
            other => Err(DwhError::invalid_config(format!(
                "no external column type for Arrow type {}",
                other
            ))),
        }
    }

    fn as_sql(&self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::Varchar => "varchar",
            Self::Int => "int",
            Self::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: Ident,
    pub column_type: ColumnType,
}

/// External table layout: ordered columns, `year int` partition key, and a
/// root storage location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    pub table: TableRef,
    pub columns: Vec<Column>,
    pub location: String,
}

impl TableDefinition {
    /// Derive the column list from the Arrow schema of the Parquet files.
    pub fn from_arrow(table: TableRef, schema: &Schema, location: impl Into<String>) -> Result<Self> {
        let columns = schema
            .fields()
            .iter()
            .filter(|field| field.name() != PARTITION_COLUMN)
            .map(|field| {
                Ok(Column {
                    name: Ident::new(field.name())?,
                    column_type: ColumnType::from_arrow(field.data_type())?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            table,
            columns,
            location: location.into(),
        })
    }
}

/// Statements issued against the warehouse catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    CreateExternalSchema {
        schema: Ident,
        database: Ident,
        iam_role: String,
    },
    DropTable {
        table: TableRef,
    },
    CreateExternalTable {
        definition: TableDefinition,
    },
    AddPartition {
        table: TableRef,
        year: i32,
        location: String,
    },
    DropPartition {
        table: TableRef,
        year: i32,
    },
}

impl Statement {
    /// Render to SQL text in the external-table dialect.
    pub fn to_sql(&self) -> String {
        match self {
            Statement::CreateExternalSchema {
                schema,
                database,
                iam_role,
            } => format!(
                "CREATE EXTERNAL SCHEMA IF NOT EXISTS {} FROM DATA CATALOG DATABASE {} IAM_ROLE {}",
                schema,
                quote_literal(database.as_str()),
                quote_literal(iam_role)
            ),
            Statement::DropTable { table } => format!("DROP TABLE IF EXISTS {}", table),
            Statement::CreateExternalTable { definition } => {
                let columns = definition
                    .columns
                    .iter()
                    .map(|c| format!("  {:<16} {}", c.name.as_str(), c.column_type.as_sql()))
                    .collect::<Vec<_>>()
                    .join(",\n");
                format!(
                    "CREATE EXTERNAL TABLE {} (\n{}\n)\nPARTITIONED BY ({} int)\nSTORED AS PARQUET\nLOCATION {}",
                    definition.table,
                    columns,
                    PARTITION_COLUMN,
                    quote_literal(&definition.location)
                )
            }
            Statement::AddPartition {
                table,
                year,
                location,
            } => format!(
                "ALTER TABLE {} ADD IF NOT EXISTS PARTITION ({} = {}) LOCATION {}",
                table,
                PARTITION_COLUMN,
                year,
                quote_literal(location)
            ),
            Statement::DropPartition { table, year } => format!(
                "ALTER TABLE {} DROP PARTITION ({} = {})",
                table,
                PARTITION_COLUMN,
                quote_literal(&year.to_string())
            ),
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::CreateExternalSchema { .. } => "create_external_schema",
            Statement::DropTable { .. } => "drop_table",
            Statement::CreateExternalTable { .. } => "create_external_table",
            Statement::AddPartition { .. } => "add_partition",
            Statement::DropPartition { .. } => "drop_partition",
        }
    }
}

/// Quote a string literal, doubling quotes and escaping backslashes.
pub fn quote_literal(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "''");
    format!("'{}'", escaped)
}
