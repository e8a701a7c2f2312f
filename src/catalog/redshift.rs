//! Redshift catalog over the Postgres wire protocol.

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use sqlx::{Connection, PgConnection, Row};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{Catalog, Statement, TableRef};
use crate::config::WarehouseConfig;
use crate::error::{DwhError, Result};

const PARTITION_LOCATIONS_SQL: &str = "SELECT location FROM svv_external_partitions \
     WHERE schemaname = $1 AND tablename = $2";

/// Catalog backed by a single warehouse connection.
///
/// The connection stays open for the whole batch and every statement
/// autocommits.
pub struct RedshiftCatalog {
    conn: Mutex<PgConnection>,
}

impl RedshiftCatalog {
    pub async fn connect(config: &WarehouseConfig) -> Result<Self> {
        let ssl_mode = if config.require_ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        };

        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(ssl_mode);

        info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            "Connecting to warehouse"
        );

        let conn = PgConnection::connect_with(&options).await.map_err(|e| {
            DwhError::catalog(format!(
                "failed to connect to {}:{}/{}: {}",
                config.host, config.port, config.database, e
            ))
        })?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Close the connection, flushing the termination message.
    pub async fn close(self) -> Result<()> {
        self.conn.into_inner().close().await?;
        Ok(())
    }
}

#[async_trait]
impl Catalog for RedshiftCatalog {
    async fn execute(&self, statement: &Statement) -> Result<()> {
        let sql = statement.to_sql();
        debug!(kind = statement.kind(), sql = %sql, "Executing catalog statement");

        let mut conn = self.conn.lock().await;
        sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(&sql)).await?;
        Ok(())
    }

    async fn partition_locations(&self, table: &TableRef) -> Result<Vec<String>> {
        let mut conn = self.conn.lock().await;
        let rows = sqlx::query(PARTITION_LOCATIONS_SQL)
            .bind(table.schema.as_str())
            .bind(table.table.as_str())
            .fetch_all(&mut *conn)
            .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("location").map_err(DwhError::from))
            .collect()
    }
}
