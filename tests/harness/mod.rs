//! Shared fixtures for integration tests
//!
//! In-memory object storage, a memory catalog with the external table
//! already created, and small Parquet files shaped like the legacy layout.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use aircrash_dwh::catalog::{
    create_external_table, Catalog, ExternalSchema, MemoryCatalog, Statement, TableDefinition,
    TableRef,
};
use aircrash_dwh::error::{DwhError, Result};
use aircrash_dwh::parquet::encode_batches;
use aircrash_dwh::record::{arrow_schema, to_record_batch, CrashRecord};
use aircrash_dwh::storage::Storage;
use async_trait::async_trait;
use chrono::NaiveDate;
use opendal::raw::{
    Access, Layer, LayeredAccess, OpList, OpRead, OpWrite, RpDelete, RpList, RpRead, RpWrite,
};
use opendal::{services, ErrorKind, Operator};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub const BUCKET: &str = "bucket";
pub const ROLE_ARN: &str = "arn:aws:iam::123456789012:role/spectrum";

pub fn memory_storage() -> Storage {
    let op = Operator::new(services::Memory::default())
        .expect("memory operator")
        .finish();
    Storage::new(op, BUCKET)
}

/// A view of `storage` over the same objects in which every delete fails.
pub fn without_deletes(storage: &Storage) -> Storage {
    Storage::new(storage.operator().clone().layer(DenyDeleteLayer), BUCKET)
}

pub fn table() -> TableRef {
    TableRef::new("spectrum_schema", "airplane_crashes_parquet").expect("valid table")
}

pub fn external_schema() -> ExternalSchema {
    ExternalSchema::new("spectrum_schema", "airplane_crashes", ROLE_ARN).expect("valid schema")
}

pub fn definition() -> TableDefinition {
    TableDefinition::from_arrow(table(), &arrow_schema(), "s3://bucket/processed/")
        .expect("valid definition")
}

/// Memory catalog with the external table created.
pub async fn catalog_with_table() -> Arc<MemoryCatalog> {
    let catalog = Arc::new(MemoryCatalog::new());
    create_external_table(catalog.as_ref(), &external_schema(), definition())
        .await
        .expect("create table");
    catalog
}

/// Parquet bytes holding `rows` crashes dated in `year`.
pub fn crash_parquet(year: i32, rows: usize) -> Vec<u8> {
    let records: Vec<CrashRecord> = (0..rows)
        .map(|i| {
            CrashRecord::new(
                NaiveDate::from_ymd_opt(year, 1 + (i % 12) as u32, 1).expect("valid date"),
                Some(format!("Location {}", i)),
                Some("Test Airways".to_string()),
                Some("Douglas DC-3".to_string()),
                Some(20),
                Some(i as i32 % 3),
                Some(0),
            )
        })
        .collect();
    let batch = to_record_batch(&records).expect("record batch");
    encode_batches(arrow_schema(), &[batch]).expect("encode parquet")
}

pub async fn put(storage: &Storage, key: &str, data: Vec<u8>) {
    storage.write(key, data).await.expect("write fixture");
}

/// Serve a single `200 OK` response with `body` on a local port; returns the URL.
pub async fn serve_csv_once(body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut request = [0u8; 4096];
        let _ = socket.read(&mut request).await;
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/csv\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.expect("write response");
    });
    format!("http://{}/crashes.csv", addr)
}

/// Wraps a catalog and fails partition statements for chosen years.
pub struct FailingCatalog {
    inner: Arc<dyn Catalog>,
    fail_years: BTreeSet<i32>,
}

impl FailingCatalog {
    pub fn new(inner: Arc<dyn Catalog>, fail_years: impl IntoIterator<Item = i32>) -> Self {
        Self {
            inner,
            fail_years: fail_years.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Catalog for FailingCatalog {
    async fn execute(&self, statement: &Statement) -> Result<()> {
        let year = match statement {
            Statement::AddPartition { year, .. } | Statement::DropPartition { year, .. } => {
                Some(*year)
            }
            _ => None,
        };
        if let Some(year) = year.filter(|y| self.fail_years.contains(y)) {
            return Err(DwhError::catalog(format!("injected failure for year={}", year)));
        }
        self.inner.execute(statement).await
    }

    async fn partition_locations(&self, table: &TableRef) -> Result<Vec<String>> {
        self.inner.partition_locations(table).await
    }
}

/// Storage layer that rejects deletes and forwards everything else.
pub struct DenyDeleteLayer;

impl<A: Access> Layer<A> for DenyDeleteLayer {
    type LayeredAccess = DenyDeleteAccessor<A>;

    fn layer(&self, inner: A) -> Self::LayeredAccess {
        DenyDeleteAccessor { inner }
    }
}

#[derive(Debug)]
pub struct DenyDeleteAccessor<A: Access> {
    inner: A,
}

impl<A: Access> LayeredAccess for DenyDeleteAccessor<A> {
    type Inner = A;
    type Reader = A::Reader;
    type Writer = A::Writer;
    type Lister = A::Lister;
    type Deleter = A::Deleter;

    fn inner(&self) -> &Self::Inner {
        &self.inner
    }

    async fn read(&self, path: &str, args: OpRead) -> opendal::Result<(RpRead, Self::Reader)> {
        self.inner.read(path, args).await
    }

    async fn write(&self, path: &str, args: OpWrite) -> opendal::Result<(RpWrite, Self::Writer)> {
        self.inner.write(path, args).await
    }

    async fn list(&self, path: &str, args: OpList) -> opendal::Result<(RpList, Self::Lister)> {
        self.inner.list(path, args).await
    }

    async fn delete(&self) -> opendal::Result<(RpDelete, Self::Deleter)> {
        Err(opendal::Error::new(ErrorKind::PermissionDenied, "deletes are denied"))
    }
}
