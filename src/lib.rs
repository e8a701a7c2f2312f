// aircrash-dwh - partition lifecycle for the airplane-crash warehouse
//
// Raw CSV lands in object storage, is transformed into snappy Parquet laid
// out as `processed/year=YYYY/`, and is exposed to the warehouse as an
// external table whose partitions this crate registers and drops.
//
// Components:
// - partition: `year=YYYY` path keys
// - storage: bucket-rooted OpenDAL operator and partition discovery
// - catalog: typed statements, warehouse backends, partition registry
// - ingest: public dataset download into the raw key
// - transform / repartition: Parquet producers for the canonical layout
// - provision / profiles / dbt: terraform runner, dbt profile output, dbt run
// - pipeline: the end-to-end flow

pub mod catalog;
pub mod config;
pub mod dbt;
pub mod error;
pub mod ingest;
pub mod init;
pub mod parquet;
pub mod partition;
pub mod pipeline;
pub mod profiles;
pub mod provision;
pub mod record;
pub mod repartition;
pub mod storage;
pub mod transform;

pub use catalog::{BatchReport, Catalog, PartitionRegistry};
pub use config::RuntimeConfig;
pub use error::{DwhError, ErrorCode, Result};
pub use init::init_tracing;
pub use partition::{parse_year, PartitionSpec};
pub use repartition::{RewriteMode, RewriteReport, Rewriter};
pub use storage::Storage;
