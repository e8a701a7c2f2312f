// End-to-end pipeline over in-memory storage and catalog

mod harness;

use std::sync::Arc;

use aircrash_dwh::catalog::PartitionRegistry;
use aircrash_dwh::config::RuntimeConfig;
use aircrash_dwh::pipeline::{Pipeline, PipelineOptions};
use harness::*;

const RAW: &str = "\
Date,Time,Location,Operator,Flight #,Route,Type,Registration,cn/In,Aboard,Fatalities,Ground,Summary
07/12/1912,06:30,\"Atlantic City, New Jersey\",Military - U.S. Navy,,Test flight,Dirigible,,,5,5,0,
08/12/1985,18:56,\"Mt. Osutaka, Japan\",Japan Air Lines,123,Tokyo - Osaka,Boeing B-747-SR46,JA8119,20783/230,524,520,0,
12/12/1985,06:45,\"Gander, Newfoundland\",Arrow Air,1285,Cairo - Gander,McDonnell Douglas DC-8-63,N950JW,46058,256,256,0,
not a date,,Nowhere,Unknown,,,,,,,,,
";

fn config() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.storage.bucket = BUCKET.to_string();
    config.layout.raw_key = "raw/crashes.csv".to_string();
    config.layout.processed_prefix = "processed/".to_string();
    config
}

fn offline() -> PipelineOptions {
    PipelineOptions {
        skip_provision: true,
        skip_ingest: true,
        skip_profiles: true,
        skip_dbt: true,
        ..PipelineOptions::default()
    }
}

#[tokio::test]
async fn run_registers_every_transformed_year() {
    let config = config();
    let storage = memory_storage();
    put(&storage, "raw/crashes.csv", RAW.as_bytes().to_vec()).await;

    let catalog = Arc::new(aircrash_dwh::catalog::MemoryCatalog::new());
    let pipeline = Pipeline::new(&config, storage, external_schema(), table())
        .with_catalog(catalog.clone());

    let report = pipeline.run(&offline()).await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.partitions.succeeded, vec![1912, 1985]);

    let transform = report.transform.unwrap();
    assert_eq!(transform.rows_written, 3);
    assert_eq!(transform.rows_skipped, 1);

    let history = catalog.history();
    assert!(history[0].starts_with("CREATE EXTERNAL SCHEMA IF NOT EXISTS spectrum_schema"));
    assert!(history[2].contains("LOCATION 's3://bucket/processed/'"));

    // A second run recreates the table and registers the same partitions.
    let again = pipeline.run(&offline()).await.unwrap();
    assert_eq!(again.partitions.succeeded, vec![1912, 1985]);

    let registry = PartitionRegistry::new(catalog, table());
    let listed = registry.list_partitions().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[1].location, "s3://bucket/processed/year=1985/");
}

#[tokio::test]
async fn missing_raw_object_is_fatal() {
    let config = config();
    let catalog = Arc::new(aircrash_dwh::catalog::MemoryCatalog::new());
    let pipeline = Pipeline::new(&config, memory_storage(), external_schema(), table())
        .with_catalog(catalog.clone());

    let err = pipeline.run(&offline()).await.unwrap_err();
    assert!(format!("{:#}", err).contains("Transform failed"));
    assert!(catalog.history().is_empty());
}

#[tokio::test]
async fn dry_run_needs_no_warehouse() {
    let config = config();
    let storage = memory_storage();
    put(&storage, "processed/year=2001/part-00000.snappy.parquet", crash_parquet(2001, 1)).await;

    let options = PipelineOptions {
        skip_transform: true,
        ..offline()
    };
    let report = Pipeline::new(&config, storage, external_schema(), table())
        .with_dry_run(true)
        .run(&options)
        .await
        .unwrap();

    assert_eq!(report.partitions.succeeded, vec![2001]);
    assert!(report.transform.is_none());
}

#[tokio::test]
async fn ingest_feeds_the_transform() {
    let mut config = config();
    config.ingest.source_url = serve_csv_once(RAW).await;
    let storage = memory_storage();
    let catalog = Arc::new(aircrash_dwh::catalog::MemoryCatalog::new());

    let options = PipelineOptions {
        skip_ingest: false,
        ..offline()
    };
    let report = Pipeline::new(&config, storage.clone(), external_schema(), table())
        .with_catalog(catalog)
        .run(&options)
        .await
        .unwrap();

    let ingest = report.ingest.unwrap();
    assert_eq!(ingest.rows, 4);
    assert_eq!(ingest.key, "raw/crashes.csv");
    assert_eq!(storage.read("raw/crashes.csv").await.unwrap(), RAW.as_bytes());
    assert_eq!(report.partitions.succeeded, vec![1912, 1985]);
    assert!(!report.dbt_ran);
}

#[tokio::test]
async fn dry_run_leaves_storage_untouched() {
    let config = config();
    let storage = memory_storage();
    put(&storage, "raw/crashes.csv", RAW.as_bytes().to_vec()).await;
    let existing = "processed/year=2001/part-00000.snappy.parquet";
    put(&storage, existing, crash_parquet(2001, 1)).await;

    let options = PipelineOptions {
        skip_ingest: false,
        skip_dbt: false,
        ..offline()
    };
    let report = Pipeline::new(&config, storage.clone(), external_schema(), table())
        .with_dry_run(true)
        .run(&options)
        .await
        .unwrap();

    assert!(report.ingest.is_none());
    assert!(report.transform.is_none());
    assert!(!report.dbt_ran);
    assert_eq!(report.partitions.succeeded, vec![2001]);

    let files = aircrash_dwh::storage::list_objects_recursive(&storage, "processed/")
        .await
        .unwrap();
    assert_eq!(files, vec![existing.to_string()]);
}
