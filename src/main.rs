use aircrash_dwh::catalog::{create_external_table, BatchReport, PartitionRegistry, TableDefinition};
use aircrash_dwh::config::{Requirement, RuntimeConfig};
use aircrash_dwh::init::{external_schema, init_catalog, init_storage, table_ref};
use aircrash_dwh::partition::{normalize_prefix, PartitionSpec};
use aircrash_dwh::pipeline::{Pipeline, PipelineOptions};
use aircrash_dwh::provision::{self, ApplyOutcome};
use aircrash_dwh::record::arrow_schema;
use aircrash_dwh::repartition::{RewriteMode, Rewriter};
use aircrash_dwh::storage::discover_partitions;
use aircrash_dwh::{dbt, ingest, profiles, transform};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

/// Partition lifecycle for the airplane-crash warehouse
#[derive(Parser)]
#[command(name = "aircrash-dwh")]
#[command(version)]
#[command(about = "Partition lifecycle for the airplane-crash warehouse", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    /// Print catalog statements instead of executing them. With `run`, the
    /// ingest, transform and dbt steps are skipped as well
    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the external schema and (re)create the external table
    CreateTable,
    /// Discover year folders under the processed prefix and register them
    AddPartitions {
        /// Prefix to scan (defaults to layout.processed_prefix)
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Drop partitions by year, or every registered partition with --all
    DropPartitions {
        /// Years to drop
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        years: Vec<i32>,

        #[arg(long)]
        all: bool,
    },
    /// List registered partitions
    ListPartitions,
    /// Rewrite the legacy layout into canonical year folders
    Repartition {
        #[arg(long, value_enum, default_value_t = ModeArg::Truncate)]
        mode: ModeArg,
    },
    /// Download the crash dataset into the raw key
    Ingest,
    /// Transform the raw CSV into year-partitioned Parquet
    Transform,
    /// Run terraform init/apply and save its outputs
    Provision,
    /// Generate dbt profiles.yml from terraform outputs
    Profiles {
        /// Overwrite an existing file without asking
        #[arg(long)]
        force: bool,
    },
    /// Run the dbt models against the generated profile
    Dbt,
    /// Run the whole pipeline
    Run {
        #[arg(long)]
        skip_provision: bool,

        #[arg(long)]
        skip_ingest: bool,

        #[arg(long)]
        skip_transform: bool,

        #[arg(long)]
        skip_profiles: bool,

        #[arg(long)]
        skip_dbt: bool,

        /// Overwrite an existing profiles.yml without asking
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Clear each destination year folder before writing
    Truncate,
    /// Keep files already in destination folders
    Append,
}

impl From<ModeArg> for RewriteMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Truncate => RewriteMode::TruncatePartition,
            ModeArg::Append => RewriteMode::Append,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")
        .and_then(|runtime| runtime.block_on(async_main(cli)));

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every item in the command succeeded.
async fn async_main(cli: Cli) -> Result<bool> {
    let mut config = match &cli.config {
        Some(path) => RuntimeConfig::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => RuntimeConfig::load().context("Failed to load configuration")?,
    };

    if let Some(level) = &cli.log_level {
        config.log.level = level.clone();
    }
    aircrash_dwh::init_tracing(&config.log);

    match cli.command {
        Commands::CreateTable => create_table(&config, cli.dry_run).await,
        Commands::AddPartitions { prefix } => add_partitions(&config, prefix, cli.dry_run).await,
        Commands::DropPartitions { years, all } => {
            drop_partitions(&config, years, all, cli.dry_run).await
        }
        Commands::ListPartitions => list_partitions(&config, cli.dry_run).await,
        Commands::Repartition { mode } => repartition(&config, mode.into()).await,
        Commands::Ingest => run_ingest(&config).await,
        Commands::Transform => run_transform(&config).await,
        Commands::Provision => run_provision(&config).await,
        Commands::Profiles { force } => {
            config.require(&[Requirement::WarehousePassword])?;
            let home = std::env::var_os("HOME").map(PathBuf::from);
            match profiles::generate(&config, home, force)? {
                Some(path) => println!("dbt profiles.yml generated at {}", path.display()),
                None => println!("Aborted."),
            }
            Ok(true)
        }
        Commands::Dbt => {
            let home = std::env::var_os("HOME").map(PathBuf::from);
            let dir = profiles::profiles_dir(&config, home)?;
            dbt::run_models(&config.dbt, &dir, &config.profiles.target).await?;
            println!("dbt run succeeded.");
            Ok(true)
        }
        Commands::Run {
            skip_provision,
            skip_ingest,
            skip_transform,
            skip_profiles,
            skip_dbt,
            force,
        } => {
            let options = PipelineOptions {
                skip_provision,
                skip_ingest,
                skip_transform,
                skip_profiles,
                skip_dbt,
                force_profiles: force,
                home: std::env::var_os("HOME").map(PathBuf::from),
            };
            run_pipeline(&config, &options, cli.dry_run).await
        }
    }
}

async fn create_table(config: &RuntimeConfig, dry_run: bool) -> Result<bool> {
    let external = external_schema(config)?;
    let table = table_ref(config)?;
    config.require(&[Requirement::Bucket])?;

    let location = format!(
        "{}{}",
        config.bucket_uri(),
        normalize_prefix(&config.layout.processed_prefix)
    );
    let definition = TableDefinition::from_arrow(table, &arrow_schema(), location)?;

    let catalog = init_catalog(config, dry_run).await?;
    create_external_table(catalog.as_ref(), &external, definition).await?;
    println!("External table created.");
    Ok(true)
}

async fn add_partitions(config: &RuntimeConfig, prefix: Option<String>, dry_run: bool) -> Result<bool> {
    let table = table_ref(config)?;
    if !dry_run {
        config.require(&[Requirement::Warehouse])?;
    }
    let storage = init_storage(config)?;
    let prefix = prefix.unwrap_or_else(|| config.layout.processed_prefix.clone());

    let specs = discover_partitions(&storage, &prefix).await?;
    if specs.is_empty() {
        println!("No year folders found under {}", storage.uri(&prefix));
        return Ok(true);
    }

    let catalog = init_catalog(config, dry_run).await?;
    let report = PartitionRegistry::new(catalog, table).add_partitions(&specs).await;
    Ok(print_batch("Added", &report))
}

async fn drop_partitions(
    config: &RuntimeConfig,
    years: Vec<i32>,
    all: bool,
    dry_run: bool,
) -> Result<bool> {
    let table = table_ref(config)?;
    let catalog = init_catalog(config, dry_run).await?;
    let registry = PartitionRegistry::new(catalog, table);

    let report = if all {
        registry.drop_all_partitions().await?
    } else {
        registry.drop_partitions(years).await
    };
    Ok(print_batch("Dropped", &report))
}

async fn list_partitions(config: &RuntimeConfig, dry_run: bool) -> Result<bool> {
    let table = table_ref(config)?;
    let catalog = init_catalog(config, dry_run).await?;
    let partitions = PartitionRegistry::new(catalog, table.clone())
        .list_partitions()
        .await?;

    for PartitionSpec { year, location } in &partitions {
        println!("{}\t{}", year, location);
    }
    info!(table = %table, count = partitions.len(), "Listed partitions");
    Ok(true)
}

async fn repartition(config: &RuntimeConfig, mode: RewriteMode) -> Result<bool> {
    let storage = init_storage(config)?;
    let report = Rewriter::new(
        &storage,
        &config.layout.legacy_prefix,
        &config.layout.processed_prefix,
    )
    .with_mode(mode)
    .run()
    .await?;

    println!(
        "Rewrote {} of {} files into {} year folders ({} failed)",
        report.rewritten,
        report.discovered,
        report.years.len(),
        report.failed
    );
    for path in &report.failed_paths {
        println!("  failed: {}", path);
    }
    Ok(report.is_success())
}

async fn run_ingest(config: &RuntimeConfig) -> Result<bool> {
    let storage = init_storage(config)?;
    let report = ingest::run_ingest(&config.ingest, &storage, &config.layout.raw_key).await?;
    println!(
        "Downloaded {} rows ({} bytes) to {}",
        report.rows,
        report.bytes,
        storage.uri(&report.key)
    );
    Ok(true)
}

async fn run_transform(config: &RuntimeConfig) -> Result<bool> {
    let storage = init_storage(config)?;
    let report = transform::run_transform(
        &storage,
        &config.layout.raw_key,
        &config.layout.processed_prefix,
    )
    .await?;

    println!(
        "Wrote {} rows into {} year folders ({} rows skipped)",
        report.rows_written,
        report.partitions.len(),
        report.rows_skipped
    );
    Ok(true)
}

async fn run_provision(config: &RuntimeConfig) -> Result<bool> {
    match provision::apply(&config.provision).await? {
        ApplyOutcome::Applied => println!("Terraform apply succeeded."),
        ApplyOutcome::Tolerated { errors } => {
            println!("Terraform reported {} tolerated error(s); continuing.", errors.len())
        }
    }
    let outputs = provision::refresh_outputs(&config.provision).await?;
    println!(
        "Saved {} outputs to {}",
        outputs.names().count(),
        config.provision.outputs_path
    );
    Ok(true)
}

async fn run_pipeline(config: &RuntimeConfig, options: &PipelineOptions, dry_run: bool) -> Result<bool> {
    if !options.skip_profiles {
        config.require(&[Requirement::WarehousePassword])?;
    }
    if dry_run && !options.skip_provision {
        bail!("--dry-run cannot be combined with provisioning; add --skip-provision");
    }

    if !dry_run {
        config.require(&[Requirement::Warehouse])?;
    }

    let external = external_schema(config)?;
    let table = table_ref(config)?;
    let storage = init_storage(config)?;

    let report = Pipeline::new(config, storage, external, table)
        .with_dry_run(dry_run)
        .run(options)
        .await?;

    print_batch("Added", &report.partitions);
    if let Some(path) = &report.profile_path {
        println!("dbt profiles.yml generated at {}", path.display());
    }
    if report.dbt_ran {
        println!("dbt run succeeded.");
    }
    Ok(report.is_success())
}

fn print_batch(verb: &str, report: &BatchReport) -> bool {
    println!("{} {} partition(s)", verb, report.succeeded.len());
    for failure in &report.failed {
        println!("  year={} failed: {}", failure.year, failure.error);
    }
    report.is_success()
}
