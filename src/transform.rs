//! Raw CSV to year-partitioned Parquet.
//!
//! The raw export is read in full, every row is cleaned into a
//! [`CrashRecord`], and each year is written as one snappy Parquet file under
//! `{output_prefix}year={year}/`. The output prefix is cleared first, so a
//! re-run replaces the previous output.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;

use arrow::array::{Array, AsArray, RecordBatch, StringArray};
use arrow::csv::reader::Format;
use arrow::csv::ReaderBuilder;
use arrow::datatypes::{DataType, Field, Schema};
use chrono::{Datelike, NaiveDate};
use tracing::{debug, info, warn};

use crate::error::{DwhError, Result};
use crate::parquet::{encode_batches, SNAPPY_PARQUET_SUFFIX};
use crate::partition::{
    is_root_prefix, key_under_prefix, normalize_prefix, partition_folder, PartitionSpec,
};
use crate::record::{arrow_schema, to_record_batch, CrashRecord};
use crate::storage::Storage;

const CSV_BATCH_SIZE: usize = 8192;
const DATE_FORMAT: &str = "%m/%d/%Y";

/// Source columns read from the raw export. Matching ignores case.
mod source {
    pub const DATE: &str = "Date";
    pub const LOCATION: &str = "Location";
    pub const OPERATOR: &str = "Operator";
    pub const TYPE: &str = "Type";
    pub const ABOARD: &str = "Aboard";
    pub const FATALITIES: &str = "Fatalities";
    pub const GROUND: &str = "Ground";
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransformReport {
    pub rows_read: usize,
    pub rows_written: usize,
    /// Rows dropped because the date was missing or unparsable.
    pub rows_skipped: usize,
    /// One entry per written year folder, in year order.
    pub partitions: Vec<PartitionSpec>,
}

/// Positions of the source columns in the CSV header.
struct ColumnIndex {
    date: usize,
    location: Option<usize>,
    operator: Option<usize>,
    aircraft_type: Option<usize>,
    aboard: Option<usize>,
    fatalities: Option<usize>,
    ground: Option<usize>,
}

impl ColumnIndex {
    fn resolve(schema: &Schema) -> Result<Self> {
        let find = |name: &str| {
            schema
                .fields()
                .iter()
                .position(|f| f.name().trim().eq_ignore_ascii_case(name))
        };

        let date = find(source::DATE).ok_or_else(|| {
            DwhError::codec(format!("raw CSV has no '{}' column", source::DATE))
        })?;

        Ok(Self {
            date,
            location: find(source::LOCATION),
            operator: find(source::OPERATOR),
            aircraft_type: find(source::TYPE),
            aboard: find(source::ABOARD),
            fatalities: find(source::FATALITIES),
            ground: find(source::GROUND),
        })
    }
}

/// Transform the raw CSV at `raw_key` into Parquet under `output_prefix`.
pub async fn run_transform(
    storage: &Storage,
    raw_key: &str,
    output_prefix: &str,
) -> Result<TransformReport> {
    let output_prefix = normalize_prefix(output_prefix);
    if is_root_prefix(&output_prefix) {
        return Err(DwhError::invalid_config(
            "transform output prefix must name a folder, not the bucket root",
        ));
    }
    if key_under_prefix(raw_key, &output_prefix) {
        return Err(DwhError::invalid_config(format!(
            "raw object '{}' lies under output prefix '{}' and would be deleted",
            raw_key, output_prefix
        )));
    }
    info!(source = %raw_key, output = %output_prefix, "Starting transform");

    let data = storage.read(raw_key).await?;
    let (by_year, mut report) = parse_csv(&data)?;

    if report.rows_skipped > 0 {
        warn!(rows = report.rows_skipped, "Skipped rows without a usable date");
    }

    storage.remove_prefix(&output_prefix).await?;
    debug!(prefix = %output_prefix, "Cleared previous output");

    let schema = arrow_schema();
    for (year, records) in by_year {
        let folder = partition_folder(&output_prefix, year);
        let key = format!("{}part-00000{}", folder, SNAPPY_PARQUET_SUFFIX);

        let batch = to_record_batch(&records)?;
        let bytes = encode_batches(schema.clone(), &[batch])?;
        storage.write(&key, bytes).await?;

        debug!(year, rows = records.len(), path = %key, "Wrote year partition");
        report.rows_written += records.len();
        report.partitions.push(PartitionSpec::new(year, storage.uri(&folder)));
    }

    info!(
        rows_read = report.rows_read,
        rows_written = report.rows_written,
        rows_skipped = report.rows_skipped,
        partitions = report.partitions.len(),
        "Transform complete"
    );
    Ok(report)
}

/// Parse raw CSV bytes into records grouped by year.
pub fn parse_csv(data: &[u8]) -> Result<(BTreeMap<i32, Vec<CrashRecord>>, TransformReport)> {
    let format = Format::default().with_header(true);
    let (header, _) = format.infer_schema(Cursor::new(data), Some(0))?;

    // Read every column as text; typing happens per field below.
    let schema = Arc::new(Schema::new(
        header
            .fields()
            .iter()
            .map(|f| Field::new(f.name(), DataType::Utf8, true))
            .collect::<Vec<_>>(),
    ));
    let columns = ColumnIndex::resolve(&schema)?;

    let reader = ReaderBuilder::new(schema)
        .with_format(format)
        .with_batch_size(CSV_BATCH_SIZE)
        .build(Cursor::new(data))?;

    let mut report = TransformReport::default();
    let mut by_year: BTreeMap<i32, Vec<CrashRecord>> = BTreeMap::new();

    for batch in reader {
        let batch = batch?;
        report.rows_read += batch.num_rows();
        for record in records_from_batch(&batch, &columns, &mut report) {
            by_year.entry(record.year()).or_default().push(record);
        }
    }

    Ok((by_year, report))
}

fn records_from_batch(
    batch: &RecordBatch,
    columns: &ColumnIndex,
    report: &mut TransformReport,
) -> Vec<CrashRecord> {
    let text = |index: Option<usize>| index.map(|i| batch.column(i).as_string::<i32>());
    let dates = batch.column(columns.date).as_string::<i32>();
    let location = text(columns.location);
    let operator = text(columns.operator);
    let aircraft_type = text(columns.aircraft_type);
    let aboard = text(columns.aboard);
    let fatalities = text(columns.fatalities);
    let ground = text(columns.ground);

    let mut records = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let Some(crash_date) = cell(Some(dates), row).and_then(parse_date) else {
            debug!(row, "Skipping row without a usable date");
            report.rows_skipped += 1;
            continue;
        };

        records.push(CrashRecord::new(
            crash_date,
            cell(location, row).map(str::to_string),
            cell(operator, row).map(str::to_string),
            cell(aircraft_type, row).map(str::to_string),
            cell(aboard, row).and_then(parse_int),
            cell(fatalities, row).and_then(parse_int),
            cell(ground, row).and_then(parse_int),
        ));
    }

    records
}

fn cell(column: Option<&StringArray>, row: usize) -> Option<&str> {
    let column = column?;
    if column.is_null(row) {
        return None;
    }
    let value = column.value(row).trim();
    (!value.is_empty()).then_some(value)
}

/// `MM/dd/yyyy`; four-digit years only so the partition folder parses back.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let date = NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()?;
    (1000..=9999).contains(&date.year()).then_some(date)
}

/// Integer cast; decimal text is truncated and anything else becomes null.
pub fn parse_int(value: &str) -> Option<i32> {
    let value = value.trim();
    if let Ok(n) = value.parse::<i32>() {
        return Some(n);
    }
    let n = value.parse::<f64>().ok()?;
    (n.is_finite() && n.abs() < f64::from(i32::MAX)).then(|| n.trunc() as i32)
}
