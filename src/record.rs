//! Crash records and their Arrow representation.
//!
//! Column names are lowercase to match the external table. The partition
//! column `year` lives in the folder name, never inside the files.

use std::fmt;
use std::sync::{Arc, OnceLock};

use arrow::array::{ArrayRef, BooleanBuilder, Date32Builder, Int32Builder, RecordBatch, StringBuilder};
use arrow::datatypes::{DataType, Date32Type, Field, Schema, SchemaRef};
use chrono::{Datelike, NaiveDate};

use crate::error::Result;

pub mod field {
    pub const CRASH_DATE: &str = "crash_date";
    pub const LOCATION: &str = "location";
    pub const OPERATOR: &str = "operator";
    pub const AIRCRAFT_TYPE: &str = "type";
    pub const AIRCRAFT_MAKER: &str = "aircraft_maker";
    pub const ABOARD: &str = "aboard";
    pub const FATALITIES: &str = "fatalities";
    pub const GROUND: &str = "ground";
    pub const SURVIVORS: &str = "survivors";
    pub const IS_FATAL: &str = "is_fatal";
    pub const CRASH_SEVERITY: &str = "crash_severity";
}

/// Fatality share bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "None",
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
        }
    }

    /// Bucket a crash by the share of people aboard who died.
    ///
    /// Anything that fails every bucket is `High`: unknown fatalities, and
    /// deaths with an unknown or zero head count.
    pub fn classify(aboard: Option<i32>, fatalities: Option<i32>) -> Severity {
        if fatalities == Some(0) {
            return Severity::None;
        }

        match severity_pct(aboard, fatalities) {
            Some(pct) if pct < 5.0 => Severity::Low,
            Some(pct) if pct < 30.0 => Severity::Medium,
            _ => Severity::High,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `fatalities / aboard * 100`, rounded to one decimal place.
pub fn severity_pct(aboard: Option<i32>, fatalities: Option<i32>) -> Option<f64> {
    match (aboard, fatalities) {
        (Some(aboard), Some(fatalities)) if aboard != 0 => {
            let pct = f64::from(fatalities) / f64::from(aboard) * 100.0;
            Some((pct * 10.0).round() / 10.0)
        }
        _ => None,
    }
}

/// First whitespace-separated token of the aircraft type.
pub fn aircraft_maker(aircraft_type: Option<&str>) -> Option<String> {
    aircraft_type
        .and_then(|t| t.split_whitespace().next())
        .map(str::to_string)
}

/// One crash row after cleaning, with derived fields filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct CrashRecord {
    pub crash_date: NaiveDate,
    pub location: Option<String>,
    pub operator: Option<String>,
    pub aircraft_type: Option<String>,
    pub aircraft_maker: Option<String>,
    pub aboard: Option<i32>,
    pub fatalities: Option<i32>,
    pub ground: Option<i32>,
    pub survivors: Option<i32>,
    pub is_fatal: Option<bool>,
    pub crash_severity: Severity,
}

impl CrashRecord {
    /// Build a record from raw fields, computing every derived column.
    pub fn new(
        crash_date: NaiveDate,
        location: Option<String>,
        operator: Option<String>,
        aircraft_type: Option<String>,
        aboard: Option<i32>,
        fatalities: Option<i32>,
        ground: Option<i32>,
    ) -> Self {
        let survivors = match (aboard, fatalities) {
            (Some(a), Some(f)) => a.checked_sub(f),
            _ => None,
        };

        Self {
            crash_date,
            aircraft_maker: aircraft_maker(aircraft_type.as_deref()),
            location,
            operator,
            aircraft_type,
            aboard,
            fatalities,
            ground,
            survivors,
            is_fatal: fatalities.map(|f| f > 0),
            crash_severity: Severity::classify(aboard, fatalities),
        }
    }

    pub fn year(&self) -> i32 {
        self.crash_date.year()
    }
}

/// Arrow schema of the processed Parquet files.
pub fn arrow_schema() -> SchemaRef {
    static SCHEMA: OnceLock<SchemaRef> = OnceLock::new();
    SCHEMA
        .get_or_init(|| {
            Arc::new(Schema::new(vec![
                Field::new(field::CRASH_DATE, DataType::Date32, false),
                Field::new(field::LOCATION, DataType::Utf8, true),
                Field::new(field::OPERATOR, DataType::Utf8, true),
                Field::new(field::AIRCRAFT_TYPE, DataType::Utf8, true),
                Field::new(field::AIRCRAFT_MAKER, DataType::Utf8, true),
                Field::new(field::ABOARD, DataType::Int32, true),
                Field::new(field::FATALITIES, DataType::Int32, true),
                Field::new(field::GROUND, DataType::Int32, true),
                Field::new(field::SURVIVORS, DataType::Int32, true),
                Field::new(field::IS_FATAL, DataType::Boolean, true),
                Field::new(field::CRASH_SEVERITY, DataType::Utf8, true),
            ]))
        })
        .clone()
}

/// Convert records into a single batch with [`arrow_schema`].
pub fn to_record_batch(records: &[CrashRecord]) -> Result<RecordBatch> {
    let capacity = records.len();
    let mut crash_date = Date32Builder::with_capacity(capacity);
    let mut location = StringBuilder::with_capacity(capacity, capacity * 16);
    let mut operator = StringBuilder::with_capacity(capacity, capacity * 16);
    let mut aircraft_type = StringBuilder::with_capacity(capacity, capacity * 16);
    let mut maker = StringBuilder::with_capacity(capacity, capacity * 8);
    let mut aboard = Int32Builder::with_capacity(capacity);
    let mut fatalities = Int32Builder::with_capacity(capacity);
    let mut ground = Int32Builder::with_capacity(capacity);
    let mut survivors = Int32Builder::with_capacity(capacity);
    let mut is_fatal = BooleanBuilder::with_capacity(capacity);
    let mut severity = StringBuilder::with_capacity(capacity, capacity * 6);

    for record in records {
        crash_date.append_value(Date32Type::from_naive_date(record.crash_date));
        location.append_option(record.location.as_deref());
        operator.append_option(record.operator.as_deref());
        aircraft_type.append_option(record.aircraft_type.as_deref());
        maker.append_option(record.aircraft_maker.as_deref());
        aboard.append_option(record.aboard);
        fatalities.append_option(record.fatalities);
        ground.append_option(record.ground);
        survivors.append_option(record.survivors);
        is_fatal.append_option(record.is_fatal);
        severity.append_value(record.crash_severity.as_str());
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(crash_date.finish()),
        Arc::new(location.finish()),
        Arc::new(operator.finish()),
        Arc::new(aircraft_type.finish()),
        Arc::new(maker.finish()),
        Arc::new(aboard.finish()),
        Arc::new(fatalities.finish()),
        Arc::new(ground.finish()),
        Arc::new(survivors.finish()),
        Arc::new(is_fatal.finish()),
        Arc::new(severity.finish()),
    ];

    Ok(RecordBatch::try_new(arrow_schema(), columns)?)
}
