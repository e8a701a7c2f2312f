//! Year partition keys and Hive-style partition paths
//!
//! Storage folders are laid out as `{prefix}year={year}/`. Legacy folders may
//! spell the key `Year=` and nest further keys below it
//! (`{prefix}Year=1985/month=3/`), so matching is case-insensitive.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{DwhError, Result};

/// Partition column name in the catalog and in canonical storage paths.
pub const PARTITION_COLUMN: &str = "year";

static YEAR_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|/)year=([0-9]{4})(?:$|[^0-9])").expect("valid year pattern")
});

/// A year partition and the storage location it maps to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PartitionSpec {
    pub year: i32,
    pub location: String,
}

impl PartitionSpec {
    pub fn new(year: i32, location: impl Into<String>) -> Self {
        Self {
            year,
            location: location.into(),
        }
    }
}

/// Extract the partition year from a storage key or catalog location.
///
/// Matches a `year=YYYY` path segment in any letter case. Returns `None`
/// when the segment is absent or malformed; never panics.
pub fn parse_year(path: &str) -> Option<i32> {
    YEAR_SEGMENT
        .captures(path)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<i32>().ok())
}

/// Canonical partition folder under `prefix`: `{prefix}year={year}/`.
pub fn partition_folder(prefix: &str, year: i32) -> String {
    format!("{}{}={}/", normalize_prefix(prefix), PARTITION_COLUMN, year)
}

/// Ensure a non-empty prefix ends with `/`.
pub fn normalize_prefix(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{}/", prefix)
    }
}

/// Prefix with surrounding slashes removed and one trailing `/`; empty for the
/// bucket root.
fn root_relative(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

/// True for an empty or all-`/` prefix, i.e. the whole bucket.
pub fn is_root_prefix(prefix: &str) -> bool {
    root_relative(prefix).is_empty()
}

/// True when one prefix equals or contains the other, compared segment-wise
/// after normalization. The bucket root overlaps everything.
pub fn prefixes_overlap(a: &str, b: &str) -> bool {
    let a = root_relative(a);
    let b = root_relative(b);
    a.is_empty() || b.is_empty() || a.starts_with(&b) || b.starts_with(&a)
}

/// True when the object `key` lies under `prefix`.
pub fn key_under_prefix(key: &str, prefix: &str) -> bool {
    let prefix = root_relative(prefix);
    prefix.is_empty() || key.trim_start_matches('/').starts_with(&prefix)
}

/// Check that `location` can be registered as the partition for `year`.
///
/// The location must be an `s3://bucket/...` URI free of quotes, backslashes,
/// whitespace and control characters, and the year encoded in it must equal
/// `year`.
pub fn validate_location(year: i32, location: &str) -> Result<()> {
    let Some(rest) = location.strip_prefix("s3://") else {
        return Err(DwhError::invalid_partition(format!(
            "year={} location '{}' is not an s3:// URI",
            year, location
        )));
    };

    let bucket = rest.split('/').next().unwrap_or_default();
    if bucket.is_empty() {
        return Err(DwhError::invalid_partition(format!(
            "year={} location '{}' has no bucket",
            year, location
        )));
    }

    if let Some(bad) = location
        .chars()
        .find(|c| matches!(c, '\'' | '"' | '\\') || c.is_whitespace() || c.is_control())
    {
        return Err(DwhError::invalid_partition(format!(
            "year={} location contains forbidden character {:?}",
            year, bad
        )));
    }

    match parse_year(location) {
        Some(found) if found == year => Ok(()),
        Some(found) => Err(DwhError::invalid_partition(format!(
            "year={} does not match year={} encoded in location '{}'",
            year, found, location
        ))),
        None => Err(DwhError::invalid_partition(format!(
            "year={} location '{}' carries no year=YYYY segment",
            year, location
        ))),
    }
}

/// Keep the first location seen for each year, preserving discovery order.
pub fn dedup_by_year(specs: impl IntoIterator<Item = PartitionSpec>) -> Vec<PartitionSpec> {
    let mut seen = std::collections::HashSet::new();
    specs
        .into_iter()
        .filter(|spec| seen.insert(spec.year))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lowercase_and_legacy_keys() {
        assert_eq!(parse_year("plane_crashes/processed_parquet/year=2009/"), Some(2009));
        assert_eq!(
            parse_year("plane_crashes/processed_parquet/Year=1981/Month=1/part-0.parquet"),
            Some(1981)
        );
        assert_eq!(parse_year("YEAR=1970"), Some(1970));
        assert_eq!(
            parse_year("s3://bucket/processed/year=1985/"),
            Some(1985)
        );
    }

    #[test]
    fn rejects_paths_without_year_segment() {
        assert_eq!(parse_year("plane_crashes/raw_hf_airplane_crashes.csv"), None);
        assert_eq!(parse_year("processed/year=85/"), None);
        assert_eq!(parse_year("processed/year=19855/"), None);
        assert_eq!(parse_year("processed/myyear=1985/"), None);
        assert_eq!(parse_year("processed/year=abcd/"), None);
        assert_eq!(parse_year(""), None);
    }

    #[test]
    fn parser_is_total_on_odd_input() {
        for input in ["year=", "/", "year=\u{0}1985", "ÿÿÿ/year=1", "year=１９８５"] {
            let _ = parse_year(input);
        }
    }

    #[test]
    fn partition_folder_is_canonical() {
        assert_eq!(
            partition_folder("plane_crashes/processed_parquet", 1985),
            "plane_crashes/processed_parquet/year=1985/"
        );
        assert_eq!(partition_folder("", 2001), "year=2001/");
    }

    #[test]
    fn overlapping_prefixes_are_detected() {
        let processed = "plane_crashes/processed_parquet/";
        assert!(prefixes_overlap(processed, "plane_crashes/processed_parquet"));
        assert!(prefixes_overlap("/plane_crashes/processed_parquet//", processed));
        assert!(prefixes_overlap("plane_crashes/", processed));
        assert!(prefixes_overlap(processed, "plane_crashes/processed_parquet/Year=1985/"));
        assert!(prefixes_overlap("", processed));
        assert!(prefixes_overlap(processed, "/"));

        assert!(!prefixes_overlap(processed, "plane_crashes/processed_parquet_year_only/"));
        assert!(!prefixes_overlap("a/b", "a/bc"));
    }

    #[test]
    fn keys_under_prefix() {
        assert!(key_under_prefix("processed/raw.csv", "processed"));
        assert!(key_under_prefix("processed/x/raw.csv", "/processed/"));
        assert!(key_under_prefix("raw.csv", "/"));
        assert!(!key_under_prefix("processed_raw.csv", "processed"));
        assert!(!key_under_prefix("raw/crashes.csv", "processed/"));

        assert!(is_root_prefix(""));
        assert!(is_root_prefix("//"));
        assert!(!is_root_prefix("processed/"));
    }

    #[test]
    fn validate_location_accepts_matching_year() {
        assert!(validate_location(1985, "s3://bucket/processed/year=1985/").is_ok());
        assert!(validate_location(1985, "s3://bucket/processed/Year=1985/month=1/").is_ok());
    }

    #[test]
    fn validate_location_rejects_bad_locations() {
        let cases = [
            "bucket/processed/year=1985/",
            "s3:///processed/year=1985/",
            "s3://bucket/processed/year=1986/",
            "s3://bucket/processed/",
            "s3://bucket/pro'cessed/year=1985/",
            "s3://bucket/pro cessed/year=1985/",
        ];
        for location in cases {
            let err = validate_location(1985, location).unwrap_err();
            assert_eq!(err.code(), "E002", "{location}");
        }
    }

    #[test]
    fn dedup_keeps_first_location() {
        let specs = vec![
            PartitionSpec::new(1990, "s3://b/p/year=1990/"),
            PartitionSpec::new(1985, "s3://b/p/year=1985/"),
            PartitionSpec::new(1990, "s3://b/other/year=1990/"),
        ];
        let deduped = dedup_by_year(specs);
        assert_eq!(
            deduped,
            vec![
                PartitionSpec::new(1990, "s3://b/p/year=1990/"),
                PartitionSpec::new(1985, "s3://b/p/year=1985/"),
            ]
        );
    }
}
