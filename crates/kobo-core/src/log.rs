//! Raw rows of the machine processing log.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::table::{cell, Table};

pub const UNKNOWN_PROJECT: &str = "Unknown";

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M",
];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// One line of the processing log, exactly as the collector wrote it.
///
/// The timestamp stays a string: it is fingerprinted verbatim and only
/// parsed when events are derived.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawLogRow {
    pub timestamp: String,
    pub project: String,
    #[serde(default)]
    pub part: String,
    pub path: String,
    #[serde(default)]
    pub message: String,
}

impl RawLogRow {
    pub fn new(timestamp: &str, project: &str, part: &str, path: &str) -> Self {
        Self {
            timestamp: timestamp.to_string(),
            project: project.to_string(),
            part: part.to_string(),
            path: path.to_string(),
            message: String::new(),
        }
    }

    pub fn parsed_timestamp(&self) -> Option<NaiveDateTime> {
        parse_log_timestamp(&self.timestamp)
    }
}

/// Extracts log rows from a table with `TIMESTAMP, PROJECT, PATH` and
/// optional `PART, MESSAGE` headers. Without a `TIMESTAMP` column there is
/// nothing to derive from, so the result is empty.
pub fn rows_from_table(table: &Table) -> Vec<RawLogRow> {
    let Some(timestamp_col) = table.column("TIMESTAMP") else {
        warn!(headers = ?table.headers, "processing log has no TIMESTAMP column");
        return Vec::new();
    };
    let project_col = table.column("PROJECT");
    let part_col = table.column("PART");
    let path_col = table.column("PATH");
    let message_col = table.column("MESSAGE");

    table
        .rows
        .iter()
        .map(|row| RawLogRow {
            timestamp: cell(row, Some(timestamp_col)).to_string(),
            project: match project_col {
                Some(_) => cell(row, project_col).trim().to_string(),
                None => UNKNOWN_PROJECT.to_string(),
            },
            part: cell(row, part_col).trim().to_string(),
            path: cell(row, path_col).to_string(),
            message: cell(row, message_col).to_string(),
        })
        .collect()
}

/// Parses the timestamp spellings the log collectors emit. RFC 3339 values
/// are converted to local wall-clock time.
pub fn parse_log_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    for format in DATETIME_FORMATS {
        if let Ok(value) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(value);
        }
    }
    if let Ok(value) = DateTime::parse_from_rfc3339(raw) {
        return Some(value.with_timezone(&Local).naive_local());
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_spellings() {
        let expected = NaiveDate::from_ymd_opt(2026, 10, 1)
            .and_then(|d| d.and_hms_opt(9, 30, 0))
            .expect("date");
        assert_eq!(parse_log_timestamp("2026-10-01 09:30:00"), Some(expected));
        assert_eq!(parse_log_timestamp("2026/10/01 09:30:00"), Some(expected));
        assert_eq!(parse_log_timestamp("2026-10-01T09:30:00"), Some(expected));
        assert_eq!(parse_log_timestamp("2026-10-01 09:30"), Some(expected));
        assert_eq!(
            parse_log_timestamp("2026-10-01"),
            NaiveDate::from_ymd_opt(2026, 10, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
        );
        assert!(parse_log_timestamp("2026-10-01T09:30:00+09:00").is_some());
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_log_timestamp(""), None);
        assert_eq!(parse_log_timestamp("nan"), None);
        assert_eq!(parse_log_timestamp("yesterday"), None);
        assert_eq!(parse_log_timestamp("2026-13-40 00:00:00"), None);
    }

    #[test]
    fn rows_from_table_defaults_optional_columns() {
        let table = Table::from_rows(
            &["TIMESTAMP", "PROJECT", "PATH"],
            &[&["2026-10-01 09:30:00", " 剣 ", "剣_表.nc"]],
        );
        let rows = rows_from_table(&table);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].project, "剣");
        assert_eq!(rows[0].part, "");
        assert_eq!(rows[0].message, "");
    }

    #[test]
    fn missing_project_column_becomes_unknown() {
        let table = Table::from_rows(&["timestamp", "path"], &[&["2026-10-01", "a_face.nc"]]);
        let rows = rows_from_table(&table);
        assert_eq!(rows[0].project, UNKNOWN_PROJECT);
    }

    #[test]
    fn missing_timestamp_column_yields_nothing() {
        let table = Table::from_rows(&["PROJECT", "PATH"], &[&["剣", "剣_表.nc"]]);
        assert!(rows_from_table(&table).is_empty());
    }
}
