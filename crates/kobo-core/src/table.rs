//! Raw tabular rows and keyword-based column discovery.
//!
//! Spreadsheet exports rename their headers freely, so columns are located
//! by keyword rather than position. All keyword tables live here; adding a
//! locale variant means adding a keyword, not touching the callers.

use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("Failed to read table: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse table: {0}")]
    Csv(#[from] csv::Error),
}

/// Header row plus string cells, as produced by an external ingestion step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Builds a table from string literals; handy for callers that already
    /// hold materialized rows.
    pub fn from_rows(headers: &[&str], rows: &[&[&str]]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect(),
        }
    }

    /// Index of the header equal to `name`, ignoring case and surrounding space.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|header| header.trim().eq_ignore_ascii_case(name.trim()))
    }
}

/// Cell text, or `""` when the row is short or the column is absent.
pub fn cell(row: &[String], column: Option<usize>) -> &str {
    column
        .and_then(|idx| row.get(idx))
        .map(|value| value.as_str())
        .unwrap_or("")
}

pub fn read_csv_table(path: &Path) -> Result<Table, TableError> {
    let file = fs::File::open(path)?;
    read_csv(file)
}

/// Reads CSV with a header row. Ragged rows are accepted; rows that fail to
/// decode are skipped.
pub fn read_csv<R: Read>(reader: R) -> Result<Table, TableError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    let headers = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(idx, header)| {
            let header = if idx == 0 {
                header.trim_start_matches('\u{feff}')
            } else {
                header
            };
            header.trim().to_string()
        })
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        match record {
            Ok(record) => rows.push(record.iter().map(ToString::to_string).collect()),
            Err(err) => debug!(row = idx + 2, %err, "skipping undecodable row"),
        }
    }
    Ok(Table { headers, rows })
}

/// One discovery rule: the first unclaimed header containing any keyword
/// (case-insensitive) becomes the column for `field`.
#[derive(Debug, Clone, Copy)]
pub struct ColumnRule<F> {
    pub field: F,
    pub keywords: &'static [&'static str],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MasterField {
    Name,
    Part,
    Stock,
    Price,
    Target,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SalesField {
    Project,
    Process,
}

pub const MASTER_RULES: &[ColumnRule<MasterField>] = &[
    ColumnRule {
        field: MasterField::Name,
        keywords: &["商品名", "project", "name", "品名"],
    },
    ColumnRule {
        field: MasterField::Part,
        keywords: &["部位", "part", "category", "type"],
    },
    // Ahead of Stock: target headers also carry `qty`/`数量`.
    ColumnRule {
        field: MasterField::Target,
        keywords: &["目標", "target"],
    },
    ColumnRule {
        field: MasterField::Stock,
        keywords: &["在庫数", "在庫", "stock", "qty", "数量"],
    },
    ColumnRule {
        field: MasterField::Price,
        keywords: &["単価", "価格", "price", "金額"],
    },
];

pub const SALES_RULES: &[ColumnRule<SalesField>] = &[
    ColumnRule {
        field: SalesField::Project,
        keywords: &["project", "商品名", "job"],
    },
    ColumnRule {
        field: SalesField::Process,
        keywords: &["path", "工程", "process", "status"],
    },
];

/// Column indices resolved once per dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSchema<F: Ord> {
    columns: BTreeMap<F, usize>,
}

impl<F: Ord + Copy> ResolvedSchema<F> {
    pub fn get(&self, field: F) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    pub fn has(&self, field: F) -> bool {
        self.columns.contains_key(&field)
    }
}

pub fn resolve_schema<F: Ord + Copy>(headers: &[String], rules: &[ColumnRule<F>]) -> ResolvedSchema<F> {
    let lowered = headers
        .iter()
        .map(|header| header.to_lowercase())
        .collect::<Vec<_>>();
    let mut claimed = vec![false; headers.len()];
    let mut columns = BTreeMap::new();
    for rule in rules {
        let found = lowered.iter().enumerate().find(|(idx, header)| {
            !claimed[*idx] && rule.keywords.iter().any(|kw| header.contains(kw))
        });
        if let Some((idx, _)) = found {
            claimed[idx] = true;
            columns.insert(rule.field, idx);
        }
    }
    ResolvedSchema { columns }
}

/// Lenient integer parse: accepts `"5"`, `"5.0"`, `"1,200"`, `"¥1,200"`.
/// Anything else is `None`.
pub fn parse_quantity(raw: &str) -> Option<i64> {
    let cleaned = raw
        .trim()
        .trim_start_matches(&['¥', '￥', '$'][..])
        .replace(',', "");
    if cleaned.is_empty() {
        return None;
    }
    if let Ok(value) = cleaned.parse::<i64>() {
        return Some(value);
    }
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .map(|value| value.trunc() as i64)
}
