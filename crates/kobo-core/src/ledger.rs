//! Append-only confirmation ledger.
//!
//! Operators assert completions (`PRODUCED`) and retract them (`CANCEL`).
//! Nothing is ever rewritten: a cancel is a compensating record, and every
//! view over the ledger is a fold of the full history in file order.

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::classify::PartKind;
use crate::events::ProductionEvent;
use crate::fingerprint::split_hashes;
use crate::normalize::normalize_key;

pub const LEDGER_HEADERS: [&str; 6] = [
    "TIMESTAMP",
    "PROJECT",
    "PART",
    "ACTION",
    "SOURCE_HASHES",
    "ATLAS_TIMESTAMP",
];
pub const RECORDED_AT_FORMAT: &str = "%Y/%m/%d %H:%M:%S";
pub const DEFAULT_PART: &str = "本体";
pub const SHEATH_PART: &str = "鞘";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Ledger encoding error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerAction {
    Produced,
    Cancel,
}

impl LedgerAction {
    pub fn as_str(self) -> &'static str {
        match self {
            LedgerAction::Produced => "PRODUCED",
            LedgerAction::Cancel => "CANCEL",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "PRODUCED" => Some(Self::Produced),
            "CANCEL" => Some(Self::Cancel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerEntry {
    pub recorded_at: String,
    pub project: String,
    pub part: String,
    pub action: LedgerAction,
    /// Comma-joined row fingerprints; empty for manual cancels.
    pub source_hashes: String,
    pub reference_timestamp: String,
}

impl LedgerEntry {
    pub fn new(
        project: &str,
        part: &str,
        action: LedgerAction,
        source_hashes: &str,
        reference_timestamp: &str,
    ) -> Self {
        Self {
            recorded_at: Local::now().format(RECORDED_AT_FORMAT).to_string(),
            project: project.to_string(),
            part: part.to_string(),
            action,
            source_hashes: source_hashes.to_string(),
            reference_timestamp: reference_timestamp.to_string(),
        }
    }

    pub fn hashes(&self) -> impl Iterator<Item = &str> {
        split_hashes(&self.source_hashes)
    }

    fn to_record(&self) -> [&str; 6] {
        [
            self.recorded_at.as_str(),
            self.project.as_str(),
            self.part.as_str(),
            self.action.as_str(),
            self.source_hashes.as_str(),
            self.reference_timestamp.as_str(),
        ]
    }
}

/// CSV-backed ledger file. The header row is written once, when the file is
/// first created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(
        &self,
        project: &str,
        part: &str,
        action: LedgerAction,
        source_hashes: &str,
        reference_timestamp: &str,
    ) -> Result<LedgerEntry, LedgerError> {
        let entry = LedgerEntry::new(project, part, action, source_hashes, reference_timestamp);
        self.append_entry(&entry)?;
        Ok(entry)
    }

    /// Appends one record under an exclusive file lock. The record is either
    /// fully written or, on failure, rolled back; no retry happens here.
    pub fn append_entry(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.lock_exclusive()?;
        let written = write_record_locked(&mut file, entry);
        let unlocked = FileExt::unlock(&file);
        written?;
        unlocked?;
        info!(
            project = %entry.project,
            part = %entry.part,
            action = entry.action.as_str(),
            path = %self.path.display(),
            "ledger record appended"
        );
        Ok(())
    }

    /// All records in append order. A missing file is an empty ledger.
    pub fn read_all(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path)?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);
        let headers = reader.headers()?.clone();
        let column = |name: &str, fallback: usize| {
            headers
                .iter()
                .position(|header| {
                    header
                        .trim_start_matches('\u{feff}')
                        .trim()
                        .eq_ignore_ascii_case(name)
                })
                .unwrap_or(fallback)
        };
        let columns = LEDGER_HEADERS
            .iter()
            .enumerate()
            .map(|(idx, name)| column(name, idx))
            .collect::<Vec<_>>();

        let mut entries = Vec::new();
        for (idx, record) in reader.records().enumerate() {
            let line = idx + 2;
            let record = match record {
                Ok(record) => record,
                Err(err) => {
                    debug!(line, %err, "skipping malformed ledger record");
                    continue;
                }
            };
            let field = |pos: usize| record.get(columns[pos]).unwrap_or("").to_string();
            let raw_action = field(3);
            let Some(action) = LedgerAction::parse(&raw_action) else {
                debug!(line, action = %raw_action, "skipping ledger record with unknown action");
                continue;
            };
            entries.push(LedgerEntry {
                recorded_at: field(0),
                project: field(1),
                part: field(2),
                action,
                source_hashes: field(4),
                reference_timestamp: field(5),
            });
        }
        Ok(entries)
    }
}

fn write_record_locked(file: &mut File, entry: &LedgerEntry) -> Result<(), LedgerError> {
    let start_len = file.metadata()?.len();
    let mut buffer = Vec::new();
    {
        let mut writer = csv::Writer::from_writer(&mut buffer);
        if start_len == 0 {
            writer.write_record(LEDGER_HEADERS)?;
        }
        writer.write_record(entry.to_record())?;
        writer.flush()?;
    }
    if let Err(err) = file.write_all(&buffer).and_then(|_| file.sync_data()) {
        if let Err(rollback) = file.set_len(start_len) {
            warn!(%rollback, "failed to roll back partial ledger write");
        }
        return Err(err.into());
    }
    Ok(())
}

/// Every fingerprint that has ever been asserted in the ledger.
#[derive(Debug, Clone, Default)]
pub struct ConfirmedHashes {
    hashes: HashSet<String>,
}

impl ConfirmedHashes {
    pub fn from_entries(entries: &[LedgerEntry]) -> Self {
        let hashes = entries
            .iter()
            .flat_map(|entry| entry.hashes().map(ToString::to_string))
            .collect();
        Self { hashes }
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.hashes.contains(hash.trim())
    }

    /// True when any one of the event's rows was already asserted.
    pub fn covers(&self, event: &ProductionEvent) -> bool {
        event
            .constituent_hashes
            .iter()
            .any(|hash| self.contains(hash))
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn covers_any<'a>(&self, hashes: impl IntoIterator<Item = &'a str>) -> bool {
        hashes.into_iter().any(|hash| self.contains(hash))
    }
}

pub fn already_confirmed(event: &ProductionEvent, entries: &[LedgerEntry]) -> bool {
    ConfirmedHashes::from_entries(entries).covers(event)
}

/// PRODUCED minus CANCEL per normalized project key. Parts are not
/// distinguished.
pub fn net_confirmed(entries: &[LedgerEntry]) -> BTreeMap<String, i64> {
    let mut net = BTreeMap::new();
    for entry in entries {
        let key = normalize_key(&entry.project);
        if key.is_empty() {
            continue;
        }
        let delta = match entry.action {
            LedgerAction::Produced => 1,
            LedgerAction::Cancel => -1,
        };
        *net.entry(key).or_insert(0) += delta;
    }
    net
}

/// Result of an operator action, suitable for showing as-is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionOutcome {
    pub success: bool,
    pub message: String,
}

impl ActionOutcome {
    fn ok(message: String) -> Self {
        Self {
            success: true,
            message,
        }
    }

    fn failed(message: String) -> Self {
        Self {
            success: false,
            message,
        }
    }
}

pub fn confirm_production(
    ledger: &Ledger,
    project: &str,
    part: Option<&str>,
    source_hashes: &str,
    reference_timestamp: &str,
) -> ActionOutcome {
    record_action(
        ledger,
        project,
        part,
        LedgerAction::Produced,
        source_hashes,
        reference_timestamp,
    )
}

pub fn cancel_confirmation(ledger: &Ledger, project: &str, part: Option<&str>) -> ActionOutcome {
    record_action(ledger, project, part, LedgerAction::Cancel, "", "")
}

/// Confirms a derived event unless any of its rows is already in the ledger.
pub fn confirm_event(
    ledger: &Ledger,
    event: &ProductionEvent,
    entries: &[LedgerEntry],
) -> ActionOutcome {
    if already_confirmed(event, entries) {
        return ActionOutcome::failed(format!(
            "{} on {} is already confirmed",
            event.title, event.date
        ));
    }
    let part = if !event.part.is_empty() {
        event.part.as_str()
    } else if event.component == PartKind::Sheath {
        SHEATH_PART
    } else {
        DEFAULT_PART
    };
    confirm_production(
        ledger,
        &event.project,
        Some(part),
        &event.source_hashes(),
        &event.reference_timestamp(),
    )
}

fn record_action(
    ledger: &Ledger,
    project: &str,
    part: Option<&str>,
    action: LedgerAction,
    source_hashes: &str,
    reference_timestamp: &str,
) -> ActionOutcome {
    let project = project.trim();
    if project.is_empty() {
        return ActionOutcome::failed("project is required".to_string());
    }
    let part = part
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .unwrap_or(DEFAULT_PART);
    match ledger.append(project, part, action, source_hashes, reference_timestamp) {
        Ok(_) => ActionOutcome::ok(format!(
            "Recorded {} for {} ({})",
            action.as_str(),
            project,
            part
        )),
        Err(err) => ActionOutcome::failed(format!(
            "Failed to record {} for {} ({}): {}",
            action.as_str(),
            project,
            part,
            err
        )),
    }
}
