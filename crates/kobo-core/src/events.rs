//! Derivation of calendar-ready production events from the processing log.
//!
//! Events are never stored. Every run regroups the raw rows by
//! `(day, project, part)` and scores each group by which sides of the piece
//! were machined.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classify::{classify_part, classify_process, classify_side, PartKind, Process, Side};
use crate::fingerprint::fingerprint;
use crate::ledger::{ConfirmedHashes, LedgerEntry};
use crate::log::RawLogRow;

pub const DEFAULT_LOOKBACK_DAYS: u32 = 90;
pub const COLOR_READY: &str = "#28a745";
pub const COLOR_REVIEW: &str = "#ffc107";
pub const REFERENCE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Low,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Low => "low",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Confidence::High => COLOR_READY,
            Confidence::Low => COLOR_REVIEW,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductionEvent {
    pub title: String,
    pub date: NaiveDate,
    pub project: String,
    pub part: String,
    /// Component machined, from the row paths: sheath only when every row
    /// names the sheath.
    pub component: PartKind,
    /// Known sides observed in the group; never contains `Side::Unknown`.
    pub sides: BTreeSet<Side>,
    pub processes: BTreeSet<Process>,
    /// Rows whose path carried no side marker.
    pub unclassified_rows: usize,
    pub confidence: Confidence,
    pub constituent_hashes: Vec<String>,
    pub last_observed_at: NaiveDateTime,
}

impl ProductionEvent {
    pub fn source_hashes(&self) -> String {
        self.constituent_hashes.join(",")
    }

    pub fn reference_timestamp(&self) -> String {
        self.last_observed_at
            .format(REFERENCE_TIMESTAMP_FORMAT)
            .to_string()
    }

    pub fn details(&self) -> String {
        let sides = if self.sides.is_empty() {
            "none".to_string()
        } else {
            self.sides
                .iter()
                .map(|side| side.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut details = format!("Sides: {}", sides);
        if !self.processes.is_empty() {
            let processes = self
                .processes
                .iter()
                .map(|process| process.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            details.push_str(&format!("; Processes: {}", processes));
        }
        if self.unclassified_rows > 0 {
            details.push_str(&format!("; Unclassified rows: {}", self.unclassified_rows));
        }
        details
    }

    pub fn to_calendar(&self) -> CalendarEvent {
        CalendarEvent {
            title: self.title.clone(),
            start: self.date.format("%Y-%m-%d").to_string(),
            color: self.confidence.color().to_string(),
            extended_props: CalendarEventProps {
                details: self.details(),
                project: self.project.clone(),
                part: self.part.clone(),
                confidence: self.confidence,
                source_hashes: self.source_hashes(),
                atlas_timestamp: self.reference_timestamp(),
            },
        }
    }
}

/// Event shape handed to the calendar front end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalendarEvent {
    pub title: String,
    pub start: String,
    pub color: String,
    #[serde(rename = "extendedProps")]
    pub extended_props: CalendarEventProps,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalendarEventProps {
    pub details: String,
    pub project: String,
    pub part: String,
    pub confidence: Confidence,
    pub source_hashes: String,
    pub atlas_timestamp: String,
}

#[derive(Default)]
struct GroupAccumulator {
    sides: BTreeSet<Side>,
    processes: BTreeSet<Process>,
    unclassified_rows: usize,
    body_rows: usize,
    hashes: Vec<String>,
    last_observed_at: Option<NaiveDateTime>,
}

pub fn derive_events(
    rows: &[RawLogRow],
    now: NaiveDateTime,
    lookback: Duration,
) -> Vec<ProductionEvent> {
    let cutoff = now.checked_sub_signed(lookback);
    let mut groups = BTreeMap::<(NaiveDate, String, String), GroupAccumulator>::new();

    for row in rows {
        let Some(observed_at) = row.parsed_timestamp() else {
            debug!(timestamp = %row.timestamp, project = %row.project, "dropping row with unparsable timestamp");
            continue;
        };
        if cutoff.is_some_and(|cutoff| observed_at < cutoff) {
            debug!(timestamp = %row.timestamp, project = %row.project, "dropping row outside lookback window");
            continue;
        }

        let key = (observed_at.date(), row.project.clone(), row.part.clone());
        let group = groups.entry(key).or_default();
        match classify_side(&row.path) {
            Side::Unknown => group.unclassified_rows += 1,
            side => {
                group.sides.insert(side);
            }
        }
        if classify_part(&row.path) != PartKind::Sheath {
            group.body_rows += 1;
        }
        match classify_process(&row.path) {
            Process::Unknown => {}
            process => {
                group.processes.insert(process);
            }
        }
        group.hashes.push(fingerprint(row));
        group.last_observed_at = Some(
            group
                .last_observed_at
                .map_or(observed_at, |seen| seen.max(observed_at)),
        );
    }

    groups
        .into_iter()
        .filter_map(|((date, project, part), group)| {
            let last_observed_at = group.last_observed_at?;
            let confidence =
                if group.sides.contains(&Side::Face) && group.sides.contains(&Side::Back) {
                    Confidence::High
                } else {
                    Confidence::Low
                };
            let title = if part.is_empty() {
                project.clone()
            } else {
                format!("{} ({})", project, part)
            };
            Some(ProductionEvent {
                title,
                date,
                project,
                part,
                component: if group.body_rows == 0 {
                    PartKind::Sheath
                } else {
                    PartKind::Body
                },
                sides: group.sides,
                processes: group.processes,
                unclassified_rows: group.unclassified_rows,
                confidence,
                constituent_hashes: group.hashes,
                last_observed_at,
            })
        })
        .collect()
}

/// [`derive_events`] against the local wall clock.
pub fn derive_events_now(rows: &[RawLogRow], lookback_days: u32) -> Vec<ProductionEvent> {
    derive_events(
        rows,
        Local::now().naive_local(),
        Duration::days(i64::from(lookback_days)),
    )
}

/// Events still awaiting operator confirmation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingQueue {
    /// Both sides observed; safe to confirm.
    pub ready: Vec<ProductionEvent>,
    /// Single side observed; needs a human look before confirming.
    pub review: Vec<ProductionEvent>,
}

impl PendingQueue {
    pub fn is_empty(&self) -> bool {
        self.ready.is_empty() && self.review.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProductionEvent> {
        self.ready.iter().chain(self.review.iter())
    }
}

pub fn pending_events(events: &[ProductionEvent], entries: &[LedgerEntry]) -> PendingQueue {
    let confirmed = ConfirmedHashes::from_entries(entries);
    let mut queue = PendingQueue::default();
    for event in events {
        if confirmed.covers(event) {
            continue;
        }
        match event.confidence {
            Confidence::High => queue.ready.push(event.clone()),
            Confidence::Low => queue.review.push(event.clone()),
        }
    }
    queue
}
