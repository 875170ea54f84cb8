//! Keyword classification of processing-log paths.
//!
//! Matching is substring-based over the lower-cased path and the first
//! matching rule wins. Nothing here guesses: a path without a marker is
//! `Unknown`.

use serde::{Deserialize, Serialize};

const FACE_MARKERS: &[&str] = &["face", "front", "omote", "表"];
const BACK_MARKERS: &[&str] = &["back", "rear", "ura", "裏", "base"];
const ROUGH_MARKERS: &[&str] = &["rough", "荒", "ara"];
const FINISH_MARKERS: &[&str] = &["finish", "仕", "shiage", "fin"];
const SHEATH_MARKERS: &[&str] = &["鞘", "saya", "sheath"];
const BODY_MARKERS: &[&str] = &["本体", "body"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Face,
    Back,
    Unknown,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Face => "face",
            Side::Back => "back",
            Side::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Process {
    Rough,
    Finish,
    Unknown,
}

impl Process {
    pub fn as_str(self) -> &'static str {
        match self {
            Process::Rough => "rough",
            Process::Finish => "finish",
            Process::Unknown => "unknown",
        }
    }
}

/// Which physical component a row or master line refers to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PartKind {
    Body,
    Sheath,
    Other,
}

impl PartKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PartKind::Body => "body",
            PartKind::Sheath => "sheath",
            PartKind::Other => "other",
        }
    }
}

pub fn classify_side(path: &str) -> Side {
    let lower = path.to_lowercase();
    if contains_any(&lower, FACE_MARKERS) {
        Side::Face
    } else if contains_any(&lower, BACK_MARKERS) {
        Side::Back
    } else {
        Side::Unknown
    }
}

pub fn classify_process(path: &str) -> Process {
    let lower = path.to_lowercase();
    if contains_any(&lower, ROUGH_MARKERS) {
        Process::Rough
    } else if contains_any(&lower, FINISH_MARKERS) {
        Process::Finish
    } else {
        Process::Unknown
    }
}

/// Component machined by a log path. Paths default to the body.
pub fn classify_part(path: &str) -> PartKind {
    if contains_any(&path.to_lowercase(), SHEATH_MARKERS) {
        PartKind::Sheath
    } else {
        PartKind::Body
    }
}

/// Component named by a master-data part/category label.
pub fn classify_part_label(label: &str) -> PartKind {
    let lower = label.to_lowercase();
    if contains_any(&lower, SHEATH_MARKERS) {
        PartKind::Sheath
    } else if contains_any(&lower, BODY_MARKERS) {
        PartKind::Body
    } else {
        PartKind::Other
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}
