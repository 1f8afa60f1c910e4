use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status shared by assignments and their items.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    InProgress,
    Done,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::InProgress => "in_progress",
            Status::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Status::Pending),
            "in_progress" => Some(Status::InProgress),
            "done" => Some(Status::Done),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PhotoSlot {
    Before,
    After,
}

impl PhotoSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhotoSlot::Before => "before",
            PhotoSlot::After => "after",
        }
    }
}

/// Why a position could not be obtained.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LocationErrorReason {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
}

impl LocationErrorReason {
    /// Message shown to the worker, one per reason.
    pub fn user_message(&self) -> &'static str {
        match self {
            LocationErrorReason::PermissionDenied => "location permission denied; enable location access and try again",
            LocationErrorReason::PositionUnavailable => "position unavailable; move to open sky or enable GPS and try again",
            LocationErrorReason::Timeout => "timed out waiting for a position fix; try again",
        }
    }
}

impl fmt::Display for LocationErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LocationErrorReason::PermissionDenied => "permission_denied",
            LocationErrorReason::PositionUnavailable => "position_unavailable",
            LocationErrorReason::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// Evidence fields a task's requirement profile can demand. The wire names are
/// the ones the field app shows to workers.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EvidenceField {
    #[serde(rename = "foto_sebelum")]
    PhotoBefore,
    #[serde(rename = "foto_sesudah")]
    PhotoAfter,
    #[serde(rename = "file")]
    File,
    #[serde(rename = "ringkasan_teks")]
    TextSummary,
}

impl EvidenceField {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceField::PhotoBefore => "foto_sebelum",
            EvidenceField::PhotoAfter => "foto_sesudah",
            EvidenceField::File => "file",
            EvidenceField::TextSummary => "ringkasan_teks",
        }
    }
}

impl fmt::Display for EvidenceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
