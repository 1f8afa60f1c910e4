use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::PhotoSlot;

/// A transition a caller attempts on an item or assignment.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Start,
    Resume,
    Stop,
    Reset,
    CapturePhoto(PhotoSlot),
    Complete,
    AppendItem,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Start => f.write_str("start"),
            Action::Resume => f.write_str("resume"),
            Action::Stop => f.write_str("stop"),
            Action::Reset => f.write_str("reset"),
            Action::CapturePhoto(slot) => write!(f, "capture_photo({})", slot.as_str()),
            Action::Complete => f.write_str("complete"),
            Action::AppendItem => f.write_str("append_item"),
        }
    }
}
