use serde::{Deserialize, Serialize};

use crate::{AssignmentItem, EvidenceField, Photo};

/// What a task demands before one of its items may be marked done.
///
/// Older task records store this as a `{foto, file, teks}` map; those keys are
/// accepted as aliases. Unknown keys are rejected so a typo cannot silently
/// relax a requirement.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RequirementProfile {
    #[serde(default, alias = "foto")]
    pub requires_photo: bool,
    #[serde(default, alias = "file")]
    pub requires_file: bool,
    #[serde(default, alias = "teks")]
    pub requires_text_summary: bool,
}

impl RequirementProfile {
    pub fn none() -> Self {
        Self::default()
    }

    /// Fields still missing on `item`, in display order.
    pub fn missing(&self, item: &AssignmentItem) -> Vec<EvidenceField> {
        let mut missing = Vec::new();
        if self.requires_photo {
            if item.photo_before.is_none() {
                missing.push(EvidenceField::PhotoBefore);
            }
            if item.photo_after.is_none() {
                missing.push(EvidenceField::PhotoAfter);
            }
        }
        if self.requires_file && item.file_ref.as_deref().map_or(true, |f| f.trim().is_empty()) {
            missing.push(EvidenceField::File);
        }
        if self.requires_text_summary && item.summary.as_deref().map_or(true, |s| s.trim().is_empty()) {
            missing.push(EvidenceField::TextSummary);
        }
        missing
    }
}

/// Evidence submitted together with `complete`. Anything left `None` keeps
/// whatever the item already carries.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Evidence {
    #[serde(default)]
    pub photo_before: Option<Photo>,
    #[serde(default)]
    pub photo_after: Option<Photo>,
    #[serde(default)]
    pub file_ref: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

impl Evidence {
    pub(crate) fn apply_to(self, item: &mut AssignmentItem) {
        if let Some(p) = self.photo_before {
            item.photo_before = Some(p);
        }
        if let Some(p) = self.photo_after {
            item.photo_after = Some(p);
        }
        if let Some(f) = self.file_ref {
            item.file_ref = Some(f);
        }
        if let Some(s) = self.summary {
            item.summary = Some(s);
        }
    }
}
