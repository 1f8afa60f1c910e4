use thiserror::Error;

use crate::{Action, EvidenceField, ItemId, LocationErrorReason, Status};

/// Every failure a workflow operation can report. None of these are fatal;
/// each maps to a message that tells the worker how to retry.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("cannot {attempted} from status {from}")]
    InvalidStateTransition { from: Status, attempted: Action },

    #[error("missing required evidence: {}", join_fields(.missing))]
    IncompleteEvidence { missing: Vec<EvidenceField> },

    #[error("location unavailable ({reason})")]
    LocationUnavailable { reason: LocationErrorReason },

    #[error("outside the allowed area: {distance_m} m away, radius is {radius_m} m")]
    OutOfRange { distance_m: u64, radius_m: u32 },

    #[error("{entity} {id} was modified concurrently")]
    ConcurrentModification { entity: &'static str, id: String },

    #[error("worker already has item {active} in progress")]
    ActiveItemConflict { active: ItemId },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl WorkflowError {
    /// Whether the caller should silently re-fetch and try again.
    pub fn is_retryable_conflict(&self) -> bool {
        matches!(self, WorkflowError::ConcurrentModification { .. })
    }

    /// Stable snake_case tag, used in fixtures and machine-readable output.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::InvalidStateTransition { .. } => "invalid_state_transition",
            WorkflowError::IncompleteEvidence { .. } => "incomplete_evidence",
            WorkflowError::LocationUnavailable { .. } => "location_unavailable",
            WorkflowError::OutOfRange { .. } => "out_of_range",
            WorkflowError::ConcurrentModification { .. } => "concurrent_modification",
            WorkflowError::ActiveItemConflict { .. } => "active_item_conflict",
            WorkflowError::NotFound { .. } => "not_found",
            WorkflowError::InvalidInput(_) => "invalid_input",
            WorkflowError::Storage(_) => "storage",
        }
    }

    /// Short guidance for the worker-facing UI.
    pub fn user_hint(&self) -> String {
        match self {
            WorkflowError::InvalidStateTransition { .. } => "this step is no longer available; refresh the assignment".to_string(),
            WorkflowError::IncompleteEvidence { missing } => format!("please provide: {}", join_fields(missing)),
            WorkflowError::LocationUnavailable { reason } => reason.user_message().to_string(),
            WorkflowError::OutOfRange { distance_m, radius_m } => {
                format!("move closer to the site ({distance_m} m away, must be within {radius_m} m)")
            }
            WorkflowError::ConcurrentModification { .. } => "the assignment changed on another device; refresh and retry".to_string(),
            WorkflowError::ActiveItemConflict { .. } => "finish or pause your current item first".to_string(),
            WorkflowError::NotFound { .. } => "the assignment no longer exists".to_string(),
            WorkflowError::InvalidInput(msg) => msg.clone(),
            WorkflowError::Storage(_) => "server error; try again later".to_string(),
        }
    }
}

fn join_fields(fields: &[EvidenceField]) -> String {
    fields.iter().map(|f| f.as_str()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_evidence_lists_fields_in_order() {
        let err = WorkflowError::IncompleteEvidence {
            missing: vec![EvidenceField::PhotoAfter, EvidenceField::TextSummary],
        };
        assert_eq!(err.to_string(), "missing required evidence: foto_sesudah, ringkasan_teks");
    }

    #[test]
    fn out_of_range_hint_mentions_radius() {
        let err = WorkflowError::OutOfRange { distance_m: 150, radius_m: 100 };
        assert!(err.user_hint().contains("100 m"));
        assert!(!err.is_retryable_conflict());
    }
}
