use crate::{Assignment, AssignmentItem, ItemId, TaskDefinition, WorkflowError};

/// Everything the engine needs to decide one transition: the assignment, all
/// of its items and the task definition it was created from. The imperative
/// shell loads this from storage; the engine never touches storage itself.
#[derive(Clone, Debug)]
pub struct AssignmentSnapshot {
    pub assignment: Assignment,
    pub items: Vec<AssignmentItem>,
    pub task: TaskDefinition,
}

impl AssignmentSnapshot {
    pub fn item(&self, item_id: &ItemId) -> Result<&AssignmentItem, WorkflowError> {
        self.items
            .iter()
            .find(|i| &i.id == item_id)
            .ok_or_else(|| WorkflowError::NotFound { entity: "item", id: item_id.to_string() })
    }
}
