use kerjoo_core::{
    Assignment, AssignmentId, AssignmentItem, AssignmentSnapshot, Change, ItemId, TaskDefId, TaskDefinition, UserId,
    WorkflowError,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Optimistic version check failed; nothing was written.
    #[error("{entity} {id} changed since it was read")]
    Conflict { entity: &'static str, id: String },

    #[error("worker {worker} already has item {active} in progress")]
    ActiveItem { worker: UserId, active: ItemId },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<StorageError> for WorkflowError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound { entity, id } => WorkflowError::NotFound { entity, id },
            StorageError::Conflict { entity, id } => WorkflowError::ConcurrentModification { entity, id },
            StorageError::ActiveItem { active, .. } => WorkflowError::ActiveItemConflict { active },
            StorageError::Backend(e) => WorkflowError::Storage(format!("{e:#}")),
        }
    }
}

pub trait Storage: Send + Sync {
    fn insert_task_definition(&self, task: &TaskDefinition) -> Result<(), StorageError>;
    fn task_definition(&self, id: &TaskDefId) -> Result<TaskDefinition, StorageError>;
    fn list_task_definitions(&self) -> Result<Vec<TaskDefinition>, StorageError>;

    fn insert_assignment(&self, assignment: &Assignment, items: &[AssignmentItem]) -> Result<(), StorageError>;

    /// Assignment, its items ordered by `sort_order`, and its task definition.
    fn load_snapshot(&self, assignment_id: &AssignmentId) -> Result<AssignmentSnapshot, StorageError>;
    fn assignment_of_item(&self, item_id: &ItemId) -> Result<AssignmentId, StorageError>;
    fn list_assignments(&self, worker: Option<&UserId>) -> Result<Vec<Assignment>, StorageError>;

    /// Apply `change` atomically: every entity version must still match what
    /// the engine read, otherwise nothing is written and `Conflict` is returned.
    fn commit(&self, change: &Change) -> Result<(), StorageError>;

    fn load_snapshot_for_item(&self, item_id: &ItemId) -> Result<AssignmentSnapshot, StorageError> {
        let assignment_id = self.assignment_of_item(item_id)?;
        self.load_snapshot(&assignment_id)
    }
}
