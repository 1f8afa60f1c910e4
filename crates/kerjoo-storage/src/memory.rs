use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::anyhow;
use kerjoo_core::{
    Assignment, AssignmentId, AssignmentItem, AssignmentSnapshot, Change, ItemId, Status, TaskDefId, TaskDefinition, UserId,
};

use crate::traits::{Storage, StorageError};

/// In-memory storage for tests. Not durable, but enforces the same version
/// checks as the SQLite backend.
#[derive(Default)]
pub struct InMemoryStorage {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    tasks: HashMap<String, TaskDefinition>,
    assignments: HashMap<String, Assignment>,
    items: HashMap<String, AssignmentItem>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StorageError> {
        self.inner.lock().map_err(|_| StorageError::Backend(anyhow!("in-memory storage lock poisoned")))
    }
}

impl Inner {
    fn active_item_of(&self, worker: &UserId, except: Option<&ItemId>) -> Option<ItemId> {
        self.items
            .values()
            .filter(|i| i.status == Status::InProgress && Some(&i.id) != except)
            .find(|i| self.assignments.get(i.assignment_id.as_str()).is_some_and(|a| &a.worker_id == worker))
            .map(|i| i.id.clone())
    }
}

impl Storage for InMemoryStorage {
    fn insert_task_definition(&self, task: &TaskDefinition) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        if inner.tasks.contains_key(task.id.as_str()) {
            return Err(StorageError::Backend(anyhow!("task definition {} already exists", task.id)));
        }
        inner.tasks.insert(task.id.0.clone(), task.clone());
        Ok(())
    }

    fn task_definition(&self, id: &TaskDefId) -> Result<TaskDefinition, StorageError> {
        let inner = self.lock()?;
        inner
            .tasks
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| StorageError::NotFound { entity: "task", id: id.to_string() })
    }

    fn list_task_definitions(&self) -> Result<Vec<TaskDefinition>, StorageError> {
        let inner = self.lock()?;
        let mut tasks: Vec<_> = inner.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tasks)
    }

    fn insert_assignment(&self, assignment: &Assignment, items: &[AssignmentItem]) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        if !inner.tasks.contains_key(assignment.task_id.as_str()) {
            return Err(StorageError::NotFound { entity: "task", id: assignment.task_id.to_string() });
        }
        inner.assignments.insert(assignment.id.0.clone(), assignment.clone());
        for item in items {
            inner.items.insert(item.id.0.clone(), item.clone());
        }
        Ok(())
    }

    fn load_snapshot(&self, assignment_id: &AssignmentId) -> Result<AssignmentSnapshot, StorageError> {
        let inner = self.lock()?;
        let assignment = inner
            .assignments
            .get(assignment_id.as_str())
            .cloned()
            .ok_or_else(|| StorageError::NotFound { entity: "assignment", id: assignment_id.to_string() })?;
        let task = inner
            .tasks
            .get(assignment.task_id.as_str())
            .cloned()
            .ok_or_else(|| StorageError::NotFound { entity: "task", id: assignment.task_id.to_string() })?;
        let mut items: Vec<_> = inner.items.values().filter(|i| &i.assignment_id == assignment_id).cloned().collect();
        items.sort_by_key(|i| i.sort_order);
        Ok(AssignmentSnapshot { assignment, items, task })
    }

    fn assignment_of_item(&self, item_id: &ItemId) -> Result<AssignmentId, StorageError> {
        let inner = self.lock()?;
        inner
            .items
            .get(item_id.as_str())
            .map(|i| i.assignment_id.clone())
            .ok_or_else(|| StorageError::NotFound { entity: "item", id: item_id.to_string() })
    }

    fn list_assignments(&self, worker: Option<&UserId>) -> Result<Vec<Assignment>, StorageError> {
        let inner = self.lock()?;
        let mut out: Vec<_> = inner
            .assignments
            .values()
            .filter(|a| worker.map_or(true, |w| &a.worker_id == w))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at_unix.cmp(&b.created_at_unix).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    fn commit(&self, change: &Change) -> Result<(), StorageError> {
        let mut inner = self.lock()?;

        let stored = inner
            .assignments
            .get(change.assignment.id.as_str())
            .ok_or_else(|| StorageError::NotFound { entity: "assignment", id: change.assignment.id.to_string() })?;
        if stored.version != change.assignment.version {
            return Err(StorageError::Conflict { entity: "assignment", id: change.assignment.id.to_string() });
        }
        if let Some(item) = &change.item {
            let stored = inner
                .items
                .get(item.id.as_str())
                .ok_or_else(|| StorageError::NotFound { entity: "item", id: item.id.to_string() })?;
            if stored.version != item.version {
                return Err(StorageError::Conflict { entity: "item", id: item.id.to_string() });
            }
        }
        if let Some(worker) = &change.exclusive_for {
            if let Some(active) = inner.active_item_of(worker, change.item_id()) {
                return Err(StorageError::ActiveItem { worker: worker.clone(), active });
            }
        }

        let mut assignment = change.assignment.clone();
        assignment.version += 1;
        inner.assignments.insert(assignment.id.0.clone(), assignment);
        if let Some(item) = &change.item {
            let mut item = item.clone();
            item.version += 1;
            inner.items.insert(item.id.0.clone(), item);
        }
        if let Some(item) = &change.appended {
            inner.items.insert(item.id.0.clone(), item.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kerjoo_core::engine::{complete_item, new_assignment, start_item};
    use kerjoo_core::{Evidence, NewAssignment, RequirementProfile};

    fn seeded(items: &[&str]) -> (InMemoryStorage, AssignmentId) {
        let storage = InMemoryStorage::new();
        let task = TaskDefinition {
            id: TaskDefId::from_str("t1"),
            name: "Patroli".into(),
            category: "keamanan".into(),
            requirements: RequirementProfile::none(),
        };
        storage.insert_task_definition(&task).unwrap();
        let (assignment, items) = new_assignment(
            NewAssignment {
                task_id: task.id.clone(),
                worker_id: UserId::from_str("w1"),
                assigner_id: UserId::from_str("admin"),
                deadline_unix: None,
                note: String::new(),
                geofence: None,
                items: items.iter().map(|s| s.to_string()).collect(),
            },
            &task,
            0,
        )
        .unwrap();
        storage.insert_assignment(&assignment, &items).unwrap();
        (storage, assignment.id)
    }

    #[test]
    fn test_new_creates_empty_storage() {
        let storage = InMemoryStorage::new();
        assert!(storage.list_assignments(None).unwrap().is_empty());
        assert!(storage.list_task_definitions().unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_orders_items() {
        let (storage, id) = seeded(&["a", "b", "c"]);
        let snap = storage.load_snapshot(&id).unwrap();
        let names: Vec<_> = snap.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(storage.assignment_of_item(&snap.items[1].id).unwrap(), id);
    }

    #[test]
    fn test_commit_bumps_versions() {
        let (storage, id) = seeded(&["a"]);
        let snap = storage.load_snapshot(&id).unwrap();
        let change = start_item(&snap, &snap.items[0].id, None, 10).unwrap();
        storage.commit(&change).unwrap();
        let snap = storage.load_snapshot(&id).unwrap();
        assert_eq!(snap.assignment.version, 1);
        assert_eq!(snap.items[0].version, 1);
        assert_eq!(snap.items[0].status, Status::InProgress);
    }

    #[test]
    fn test_stale_change_is_rejected_without_writing() {
        let (storage, id) = seeded(&["a"]);
        let snap = storage.load_snapshot(&id).unwrap();
        let item_id = snap.items[0].id.clone();
        storage.commit(&start_item(&snap, &item_id, None, 10).unwrap()).unwrap();

        let snap = storage.load_snapshot(&id).unwrap();
        let first = complete_item(&snap, &item_id, Evidence::default(), 40).unwrap();
        let second = complete_item(&snap, &item_id, Evidence::default(), 70).unwrap();
        storage.commit(&first).unwrap();
        let err = storage.commit(&second).unwrap_err();
        assert!(matches!(err, StorageError::Conflict { entity: "assignment", .. }));

        let snap = storage.load_snapshot(&id).unwrap();
        assert_eq!(snap.items[0].duration_secs, 30);
    }

    #[test]
    fn test_exclusive_start_rejects_second_item() {
        let (storage, id) = seeded(&["a", "b"]);
        let snap = storage.load_snapshot(&id).unwrap();
        storage.commit(&start_item(&snap, &snap.items[0].id, None, 10).unwrap()).unwrap();

        let snap = storage.load_snapshot(&id).unwrap();
        let mut change = start_item(&snap, &snap.items[1].id, None, 20).unwrap();
        change.exclusive_for = Some(UserId::from_str("w1"));
        let err = storage.commit(&change).unwrap_err();
        assert!(matches!(err, StorageError::ActiveItem { active, .. } if active == snap.items[0].id));
    }

    #[test]
    fn test_missing_item_is_not_found() {
        let storage = InMemoryStorage::new();
        let err = storage.assignment_of_item(&ItemId::from_str("nope")).unwrap_err();
        assert!(matches!(err, StorageError::NotFound { entity: "item", .. }));
    }
}
