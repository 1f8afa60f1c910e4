use kerjoo_core::engine;
use kerjoo_core::{
    Action, Assignment, AssignmentId, AssignmentItem, AssignmentSnapshot, Change, Coordinates, Evidence, ItemId,
    NewAssignment, PhotoSlot, RequirementProfile, Status, TaskDefId, TaskDefinition, UserId, WorkflowError,
};
use kerjoo_storage::{Storage, StorageError};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::WorkflowConfig;
use crate::util::{Clock, SystemClock};

/// State of one item and its parent right after a committed transition.
#[derive(Clone, Debug, Serialize)]
pub struct Transition {
    pub item: AssignmentItem,
    pub assignment: Assignment,
}

impl Transition {
    /// What storage holds right after `change` was applied, without reading it back.
    fn committed(change: Change) -> Result<Self, WorkflowError> {
        let mut item = change
            .item
            .ok_or_else(|| WorkflowError::Storage(format!("{} produced no item", change.action)))?;
        let mut assignment = change.assignment;
        item.version += 1;
        assignment.version += 1;
        Ok(Self { item, assignment })
    }
}

/// Server view of an item's timer, the input to client reconciliation.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ElapsedView {
    pub item_id: ItemId,
    pub status: Status,
    pub running: bool,
    pub duration_secs: u64,
    pub running_since_unix: Option<i64>,
    pub elapsed_secs: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct AssignmentListing {
    pub assignment: Assignment,
    pub overdue: bool,
}

/// Server side of the workflow. Each transition loads a snapshot, lets the
/// engine decide, and commits with version checks. Submitted coordinates are
/// re-checked against the geofence here no matter what the client decided.
pub struct Workflow<S, C = SystemClock> {
    storage: S,
    clock: C,
    settings: WorkflowConfig,
}

impl<S: Storage> Workflow<S, SystemClock> {
    pub fn new(storage: S, settings: WorkflowConfig) -> Self {
        Self::with_clock(storage, SystemClock, settings)
    }
}

impl<S: Storage, C: Clock> Workflow<S, C> {
    pub fn with_clock(storage: S, clock: C, settings: WorkflowConfig) -> Self {
        Self { storage, clock, settings }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn settings(&self) -> &WorkflowConfig {
        &self.settings
    }

    pub fn create_task_definition(
        &self,
        name: &str,
        category: &str,
        requirements: RequirementProfile,
    ) -> Result<TaskDefinition, WorkflowError> {
        let task = TaskDefinition {
            id: TaskDefId::new(),
            name: name.trim().to_string(),
            category: category.trim().to_string(),
            requirements,
        };
        task.validate()?;
        self.storage.insert_task_definition(&task)?;
        info!(task = %task.id, name = %task.name, "task definition created");
        Ok(task)
    }

    pub fn task_definitions(&self) -> Result<Vec<TaskDefinition>, WorkflowError> {
        Ok(self.storage.list_task_definitions()?)
    }

    pub fn create_assignment(&self, input: NewAssignment) -> Result<AssignmentSnapshot, WorkflowError> {
        let task = self.storage.task_definition(&input.task_id)?;
        let (assignment, items) = engine::new_assignment(input, &task, self.clock.now_unix())?;
        self.storage.insert_assignment(&assignment, &items)?;
        info!(assignment = %assignment.id, worker = %assignment.worker_id, items = items.len(), "assignment created");
        Ok(AssignmentSnapshot { assignment, items, task })
    }

    pub fn append_item(&self, assignment_id: &AssignmentId, name: &str) -> Result<AssignmentItem, WorkflowError> {
        let change = self.run(|| self.storage.load_snapshot(assignment_id), |snap, _| engine::append_item(snap, name), false)?;
        let appended = change
            .appended
            .ok_or_else(|| WorkflowError::Storage("append produced no item".to_string()))?;
        Ok(appended)
    }

    pub fn start(&self, item_id: &ItemId, position: Option<Coordinates>) -> Result<Transition, WorkflowError> {
        self.item_transition(item_id, true, |snap, now| engine::start_item(snap, item_id, position, now))
    }

    pub fn resume(&self, item_id: &ItemId, position: Option<Coordinates>) -> Result<Transition, WorkflowError> {
        self.item_transition(item_id, true, |snap, now| engine::resume_item(snap, item_id, position, now))
    }

    pub fn stop(&self, item_id: &ItemId) -> Result<Transition, WorkflowError> {
        self.item_transition(item_id, false, |snap, now| engine::stop_item(snap, item_id, now))
    }

    pub fn reset(&self, item_id: &ItemId) -> Result<Transition, WorkflowError> {
        self.item_transition(item_id, false, |snap, now| engine::reset_item(snap, item_id, now))
    }

    pub fn capture_photo(
        &self,
        item_id: &ItemId,
        slot: PhotoSlot,
        reference: &str,
        position: Option<Coordinates>,
    ) -> Result<Transition, WorkflowError> {
        self.item_transition(item_id, false, |snap, _| engine::capture_photo(snap, item_id, slot, reference, position))
    }

    pub fn complete(&self, item_id: &ItemId, evidence: Evidence) -> Result<Transition, WorkflowError> {
        self.item_transition(item_id, false, |snap, now| engine::complete_item(snap, item_id, evidence.clone(), now))
    }

    pub fn elapsed(&self, item_id: &ItemId) -> Result<ElapsedView, WorkflowError> {
        let snap = self.storage.load_snapshot_for_item(item_id)?;
        let item = snap.item(item_id)?;
        Ok(ElapsedView {
            item_id: item.id.clone(),
            status: item.status,
            running: item.is_running(),
            duration_secs: item.duration_secs,
            running_since_unix: item.running_since_unix,
            elapsed_secs: item.elapsed_secs(self.clock.now_unix()),
        })
    }

    pub fn assignment(&self, assignment_id: &AssignmentId) -> Result<AssignmentSnapshot, WorkflowError> {
        Ok(self.storage.load_snapshot(assignment_id)?)
    }

    /// The assignment an item belongs to, with all of its items.
    pub fn snapshot_for_item(&self, item_id: &ItemId) -> Result<AssignmentSnapshot, WorkflowError> {
        Ok(self.storage.load_snapshot_for_item(item_id)?)
    }

    pub fn assignments_for(&self, worker: &UserId) -> Result<Vec<AssignmentListing>, WorkflowError> {
        let now = self.clock.now_unix();
        let assignments = self.storage.list_assignments(Some(worker))?;
        Ok(assignments
            .into_iter()
            .map(|assignment| AssignmentListing { overdue: assignment.is_overdue(now), assignment })
            .collect())
    }

    fn item_transition<F>(&self, item_id: &ItemId, exclusive: bool, decide: F) -> Result<Transition, WorkflowError>
    where
        F: Fn(&AssignmentSnapshot, i64) -> Result<Change, WorkflowError>,
    {
        let change = self.run(|| self.storage.load_snapshot_for_item(item_id), decide, exclusive)?;
        Transition::committed(change)
    }

    /// Load, decide, commit. A version conflict re-runs the whole cycle on a
    /// fresh snapshot up to `conflict_retries` times.
    fn run<L, F>(&self, load: L, decide: F, exclusive: bool) -> Result<Change, WorkflowError>
    where
        L: Fn() -> Result<AssignmentSnapshot, StorageError>,
        F: Fn(&AssignmentSnapshot, i64) -> Result<Change, WorkflowError>,
    {
        let mut retries_left = self.settings.conflict_retries;
        loop {
            let snap = load()?;
            let mut change = decide(&snap, self.clock.now_unix())?;
            if exclusive && self.settings.enforce_single_active_item {
                change.exclusive_for = Some(snap.assignment.worker_id.clone());
            }

            match self.storage.commit(&change) {
                Ok(()) => {
                    log_committed(&change);
                    return Ok(change);
                }
                Err(StorageError::Conflict { entity, id }) if retries_left > 0 => {
                    retries_left -= 1;
                    warn!(action = %change.action, entity, id = %id, "version conflict; retrying on fresh snapshot");
                }
                Err(e) => {
                    debug!(action = %change.action, error = %e, "commit rejected");
                    return Err(e.into());
                }
            }
        }
    }
}

fn log_committed(change: &Change) {
    let item = change.item_id().map(|i| i.as_str()).unwrap_or("-");
    match change.action {
        Action::Complete if change.assignment.status == Status::Done => {
            info!(assignment = %change.assignment.id, item, "item completed; assignment done")
        }
        action => info!(assignment = %change.assignment.id, item, %action, "transition committed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::ManualClock;
    use kerjoo_core::{Geofence, Photo};
    use kerjoo_storage::InMemoryStorage;

    const T0: i64 = 1_700_000_000;

    fn workflow(settings: WorkflowConfig) -> Workflow<InMemoryStorage, ManualClock> {
        Workflow::with_clock(InMemoryStorage::new(), ManualClock::new(T0), settings)
    }

    fn assign(wf: &Workflow<InMemoryStorage, ManualClock>, profile: RequirementProfile, fence: Option<Geofence>, items: &[&str]) -> AssignmentSnapshot {
        let task = wf.create_task_definition("Perawatan taman", "perawatan", profile).unwrap();
        wf.create_assignment(NewAssignment {
            task_id: task.id,
            worker_id: UserId::from_str("budi"),
            assigner_id: UserId::from_str("admin"),
            deadline_unix: Some(T0 + 3_600),
            note: String::new(),
            geofence: fence,
            items: items.iter().map(|s| s.to_string()).collect(),
        })
        .unwrap()
    }

    #[test]
    fn server_clock_stamps_transitions() {
        let wf = workflow(WorkflowConfig::default());
        let snap = assign(&wf, RequirementProfile::none(), None, &["siram"]);
        let id = snap.items[0].id.clone();

        wf.clock().advance(10);
        let t = wf.start(&id, None).unwrap();
        assert_eq!(t.item.started_at_unix, Some(T0 + 10));
        assert_eq!(t.assignment.status, Status::InProgress);

        wf.clock().advance(50);
        assert_eq!(wf.elapsed(&id).unwrap().elapsed_secs, 50);
        let t = wf.complete(&id, Evidence::default()).unwrap();
        assert_eq!(t.item.duration_secs, 50);
        assert_eq!(t.assignment.status, Status::Done);
        assert_eq!(t.assignment.ended_at_unix, Some(T0 + 60));
    }

    #[test]
    fn forged_position_is_rejected_on_the_server() {
        let fence = Geofence { center: Coordinates { lat: -6.2, lon: 106.816666 }, radius_m: 100, name: None };
        let wf = workflow(WorkflowConfig::default());
        let snap = assign(&wf, RequirementProfile { requires_photo: true, ..Default::default() }, Some(fence), &["pangkas"]);
        let id = snap.items[0].id.clone();

        let err = wf.start(&id, Some(Coordinates { lat: -6.21, lon: 106.816666 })).unwrap_err();
        assert!(matches!(err, WorkflowError::OutOfRange { radius_m: 100, .. }));
        assert_eq!(wf.assignment(&snap.assignment.id).unwrap().items[0].status, Status::Pending);
    }

    #[test]
    fn single_active_item_is_opt_in() {
        let wf = workflow(WorkflowConfig::default());
        let snap = assign(&wf, RequirementProfile::none(), None, &["a", "b"]);
        wf.start(&snap.items[0].id, None).unwrap();
        assert!(wf.start(&snap.items[1].id, None).is_ok());

        let wf = workflow(WorkflowConfig { enforce_single_active_item: true, ..Default::default() });
        let snap = assign(&wf, RequirementProfile::none(), None, &["a", "b"]);
        wf.start(&snap.items[0].id, None).unwrap();
        let err = wf.start(&snap.items[1].id, None).unwrap_err();
        assert_eq!(err, WorkflowError::ActiveItemConflict { active: snap.items[0].id.clone() });
    }

    #[test]
    fn photo_capture_then_complete() {
        let fence = Geofence { center: Coordinates { lat: -6.2, lon: 106.816666 }, radius_m: 100, name: None };
        let wf = workflow(WorkflowConfig::default());
        let snap = assign(&wf, RequirementProfile { requires_photo: true, ..Default::default() }, Some(fence), &["pangkas"]);
        let id = snap.items[0].id.clone();
        let here = Coordinates { lat: -6.2003, lon: 106.816666 };

        wf.start(&id, Some(here)).unwrap();
        wf.capture_photo(&id, PhotoSlot::Before, "uploads/1.jpg", Some(here)).unwrap();
        let err = wf.complete(&id, Evidence::default()).unwrap_err();
        assert_eq!(err.kind(), "incomplete_evidence");

        let after = Photo { reference: "uploads/2.jpg".into(), position: Some(here) };
        let t = wf.complete(&id, Evidence { photo_after: Some(after), ..Default::default() }).unwrap();
        assert_eq!(t.item.status, Status::Done);
        assert_eq!(t.item.photo_before.as_ref().map(|p| p.reference.as_str()), Some("uploads/1.jpg"));
    }

    #[test]
    fn overdue_listing() {
        let wf = workflow(WorkflowConfig::default());
        assign(&wf, RequirementProfile::none(), None, &["a"]);
        let worker = UserId::from_str("budi");
        assert!(!wf.assignments_for(&worker).unwrap()[0].overdue);
        wf.clock().advance(3_601);
        assert!(wf.assignments_for(&worker).unwrap()[0].overdue);
        assert!(wf.assignments_for(&UserId::from_str("siti")).unwrap().is_empty());
    }
}
