//! Assignment/item state machine.
//!
//! Every function here is pure: it reads an [`AssignmentSnapshot`], checks the
//! preconditions of one transition and returns the [`Change`] storage has to
//! commit. Time is always passed in by the caller.

use crate::gate::{check_presence, GateOutcome};
use crate::{
    secs_between, Action, Assignment, AssignmentItem, AssignmentSnapshot, Change, Coordinates, Evidence, ItemId,
    NewAssignment, Photo, PhotoSlot, Status, TaskDefinition, WorkflowError,
};

/// Build a fresh pending assignment and its checklist.
pub fn new_assignment(
    input: NewAssignment,
    task: &TaskDefinition,
    now_unix: i64,
) -> Result<(Assignment, Vec<AssignmentItem>), WorkflowError> {
    if input.task_id != task.id {
        return Err(WorkflowError::InvalidInput(format!("task {} does not match definition {}", input.task_id, task.id)));
    }
    if input.items.is_empty() {
        return Err(WorkflowError::InvalidInput("an assignment needs at least one item".into()));
    }
    if let Some(fence) = &input.geofence {
        fence.validate()?;
    }
    if let Some(deadline) = input.deadline_unix {
        if deadline < now_unix {
            return Err(WorkflowError::InvalidInput("deadline is in the past".into()));
        }
    }

    let assignment = Assignment {
        id: crate::AssignmentId::new(),
        task_id: input.task_id,
        worker_id: input.worker_id,
        assigner_id: input.assigner_id,
        status: Status::Pending,
        deadline_unix: input.deadline_unix,
        started_at_unix: None,
        ended_at_unix: None,
        note: input.note,
        geofence: input.geofence,
        created_at_unix: now_unix,
        version: 0,
    };

    let mut items = Vec::with_capacity(input.items.len());
    for (i, name) in input.items.into_iter().enumerate() {
        items.push(checklist_item(&assignment, name, i as i32)?);
    }
    Ok((assignment, items))
}

/// Append a checklist line while the assignment is still open.
pub fn append_item(snap: &AssignmentSnapshot, name: &str) -> Result<Change, WorkflowError> {
    if snap.assignment.status == Status::Done {
        return Err(invalid(Status::Done, Action::AppendItem));
    }
    let next_order = snap.items.iter().map(|i| i.sort_order + 1).max().unwrap_or(0);
    let item = checklist_item(&snap.assignment, name.to_string(), next_order)?;
    Ok(Change {
        action: Action::AppendItem,
        assignment: snap.assignment.clone(),
        item: None,
        appended: Some(item),
        exclusive_for: None,
    })
}

/// Whether `start`/`resume` need proof of presence for this assignment.
pub fn start_requires_presence(snap: &AssignmentSnapshot) -> bool {
    snap.task.requirements.requires_photo && snap.assignment.geofence.is_some()
}

pub fn start_item(
    snap: &AssignmentSnapshot,
    item_id: &ItemId,
    position: Option<Coordinates>,
    now_unix: i64,
) -> Result<Change, WorkflowError> {
    require_open_assignment(snap, Action::Start)?;
    let mut item = snap.item(item_id)?.clone();
    require_status(&item, Status::Pending, Action::Start)?;
    start_gate(snap, position)?;

    item.status = Status::InProgress;
    item.started_at_unix = Some(now_unix);
    item.running_since_unix = Some(now_unix);

    let mut assignment = snap.assignment.clone();
    if assignment.status == Status::Pending {
        assignment.status = Status::InProgress;
        assignment.started_at_unix = Some(now_unix);
    }

    Ok(item_change(Action::Start, assignment, item))
}

pub fn resume_item(
    snap: &AssignmentSnapshot,
    item_id: &ItemId,
    position: Option<Coordinates>,
    now_unix: i64,
) -> Result<Change, WorkflowError> {
    require_open_assignment(snap, Action::Resume)?;
    let mut item = snap.item(item_id)?.clone();
    require_status(&item, Status::InProgress, Action::Resume)?;
    if item.is_running() {
        return Err(invalid(item.status, Action::Resume));
    }
    start_gate(snap, position)?;

    item.running_since_unix = Some(now_unix);
    Ok(item_change(Action::Resume, snap.assignment.clone(), item))
}

/// Pause: accumulate the running segment, status stays `in_progress`.
pub fn stop_item(snap: &AssignmentSnapshot, item_id: &ItemId, now_unix: i64) -> Result<Change, WorkflowError> {
    let mut item = snap.item(item_id)?.clone();
    require_status(&item, Status::InProgress, Action::Stop)?;
    if !item.is_running() {
        return Err(invalid(item.status, Action::Stop));
    }
    accumulate(&mut item, now_unix);
    Ok(item_change(Action::Stop, snap.assignment.clone(), item))
}

/// Explicit abandon: back to `pending`. Recorded duration is kept.
pub fn reset_item(snap: &AssignmentSnapshot, item_id: &ItemId, now_unix: i64) -> Result<Change, WorkflowError> {
    let mut item = snap.item(item_id)?.clone();
    require_status(&item, Status::InProgress, Action::Reset)?;
    accumulate(&mut item, now_unix);
    item.status = Status::Pending;
    item.started_at_unix = None;
    Ok(item_change(Action::Reset, snap.assignment.clone(), item))
}

pub fn capture_photo(
    snap: &AssignmentSnapshot,
    item_id: &ItemId,
    slot: PhotoSlot,
    reference: &str,
    position: Option<Coordinates>,
) -> Result<Change, WorkflowError> {
    let action = Action::CapturePhoto(slot);
    let mut item = snap.item(item_id)?.clone();
    require_status(&item, Status::InProgress, action)?;
    let photo = gated_photo(snap, Photo { reference: reference.to_string(), position })?;

    match slot {
        PhotoSlot::Before => item.photo_before = Some(photo),
        PhotoSlot::After => item.photo_after = Some(photo),
    }
    Ok(item_change(action, snap.assignment.clone(), item))
}

pub fn complete_item(
    snap: &AssignmentSnapshot,
    item_id: &ItemId,
    evidence: Evidence,
    now_unix: i64,
) -> Result<Change, WorkflowError> {
    require_open_assignment(snap, Action::Complete)?;
    let mut item = snap.item(item_id)?.clone();
    require_status(&item, Status::InProgress, Action::Complete)?;

    let mut evidence = evidence;
    evidence.photo_before = evidence.photo_before.map(|p| gated_photo(snap, p)).transpose()?;
    evidence.photo_after = evidence.photo_after.map(|p| gated_photo(snap, p)).transpose()?;
    evidence.apply_to(&mut item);

    let missing = snap.task.requirements.missing(&item);
    if !missing.is_empty() {
        return Err(WorkflowError::IncompleteEvidence { missing });
    }

    accumulate(&mut item, now_unix);
    item.status = Status::Done;
    item.ended_at_unix = Some(end_time(item.started_at_unix, now_unix));

    let mut assignment = snap.assignment.clone();
    let still_open = snap.items.iter().filter(|i| i.id != item.id && i.status != Status::Done).count();
    if still_open == 0 {
        assignment.status = Status::Done;
        assignment.ended_at_unix = Some(end_time(assignment.started_at_unix, now_unix));
    }

    Ok(item_change(Action::Complete, assignment, item))
}

fn checklist_item(assignment: &Assignment, name: String, sort_order: i32) -> Result<AssignmentItem, WorkflowError> {
    if name.trim().is_empty() {
        return Err(WorkflowError::InvalidInput("item name must not be empty".into()));
    }
    Ok(AssignmentItem::new(assignment.id.clone(), name, sort_order))
}

fn item_change(action: Action, assignment: Assignment, item: AssignmentItem) -> Change {
    Change { action, assignment, item: Some(item), appended: None, exclusive_for: None }
}

fn start_gate(snap: &AssignmentSnapshot, position: Option<Coordinates>) -> Result<(), WorkflowError> {
    if start_requires_presence(snap) {
        check_presence(snap.assignment.geofence.as_ref(), position)?;
    }
    Ok(())
}

fn gated_photo(snap: &AssignmentSnapshot, photo: Photo) -> Result<Photo, WorkflowError> {
    if photo.reference.trim().is_empty() {
        return Err(WorkflowError::InvalidInput("photo reference must not be empty".into()));
    }
    let position = match check_presence(snap.assignment.geofence.as_ref(), photo.position)? {
        GateOutcome::Verified { position, .. } => Some(position),
        GateOutcome::Open => match photo.position {
            Some(p) => {
                p.validate()?;
                Some(p)
            }
            None => None,
        },
    };
    Ok(Photo { reference: photo.reference, position })
}

fn accumulate(item: &mut AssignmentItem, now_unix: i64) {
    if let Some(since) = item.running_since_unix.take() {
        item.duration_secs += secs_between(since, now_unix);
    }
}

fn end_time(started_at_unix: Option<i64>, now_unix: i64) -> i64 {
    started_at_unix.map_or(now_unix, |start| start.max(now_unix))
}

fn require_open_assignment(snap: &AssignmentSnapshot, action: Action) -> Result<(), WorkflowError> {
    if snap.assignment.status == Status::Done {
        return Err(invalid(Status::Done, action));
    }
    Ok(())
}

fn require_status(item: &AssignmentItem, expected: Status, action: Action) -> Result<(), WorkflowError> {
    if item.status != expected {
        return Err(invalid(item.status, action));
    }
    Ok(())
}

fn invalid(from: Status, attempted: Action) -> WorkflowError {
    WorkflowError::InvalidStateTransition { from, attempted }
}
