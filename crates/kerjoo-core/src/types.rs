use serde::{Deserialize, Serialize};

use crate::{evidence::RequirementProfile, ids::*, model::*, WorkflowError};

/// A WGS84 point. Latitude and longitude only ever travel together.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Result<Self, WorkflowError> {
        let c = Self { lat, lon };
        c.validate()?;
        Ok(c)
    }

    pub fn validate(&self) -> Result<(), WorkflowError> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(WorkflowError::InvalidInput(format!("latitude {} out of range", self.lat)));
        }
        if !self.lon.is_finite() || !(-180.0..=180.0).contains(&self.lon) {
            return Err(WorkflowError::InvalidInput(format!("longitude {} out of range", self.lon)));
        }
        Ok(())
    }
}

/// Target area an assignment can be pinned to.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Geofence {
    pub center: Coordinates,
    pub radius_m: u32,
    #[serde(default)]
    pub name: Option<String>,
}

impl Geofence {
    pub fn validate(&self) -> Result<(), WorkflowError> {
        self.center.validate()?;
        if self.radius_m == 0 {
            return Err(WorkflowError::InvalidInput("geofence radius must be a positive number of meters".into()));
        }
        Ok(())
    }
}

/// Opaque reference to an uploaded photo plus where it was taken.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Photo {
    pub reference: String,
    #[serde(default)]
    pub position: Option<Coordinates>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TaskDefinition {
    pub id: TaskDefId,
    pub name: String,
    #[serde(default)]
    pub category: String,
    pub requirements: RequirementProfile,
}

impl TaskDefinition {
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.name.trim().is_empty() {
            return Err(WorkflowError::InvalidInput("task name must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    pub id: AssignmentId,
    pub task_id: TaskDefId,
    pub worker_id: UserId,
    pub assigner_id: UserId,
    pub status: Status,
    pub deadline_unix: Option<i64>,
    pub started_at_unix: Option<i64>,
    pub ended_at_unix: Option<i64>,
    pub note: String,
    pub geofence: Option<Geofence>,
    pub created_at_unix: i64,
    pub version: u64,
}

impl Assignment {
    pub fn is_overdue(&self, now_unix: i64) -> bool {
        match (self.deadline_unix, self.status) {
            (Some(deadline), Status::Done) => self.ended_at_unix.is_some_and(|end| end > deadline),
            (Some(deadline), _) => now_unix > deadline,
            (None, _) => false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AssignmentItem {
    pub id: ItemId,
    pub assignment_id: AssignmentId,
    pub name: String,
    pub sort_order: i32,
    pub status: Status,
    /// First time the item was started; cleared by reset.
    pub started_at_unix: Option<i64>,
    /// Start of the currently running timer segment; `None` while paused.
    pub running_since_unix: Option<i64>,
    pub ended_at_unix: Option<i64>,
    pub duration_secs: u64,
    pub photo_before: Option<Photo>,
    pub photo_after: Option<Photo>,
    pub file_ref: Option<String>,
    pub summary: Option<String>,
    pub version: u64,
}

impl AssignmentItem {
    pub fn new(assignment_id: AssignmentId, name: impl Into<String>, sort_order: i32) -> Self {
        Self {
            id: ItemId::new(),
            assignment_id,
            name: name.into(),
            sort_order,
            status: Status::Pending,
            started_at_unix: None,
            running_since_unix: None,
            ended_at_unix: None,
            duration_secs: 0,
            photo_before: None,
            photo_after: None,
            file_ref: None,
            summary: None,
            version: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running_since_unix.is_some()
    }

    /// Duration including the running segment, as of `now_unix`.
    pub fn elapsed_secs(&self, now_unix: i64) -> u64 {
        self.duration_secs + self.running_since_unix.map(|since| secs_between(since, now_unix)).unwrap_or(0)
    }

    pub fn photo(&self, slot: PhotoSlot) -> Option<&Photo> {
        match slot {
            PhotoSlot::Before => self.photo_before.as_ref(),
            PhotoSlot::After => self.photo_after.as_ref(),
        }
    }
}

/// Input for creating an assignment with its checklist.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewAssignment {
    pub task_id: TaskDefId,
    pub worker_id: UserId,
    pub assigner_id: UserId,
    #[serde(default)]
    pub deadline_unix: Option<i64>,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub geofence: Option<Geofence>,
    #[serde(default)]
    pub items: Vec<String>,
}

/// Non-negative whole seconds from `from` to `to`; clock skew clamps to zero.
pub fn secs_between(from_unix: i64, to_unix: i64) -> u64 {
    u64::try_from(to_unix.saturating_sub(from_unix)).unwrap_or(0)
}
