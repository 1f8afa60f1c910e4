use std::path::Path;

use anyhow::{anyhow, Context, Result};
use kerjoo_core::{
    AssignmentSnapshot, Coordinates, Evidence, Geofence, NewAssignment, PhotoSlot, RequirementProfile, Status, UserId,
};
use kerjoo_storage::InMemoryStorage;
use serde::Deserialize;

use crate::{ManualClock, Workflow, WorkflowConfig};

const DEFAULT_START_UNIX: i64 = 1_700_000_000;

/// `fixtures/scenarios/<id>/scenario.yaml`
#[derive(Debug, Deserialize)]
pub struct Scenario {
    pub scenario_id: String,
    #[serde(default)]
    pub start_unix: Option<i64>,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    pub task: ScenarioTask,
    pub assignment: ScenarioAssignment,
    pub steps: Vec<ScenarioStep>,
    pub expected: ScenarioExpected,
}

#[derive(Debug, Deserialize)]
pub struct ScenarioTask {
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub requirements: RequirementProfile,
}

#[derive(Debug, Deserialize)]
pub struct ScenarioAssignment {
    pub worker: String,
    pub assigner: String,
    #[serde(default)]
    pub deadline_after_secs: Option<i64>,
    #[serde(default)]
    pub geofence: Option<Geofence>,
    pub items: Vec<String>,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepOp {
    Start,
    Resume,
    Stop,
    Reset,
    Photo,
    Complete,
    Append,
}

#[derive(Debug, Deserialize)]
pub struct ScenarioStep {
    /// Seconds since scenario start at which the step runs.
    pub at: i64,
    pub op: StepOp,
    /// Index into the checklist in display order.
    #[serde(default)]
    pub item: usize,
    #[serde(default)]
    pub position: Option<Coordinates>,
    #[serde(default)]
    pub slot: Option<PhotoSlot>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub evidence: Option<Evidence>,
    #[serde(default)]
    pub name: Option<String>,
    /// Error kind the step must fail with; absent means it must succeed.
    #[serde(default)]
    pub expect_error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScenarioExpected {
    pub assignment_status: Status,
    #[serde(default)]
    pub items: Vec<ExpectedItem>,
}

#[derive(Debug, Deserialize)]
pub struct ExpectedItem {
    pub status: Status,
    #[serde(default)]
    pub duration_secs: Option<u64>,
}

#[derive(Debug)]
pub struct StepOutcome {
    pub op: StepOp,
    /// Error kind, when the step failed as expected.
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct ScenarioResult {
    pub scenario_id: String,
    pub outcomes: Vec<StepOutcome>,
    pub final_snapshot: AssignmentSnapshot,
}

pub fn load_scenario(dir: &Path) -> Result<Scenario> {
    let p = dir.join("scenario.yaml");
    let s = std::fs::read_to_string(&p).with_context(|| format!("read scenario.yaml: {}", p.display()))?;
    let scenario: Scenario = serde_yaml::from_str(&s).with_context(|| "parse scenario.yaml")?;
    Ok(scenario)
}

/// Replay a fixture against an in-memory workflow with a manual clock and
/// check every step and the final state against the fixture's expectations.
pub fn run_scenario(dir: &Path) -> Result<ScenarioResult> {
    let sc = load_scenario(dir)?;
    let start = sc.start_unix.unwrap_or(DEFAULT_START_UNIX);
    let wf = Workflow::with_clock(InMemoryStorage::new(), ManualClock::new(start), sc.workflow.clone());

    let task = wf
        .create_task_definition(&sc.task.name, &sc.task.category, sc.task.requirements)
        .map_err(|e| anyhow!("create task: {e}"))?;
    let created = wf
        .create_assignment(NewAssignment {
            task_id: task.id,
            worker_id: UserId::from_str(sc.assignment.worker.as_str()),
            assigner_id: UserId::from_str(sc.assignment.assigner.as_str()),
            deadline_unix: sc.assignment.deadline_after_secs.map(|d| start + d),
            note: String::new(),
            geofence: sc.assignment.geofence.clone(),
            items: sc.assignment.items.clone(),
        })
        .map_err(|e| anyhow!("create assignment: {e}"))?;
    let assignment_id = created.assignment.id;

    let mut outcomes = Vec::with_capacity(sc.steps.len());
    for (n, step) in sc.steps.iter().enumerate() {
        wf.clock().set(start + step.at);
        let snap = wf.assignment(&assignment_id).map_err(|e| anyhow!("reload: {e}"))?;
        let item_id = || {
            snap.items
                .get(step.item)
                .map(|i| i.id.clone())
                .ok_or_else(|| anyhow!("step {n}: no item at index {}", step.item))
        };

        let res = match step.op {
            StepOp::Start => wf.start(&item_id()?, step.position).map(|_| ()),
            StepOp::Resume => wf.resume(&item_id()?, step.position).map(|_| ()),
            StepOp::Stop => wf.stop(&item_id()?).map(|_| ()),
            StepOp::Reset => wf.reset(&item_id()?).map(|_| ()),
            StepOp::Photo => {
                let slot = step.slot.ok_or_else(|| anyhow!("step {n}: photo needs a slot"))?;
                let reference = step.reference.as_deref().unwrap_or("photo.jpg");
                wf.capture_photo(&item_id()?, slot, reference, step.position).map(|_| ())
            }
            StepOp::Complete => wf.complete(&item_id()?, step.evidence.clone().unwrap_or_default()).map(|_| ()),
            StepOp::Append => {
                let name = step.name.as_deref().ok_or_else(|| anyhow!("step {n}: append needs a name"))?;
                wf.append_item(&assignment_id, name).map(|_| ())
            }
        };

        let error = match (res, &step.expect_error) {
            (Ok(()), None) => None,
            (Err(e), Some(kind)) if e.kind() == kind => Some(kind.clone()),
            (Ok(()), Some(kind)) => return Err(anyhow!("step {n} ({:?}): expected {kind}, but it succeeded", step.op)),
            (Err(e), _) => return Err(anyhow!("step {n} ({:?}): unexpected error {}: {e}", step.op, e.kind())),
        };
        outcomes.push(StepOutcome { op: step.op, error });
    }

    let final_snapshot = wf.assignment(&assignment_id).map_err(|e| anyhow!("reload: {e}"))?;
    check_expected(&sc.expected, &final_snapshot)?;
    Ok(ScenarioResult { scenario_id: sc.scenario_id, outcomes, final_snapshot })
}

fn check_expected(expected: &ScenarioExpected, snap: &AssignmentSnapshot) -> Result<()> {
    if snap.assignment.status != expected.assignment_status {
        return Err(anyhow!(
            "assignment status: expected {}, got {}",
            expected.assignment_status,
            snap.assignment.status
        ));
    }
    for (i, exp) in expected.items.iter().enumerate() {
        let item = snap.items.get(i).ok_or_else(|| anyhow!("expected item {i} is missing"))?;
        if item.status != exp.status {
            return Err(anyhow!("item {i} status: expected {}, got {}", exp.status, item.status));
        }
        if let Some(d) = exp.duration_secs {
            if item.duration_secs != d {
                return Err(anyhow!("item {i} duration: expected {d}, got {}", item.duration_secs));
            }
        }
    }
    Ok(())
}
