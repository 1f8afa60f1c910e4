pub mod config;
pub mod scenario;
pub mod service;
pub mod site;
pub mod timer_store;
pub mod util;

pub use config::*;
pub use service::*;
pub use site::*;
pub use timer_store::*;
pub use util::*;

#[cfg(test)]
mod scenario_tests {
    use super::scenario::*;
    use kerjoo_core::Status;
    use std::path::{Path, PathBuf};

    fn dir(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/scenarios").join(name)
    }

    fn errors(res: &ScenarioResult) -> Vec<&str> {
        res.outcomes.iter().filter_map(|o| o.error.as_deref()).collect()
    }

    #[test]
    fn scenario_sc01_three_item_completion() {
        let res = run_scenario(&dir("SC-01-three-item-completion")).unwrap();
        assert_eq!(res.final_snapshot.assignment.status, Status::Done);
        let a = &res.final_snapshot.assignment;
        assert!(a.ended_at_unix >= a.started_at_unix);
        assert_eq!(errors(&res), vec!["invalid_state_transition"]);
    }

    #[test]
    fn scenario_sc02_geofenced_photo_task() {
        let res = run_scenario(&dir("SC-02-geofenced-photo-task")).unwrap();
        assert_eq!(errors(&res), vec!["out_of_range", "location_unavailable", "incomplete_evidence"]);
        let item = &res.final_snapshot.items[0];
        assert!(item.photo_before.as_ref().and_then(|p| p.position).is_some());
        assert!(item.photo_after.as_ref().and_then(|p| p.position).is_some());
    }

    #[test]
    fn scenario_sc03_missing_evidence() {
        let res = run_scenario(&dir("SC-03-missing-evidence")).unwrap();
        assert_eq!(res.scenario_id, "SC-03-missing-evidence");
        assert_eq!(res.final_snapshot.items[0].summary.as_deref(), Some("Semua pintu terkunci"));
    }

    #[test]
    fn scenario_sc04_pause_resume_reset() {
        let res = run_scenario(&dir("SC-04-pause-resume-reset")).unwrap();
        assert_eq!(res.final_snapshot.items.len(), 3);
        assert_eq!(res.final_snapshot.items[1].started_at_unix, None);
    }

    #[test]
    fn scenario_sc05_single_active_item() {
        let res = run_scenario(&dir("SC-05-single-active-item")).unwrap();
        assert_eq!(errors(&res), vec!["active_item_conflict", "active_item_conflict"]);
    }
}
