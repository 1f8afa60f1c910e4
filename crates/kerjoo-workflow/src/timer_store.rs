use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use kerjoo_core::TimerState;

use crate::service::ElapsedView;

/// Client timer persisted as JSON so a restarted client picks up where it was.
/// The file is a display cache; [`TimerStore::reconcile`] overwrites it from
/// the server view.
pub struct TimerStore {
    path: PathBuf,
}

impl TimerStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is an idle timer.
    pub fn load(&self) -> Result<TimerState> {
        if !self.path.exists() {
            return Ok(TimerState::default());
        }
        let s = std::fs::read_to_string(&self.path).with_context(|| format!("read {}", self.path.display()))?;
        let state = serde_json::from_str(&s).with_context(|| format!("parse {}", self.path.display()))?;
        Ok(state)
    }

    pub fn save(&self, state: &TimerState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let s = serde_json::to_string_pretty(state)?;
        std::fs::write(&self.path, s).with_context(|| format!("write {}", self.path.display()))?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).with_context(|| format!("remove {}", self.path.display()))?;
        }
        Ok(())
    }

    /// Replace the local state with the server's view of `view.item_id`.
    pub fn reconcile(&self, view: &ElapsedView) -> Result<TimerState> {
        let state = TimerState::sync(view.item_id.clone(), view.running, view.duration_secs, view.running_since_unix);
        self.save(&state)?;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kerjoo_core::{ItemId, Status};
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_idle() {
        let dir = tempdir().unwrap();
        let store = TimerStore::new(dir.path().join("timer.json"));
        assert_eq!(store.load().unwrap(), TimerState::default());
    }

    #[test]
    fn survives_restart_and_reconciles() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("timer.json");
        let item = ItemId::from_str("item-1");

        let store = TimerStore::new(path.clone());
        let mut local = TimerState::default();
        local.start(item.clone(), 1_000);
        store.save(&local).unwrap();

        // new process, same file
        let store = TimerStore::new(path);
        assert_eq!(store.load().unwrap(), local);

        let view = ElapsedView {
            item_id: item.clone(),
            status: Status::InProgress,
            running: true,
            duration_secs: 120,
            running_since_unix: Some(2_000),
            elapsed_secs: 150,
        };
        let state = store.reconcile(&view).unwrap();
        assert_eq!(state.elapsed_secs(2_030), 150);
        assert_eq!(store.load().unwrap(), state);

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), TimerState::default());
    }
}
