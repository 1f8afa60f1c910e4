use anyhow::{Context, Result};
use kerjoo_location::LocationSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub site: SiteConfig,
    #[serde(default)]
    pub timer: TimerConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub location: LocationSettings,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SiteConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Radius used by `assign` when a target is given without one.
    #[serde(default = "default_radius_m")]
    pub default_radius_m: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TimerConfig {
    /// Client timer file. Relative paths are under the site root; `~` expands.
    pub state_file: String,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self { state_file: ".kerjoo/timer.json".to_string() }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Reject `start`/`resume` while the worker has another item in progress.
    pub enforce_single_active_item: bool,
    /// Re-fetch and re-attempt this many times after a version conflict.
    pub conflict_retries: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self { enforce_single_active_item: false, conflict_retries: 1 }
    }
}

fn default_radius_m() -> u32 {
    100
}

impl Config {
    pub fn default_for_site(site_id: &str) -> Self {
        Self {
            site: SiteConfig { id: site_id.to_string(), name: site_id.to_string(), default_radius_m: default_radius_m() },
            timer: TimerConfig::default(),
            workflow: WorkflowConfig::default(),
            location: LocationSettings::default(),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&s).with_context(|| "parse kerjoo.toml")?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn timer_path(&self, site_root: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(&self.timer.state_file).to_string();
        let p = PathBuf::from(expanded);
        if p.is_absolute() {
            p
        } else {
            site_root.join(p)
        }
    }

    pub fn config_path(site_root: &Path) -> PathBuf {
        site_root.join(".kerjoo").join("kerjoo.toml")
    }

    pub fn db_path(site_root: &Path) -> PathBuf {
        site_root.join(".kerjoo").join("kerjoo.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = Config::config_path(dir.path());
        let mut cfg = Config::default_for_site("gedung-a");
        cfg.workflow.enforce_single_active_item = true;
        cfg.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), cfg);
    }

    #[test]
    fn missing_sections_take_defaults() {
        let cfg: Config = toml::from_str("[site]\nid = \"kantor\"\n\n[location]\nmax_attempts = 5\n").unwrap();
        assert_eq!(cfg.site.default_radius_m, 100);
        assert_eq!(cfg.workflow.conflict_retries, 1);
        assert!(!cfg.workflow.enforce_single_active_item);
        assert_eq!(cfg.location.max_attempts, 5);
        assert_eq!(cfg.location.high_accuracy_timeout_ms, 15_000);
    }

    #[test]
    fn relative_timer_path_is_under_site_root() {
        let cfg = Config::default_for_site("kantor");
        let root = Path::new("/srv/kerjoo");
        assert_eq!(cfg.timer_path(root), root.join(".kerjoo/timer.json"));
    }
}
