use std::path::{Path, PathBuf};

use anyhow::Result;
use kerjoo_storage_sqlite::SqliteStorage;
use tracing::info;

use crate::{Config, TimerStore, Workflow};

/// One Kerjoo installation on disk: `<root>/.kerjoo/{kerjoo.toml,kerjoo.db}`
/// plus the client timer file.
pub struct Site {
    pub root: PathBuf,
    pub cfg: Config,
    pub workflow: Workflow<SqliteStorage>,
    pub timer: TimerStore,
}

impl Site {
    pub fn open(root: PathBuf) -> Result<Self> {
        let cfg_path = Config::config_path(&root);
        let cfg = if cfg_path.exists() {
            Config::load_from(&cfg_path)?
        } else {
            let cfg = Config::default_for_site(&site_id(&root));
            cfg.save_to(&cfg_path)?;
            cfg
        };

        let storage = SqliteStorage::open(&Config::db_path(&root))?;
        let workflow = Workflow::new(storage, cfg.workflow.clone());
        let timer = TimerStore::new(cfg.timer_path(&root));
        Ok(Self { root, cfg, workflow, timer })
    }

    pub fn init(root: &Path) -> Result<()> {
        let cfg_path = Config::config_path(root);
        if !cfg_path.exists() {
            Config::default_for_site(&site_id(root)).save_to(&cfg_path)?;
        }
        // create db
        let _ = SqliteStorage::open(&Config::db_path(root))?;
        info!(root = %root.display(), "site initialized");
        Ok(())
    }
}

fn site_id(root: &Path) -> String {
    root.file_name().and_then(|s| s.to_str()).unwrap_or("site").to_string()
}
