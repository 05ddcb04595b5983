use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::workflow::DEFAULT_PROJECT_SLUG;
use crate::{Error, Result};

/// Environment variable that overrides the workflow root.
pub const ROOT_ENV: &str = "STAGEGATE_ROOT";

/// Directory name of the workflow store inside a repository.
pub const WORKFLOW_DIR: &str = ".stagegate";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Workflow store location. Relative paths resolve against the working
    /// directory; `~/` expands to the home directory.
    pub root: Option<String>,
    /// Project used by the CLI when `--project` is not given.
    pub default_project: Option<String>,
    /// Recorded as the author of changes and approver of gates.
    pub author: Option<String>,
}

impl Config {
    pub fn stagegate_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".stagegate"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::stagegate_dir()?.join("stagegate.toml"))
    }

    pub fn effective_project(&self) -> &str {
        self.default_project.as_deref().unwrap_or(DEFAULT_PROJECT_SLUG)
    }

    pub fn effective_author(&self) -> String {
        self.author
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Resolve the workflow root: `STAGEGATE_ROOT`, then the configured
    /// `root`, then `.stagegate` under `cwd`.
    pub fn workflow_root(&self, cwd: &Path) -> PathBuf {
        let env_root = std::env::var(ROOT_ENV).ok();
        self.resolve_root(env_root.as_deref(), cwd)
    }

    fn resolve_root(&self, env_root: Option<&str>, cwd: &Path) -> PathBuf {
        let chosen = env_root
            .filter(|root| !root.trim().is_empty())
            .or(self.root.as_deref());
        match chosen {
            Some(root) => {
                let path = expand_tilde(root);
                if path.is_absolute() {
                    path
                } else {
                    cwd.join(path)
                }
            }
            None => cwd.join(WORKFLOW_DIR),
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading config");
        if !path.exists() {
            debug!("config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        debug!(
            root = ?config.root,
            default_project = ?config.default_project,
            "config loaded"
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                debug!(dir = %dir.display(), "creating config directory");
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        debug!(path = %path.display(), "config saved");
        Ok(())
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
