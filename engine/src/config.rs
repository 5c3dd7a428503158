use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, Result};

fn default_worktrees_dir() -> PathBuf {
    PathBuf::from("worktrees")
}

fn default_branch_prefix() -> String {
    "substrate".to_string()
}

fn default_base_branch() -> String {
    "main".to_string()
}

fn default_max_concurrency() -> usize {
    4
}

fn default_dispatch_timeout_ms() -> u64 {
    10 * 60 * 1000
}

fn default_min_disk_space_gb() -> u64 {
    5
}

fn default_pack_path() -> PathBuf {
    PathBuf::from("packs/default")
}

/// Project-level configuration, resolved the way the rest of the workspace
/// resolves its own config: explicit path, then `.substrate/config.yml`
/// under the project root, then `dirs::config_dir()/substrate/config.yml`,
/// then built-in defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub project_root: PathBuf,

    #[serde(default = "default_worktrees_dir")]
    pub worktrees_dir: PathBuf,

    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,

    #[serde(default = "default_base_branch")]
    pub base_branch: String,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default = "default_dispatch_timeout_ms")]
    pub dispatch_timeout_ms: u64,

    #[serde(default = "default_min_disk_space_gb")]
    pub min_disk_space_gb: u64,

    #[serde(default = "default_pack_path")]
    pub pack_path: PathBuf,

    #[serde(default)]
    pub rate_table_overrides: std::collections::BTreeMap<String, std::collections::BTreeMap<String, (f64, f64)>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            worktrees_dir: default_worktrees_dir(),
            branch_prefix: default_branch_prefix(),
            base_branch: default_base_branch(),
            max_concurrency: default_max_concurrency(),
            dispatch_timeout_ms: default_dispatch_timeout_ms(),
            min_disk_space_gb: default_min_disk_space_gb(),
            pack_path: default_pack_path(),
            rate_table_overrides: std::collections::BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn db_path(&self) -> PathBuf {
        self.project_root.join(".substrate").join("state.db")
    }

    pub fn worktree_base_dir(&self) -> PathBuf {
        self.project_root.join(&self.worktrees_dir)
    }

    /// Resolution order: explicit `path` -> `<cwd>/.substrate/config.yml` ->
    /// `dirs::config_dir()/substrate/config.yml` -> defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            debug!(?path, "Config::load: explicit path");
            return Self::load_from(path);
        }

        let project_config = Path::new(".substrate/config.yml");
        if project_config.exists() {
            debug!("Config::load: project config found");
            return Self::load_from(project_config);
        }

        if let Some(dir) = dirs::config_dir() {
            let global = dir.join("substrate").join("config.yml");
            if global.exists() {
                debug!(?global, "Config::load: global config found");
                return Self::load_from(&global);
            }
        }

        debug!("Config::load: no config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| CoreError::Config(e.to_string()))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&text).map_err(|e| CoreError::ConfigIncompatibleFormat(e.to_string())),
            _ => serde_yaml::from_str(&text).map_err(|e| CoreError::ConfigIncompatibleFormat(e.to_string())),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::Config(e.to_string()))?;
        }
        let text = serde_yaml::to_string(self).map_err(|e| CoreError::Config(e.to_string()))?;
        std::fs::write(path, text).map_err(|e| CoreError::Config(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yml");
        let mut config = Config::default();
        config.max_concurrency = 12;
        config.save(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.max_concurrency, 12);
    }

    #[test]
    fn missing_config_falls_back_to_defaults() {
        let config = Config::default();
        assert_eq!(config.base_branch, "main");
        assert_eq!(config.branch_prefix, "substrate");
    }

    // Config::load()'s project-config branch reads `.substrate/config.yml`
    // relative to the process's current directory, so this test mutates
    // global process state and must not interleave with any other test
    // that also changes or depends on the current directory.
    #[test]
    #[serial_test::serial]
    fn load_finds_project_config_in_current_directory() {
        let dir = tempdir().unwrap();
        let original = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();

        let mut config = Config::default();
        config.max_concurrency = 7;
        config.save(Path::new(".substrate/config.yml")).unwrap();

        let loaded = Config::load(None).unwrap();

        std::env::set_current_dir(original).unwrap();
        assert_eq!(loaded.max_concurrency, 7);
    }
}
