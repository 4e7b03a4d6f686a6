use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_DIFF_RESULTS_CHUNK: usize = 5;
pub const DEFAULT_OPEN_RETRY_COUNT: usize = 10;
pub const DEFAULT_OPEN_RETRY_SLEEP_MS: u64 = 500;
pub const DEFAULT_MAX_SEARCH_MESSAGES: usize = 500;

/// Settings handed to database handles, the diff worker and the merger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkypConfig {
    /// Copy the database file to `<file>.bak` before the first write.
    pub db_do_backup: bool,
    /// Differing chats per side accumulated before a scan posts results.
    pub diff_results_chunk: usize,
    pub open_retry_count: usize,
    pub open_retry_sleep_ms: u64,
    pub max_search_messages: usize,
}

impl Default for SkypConfig {
    fn default() -> Self {
        Self {
            db_do_backup: false,
            diff_results_chunk: DEFAULT_DIFF_RESULTS_CHUNK,
            open_retry_count: DEFAULT_OPEN_RETRY_COUNT,
            open_retry_sleep_ms: DEFAULT_OPEN_RETRY_SLEEP_MS,
            max_search_messages: DEFAULT_MAX_SEARCH_MESSAGES,
        }
    }
}

impl SkypConfig {
    /// Reads the config file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("skyperious").join("config.toml"))
    }

    pub fn open_retry_sleep(&self) -> Duration {
        Duration::from_millis(self.open_retry_sleep_ms)
    }

    pub fn with_backup(mut self, enabled: bool) -> Self {
        self.db_do_backup = enabled;
        self
    }
}
