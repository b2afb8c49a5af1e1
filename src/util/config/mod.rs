//! workpool configuration system
//!
//! Supports user-level and project-level configuration with merge semantics.
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. CLI arguments
//! 2. Environment variables (WORKPOOL_PARALLELISM, WORKPOOL_POLICY, ...)
//! 3. Project-level (./workpool.toml)
//! 4. User-level (~/.config/workpool/config.toml)
//! 5. Default values
//! ```
//!
//! Levels 1 and 2 are handled by the command line parser; this module loads
//! and merges the two files.
//!
//! # Example file
//!
//! ```toml
//! [pool]
//! parallelism = 8
//! policy = "static-chunked"
//! backend = "rayon"
//!
//! [log]
//! level = "debug"
//!
//! [run]
//! seed = 12345
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use std::fs;
use std::path::{Path, PathBuf};

use crate::pool::{default_parallelism, Backend, PoolConfig, SchedulingPolicy};
use crate::util::logger::LogLevel;

/// Name of the project-level config file.
pub const PROJECT_CONFIG_FILE: &str = "workpool.toml";

/// Seed used when none is configured.
pub const DEFAULT_SEED: u64 = 12345;

/// Contents of a config file. Every field is optional so that files merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConfig {
    /// Pool settings
    #[serde(default)]
    pub pool: PoolSection,
    /// Logging settings
    #[serde(default)]
    pub log: LogSection,
    /// Workload settings
    #[serde(default)]
    pub run: RunSection,
}

/// `[pool]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSection {
    #[serde(default)]
    pub parallelism: Option<usize>,
    #[serde(default)]
    pub policy: Option<SchedulingPolicy>,
    #[serde(default)]
    pub backend: Option<Backend>,
}

/// `[log]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSection {
    #[serde(default)]
    pub level: Option<LogLevel>,
}

/// `[run]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSection {
    /// Seed for generated task inputs.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl FileConfig {
    /// Layer `over` on top of `self`; values set in `over` win.
    pub fn merge(
        self,
        over: FileConfig,
    ) -> FileConfig {
        FileConfig {
            pool: PoolSection {
                parallelism: over.pool.parallelism.or(self.pool.parallelism),
                policy: over.pool.policy.or(self.pool.policy),
                backend: over.pool.backend.or(self.pool.backend),
            },
            log: LogSection {
                level: over.log.level.or(self.log.level),
            },
            run: RunSection {
                seed: over.run.seed.or(self.run.seed),
            },
        }
    }

    /// Pool configuration with defaults filled in.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            parallelism: self.pool.parallelism.unwrap_or_else(default_parallelism),
            policy: self.pool.policy.unwrap_or_default(),
            backend: self.pool.backend.unwrap_or_default(),
        }
    }

    /// Configured log level, INFO by default.
    pub fn log_level(&self) -> LogLevel {
        self.log.level.unwrap_or_default()
    }

    /// Configured seed, [`DEFAULT_SEED`] by default.
    pub fn seed(&self) -> u64 {
        self.run.seed.unwrap_or(DEFAULT_SEED)
    }
}

/// Get the user config directory
pub fn get_config_dir() -> Option<PathBuf> {
    // Try XDG config directory on Unix
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config).join("workpool"));
    }

    // Fallback to ~/.config/workpool
    if let Ok(home) = std::env::var("HOME") {
        return Some(PathBuf::from(home).join(".config").join("workpool"));
    }

    // On Windows, try %APPDATA%
    if let Ok(appdata) = std::env::var("APPDATA") {
        return Some(PathBuf::from(appdata).join("workpool"));
    }

    None
}

/// Get the user config file path (~/.config/workpool/config.toml)
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.toml"))
}

/// Load one config file. The file must exist.
pub fn load_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
    toml::from_str(&content).map_err(|e| ConfigError::ParseError(path.to_path_buf(), e))
}

/// Load a config file if it exists, defaults otherwise.
fn load_optional(path: &Path) -> Result<FileConfig, ConfigError> {
    if path.exists() {
        load_file(path)
    } else {
        Ok(FileConfig::default())
    }
}

/// Load the user file and the project file in `project_dir`, merged.
pub fn load_layered(
    user_path: Option<&Path>,
    project_dir: &Path,
) -> Result<FileConfig, ConfigError> {
    let user = match user_path {
        Some(path) => load_optional(path)?,
        None => FileConfig::default(),
    };
    let project = load_optional(&project_dir.join(PROJECT_CONFIG_FILE))?;
    Ok(user.merge(project))
}

/// Load configuration for the current process.
///
/// An explicit path replaces both file levels and must exist.
pub fn load_config(explicit: Option<&Path>) -> Result<FileConfig, ConfigError> {
    if let Some(path) = explicit {
        return load_file(path);
    }
    let project_dir = std::env::current_dir().map_err(|e| ConfigError::IoError(PathBuf::from("."), e))?;
    load_layered(get_config_path().as_deref(), &project_dir)
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {}: {}", .0.display(), .1)]
    IoError(PathBuf, #[source] std::io::Error),
    #[error("Config parse error in {}: {}", .0.display(), .1)]
    ParseError(PathBuf, #[source] toml::de::Error),
}
