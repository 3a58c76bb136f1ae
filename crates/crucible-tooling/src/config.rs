//! Connection-level configuration shared by every operation on a facade.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variables consulted by [`ConnectionParameters::apply_env_overrides`].
pub mod env {
    pub const DAEMON_BASE_DIR: &str = "CRUCIBLE_DAEMON_BASE_DIR";
    pub const USER_HOME: &str = "CRUCIBLE_USER_HOME";
    pub const DAEMON_IDLE_SECS: &str = "CRUCIBLE_DAEMON_IDLE_SECS";
    pub const VERBOSE: &str = "CRUCIBLE_TOOLING_VERBOSE";
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse connection config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid connection config: {0}")]
    Invalid(String),
}

/// Settings describing how to reach the daemon for one project.
///
/// Read-only once a connection is established; operations hold it through an
/// `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParameters {
    /// Root directory of the project the daemon builds
    pub project_dir: PathBuf,
    /// Per-user state directory used by the daemon (caches, registry)
    #[serde(default)]
    pub user_home_dir: Option<PathBuf>,
    /// Whether to look for the build root in parent directories
    #[serde(default = "default_true")]
    pub search_upwards: bool,
    /// Run the engine in-process instead of in a daemon
    #[serde(default)]
    pub embedded: bool,
    /// Idle time after which the daemon stops itself
    #[serde(default)]
    pub daemon_max_idle_time_secs: Option<u64>,
    /// Where daemon logs and registry files live
    #[serde(default)]
    pub daemon_base_dir: Option<PathBuf>,
    #[serde(default)]
    pub verbose_logging: bool,
}

fn default_true() -> bool {
    true
}

impl ConnectionParameters {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            user_home_dir: None,
            search_upwards: true,
            embedded: false,
            daemon_max_idle_time_secs: None,
            daemon_base_dir: None,
            verbose_logging: false,
        }
    }

    pub fn with_user_home_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.user_home_dir = Some(dir.into());
        self
    }

    pub fn with_search_upwards(mut self, search_upwards: bool) -> Self {
        self.search_upwards = search_upwards;
        self
    }

    pub fn with_embedded(mut self, embedded: bool) -> Self {
        self.embedded = embedded;
        self
    }

    pub fn with_daemon_max_idle_time(mut self, idle: Duration) -> Self {
        self.daemon_max_idle_time_secs = Some(idle.as_secs());
        self
    }

    pub fn with_daemon_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.daemon_base_dir = Some(dir.into());
        self
    }

    pub fn with_verbose_logging(mut self, verbose: bool) -> Self {
        self.verbose_logging = verbose;
        self
    }

    pub fn daemon_max_idle_time(&self) -> Option<Duration> {
        self.daemon_max_idle_time_secs.map(Duration::from_secs)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let params: Self = toml::from_str(contents)?;
        params.validate()?;
        Ok(params)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Overlay values from the environment.
    ///
    /// `lookup` is usually `|key| std::env::var(key).ok()`.
    pub fn apply_env_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(env::DAEMON_BASE_DIR) {
            self.daemon_base_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = lookup(env::USER_HOME) {
            self.user_home_dir = Some(PathBuf::from(dir));
        }
        if let Some(secs) = lookup(env::DAEMON_IDLE_SECS) {
            let secs = secs.trim().parse::<u64>().map_err(|e| {
                ConfigError::Invalid(format!(
                    "{} must be a number of seconds: {}",
                    env::DAEMON_IDLE_SECS,
                    e
                ))
            })?;
            self.daemon_max_idle_time_secs = Some(secs);
        }
        if let Some(verbose) = lookup(env::VERBOSE) {
            self.verbose_logging = matches!(
                verbose.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.daemon_max_idle_time_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "daemon_max_idle_time_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
