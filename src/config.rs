//! Configuration for named environments and SQLite connection options.
//!
//! A configuration file is JSON:
//!
//! ```json
//! {
//!   "default": "local",
//!   "environments": [
//!     { "name": "local", "path": "local.db" },
//!     { "name": "remote", "path": "remote.db", "sqlite": { "busy_timeout_ms": 5000 } }
//!   ]
//! }
//! ```
//!
//! The path `":memory:"` opens a private in-memory database.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::SyncError;

pub const MEMORY_PATH: &str = ":memory:";

fn enabled() -> bool {
    true
}

fn default_environment() -> String {
    "default".to_string()
}

/// Options applied to every SQLite connection a store opens.
///
/// # Default Configuration
///
/// ```rust
/// use sqlitesync::config::SqliteConfig;
/// let config = SqliteConfig::default();
/// assert!(config.foreign_keys);
/// assert!(config.busy_timeout_ms.is_none());
/// assert!(config.pragma_settings.is_empty());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Enforce foreign keys outside of bulk writes.
    ///
    /// **Default:** `true`
    #[serde(default = "enabled")]
    pub foreign_keys: bool,

    /// How long a statement waits on a locked database before failing.
    ///
    /// **Default:** `None` (SQLite's own default)
    #[serde(default)]
    pub busy_timeout_ms: Option<u64>,

    /// Additional `PRAGMA key = value` statements run after opening, in list order.
    /// In JSON each entry is a `[key, value]` pair.
    ///
    /// **Default:** empty
    #[serde(default)]
    pub pragma_settings: Vec<(String, String)>,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            foreign_keys: true,
            busy_timeout_ms: None,
            pragma_settings: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub sqlite: SqliteConfig,
}

impl EnvironmentConfig {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            sqlite: SqliteConfig::default(),
        }
    }

    pub fn in_memory(name: impl Into<String>) -> Self {
        Self::new(name, MEMORY_PATH)
    }

    pub fn is_memory(&self) -> bool {
        self.path == MEMORY_PATH
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Environment active when no other one has been activated; sync writes land here.
    #[serde(default = "default_environment")]
    pub default: String,
    pub environments: Vec<EnvironmentConfig>,
}

impl SyncConfig {
    pub fn new(default: impl Into<String>, environments: Vec<EnvironmentConfig>) -> Self {
        Self {
            default: default.into(),
            environments,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, SyncError> {
        let config: SyncConfig = serde_json::from_str(json)
            .map_err(|e| SyncError::configuration(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SyncError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SyncError::configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    pub fn environment(&self, name: &str) -> Option<&EnvironmentConfig> {
        self.environments.iter().find(|env| env.name == name)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        for (idx, env) in self.environments.iter().enumerate() {
            if env.name.trim().is_empty() {
                return Err(SyncError::configuration("environment name must be set"));
            }
            if self.environments[..idx].iter().any(|e| e.name == env.name) {
                return Err(SyncError::configuration(format!(
                    "environment {} is defined twice",
                    env.name
                )));
            }
        }
        if self.environment(&self.default).is_none() {
            return Err(SyncError::configuration(format!(
                "default environment {} is not defined",
                self.default
            )));
        }
        Ok(())
    }
}
