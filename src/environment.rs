use ahash::AHashMap;
use parking_lot::RwLock;

use crate::{config::SyncConfig, errors::SyncError, sqlite_store::SqliteStore};

pub struct Environments {
    stores: AHashMap<String, SqliteStore>,
    active: RwLock<String>,
}

impl Environments {
    pub fn new(default: impl Into<String>, store: SqliteStore) -> Self {
        let default = default.into();
        let mut stores = AHashMap::new();
        stores.insert(default.clone(), store);
        Self {
            stores,
            active: RwLock::new(default),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self, SyncError> {
        config.validate()?;
        let mut stores = AHashMap::new();
        for env in &config.environments {
            stores.insert(env.name.clone(), SqliteStore::from_environment(env)?);
        }
        Ok(Self {
            stores,
            active: RwLock::new(config.default.clone()),
        })
    }

    pub fn with(mut self, name: impl Into<String>, store: SqliteStore) -> Self {
        self.stores.insert(name.into(), store);
        self
    }

    pub fn active_name(&self) -> String {
        self.active.read().clone()
    }

    pub fn current(&self) -> Result<&SqliteStore, SyncError> {
        let name = self.active_name();
        self.store(&name)
    }

    pub fn store(&self, name: &str) -> Result<&SqliteStore, SyncError> {
        self.stores
            .get(name)
            .ok_or_else(|| SyncError::configuration(format!("unknown environment {name}")))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.stores.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Makes `name` the active environment until the returned guard is dropped.
    pub fn activate(&self, name: &str) -> Result<EnvironmentGuard<'_>, SyncError> {
        let store = self.store(name)?;
        let previous = std::mem::replace(&mut *self.active.write(), name.to_string());
        tracing::debug!(from = %previous, to = %name, "switched environment");
        Ok(EnvironmentGuard {
            environments: self,
            store,
            previous,
        })
    }
}

pub struct EnvironmentGuard<'a> {
    environments: &'a Environments,
    store: &'a SqliteStore,
    previous: String,
}

impl<'a> EnvironmentGuard<'a> {
    pub fn store(&self) -> &'a SqliteStore {
        self.store
    }
}

impl Drop for EnvironmentGuard<'_> {
    fn drop(&mut self) {
        let mut active = self.environments.active.write();
        tracing::debug!(from = %active.as_str(), to = %self.previous, "restored environment");
        *active = std::mem::take(&mut self.previous);
    }
}
