use ahash::AHashMap;
use parking_lot::RwLock;

/// Observed polymorphic target models keyed by `(model, relationship)`.
#[derive(Default)]
pub struct ObservedTypeCache {
    inner: RwLock<AHashMap<(String, String), Vec<String>>>,
}

impl ObservedTypeCache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(AHashMap::new()),
        }
    }

    pub fn get(&self, model: &str, relationship: &str) -> Option<Vec<String>> {
        self.inner
            .read()
            .get(&(model.to_string(), relationship.to_string()))
            .cloned()
    }

    pub fn insert(&self, model: &str, relationship: &str, types: Vec<String>) {
        self.inner
            .write()
            .insert((model.to_string(), relationship.to_string()), types);
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }
}
