use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type Attributes = serde_json::Map<String, Value>;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub model: String,
    pub id: i64,
}

impl RecordKey {
    pub fn new(model: impl Into<String>, id: i64) -> Self {
        Self {
            model: model.into(),
            id,
        }
    }
}

/// One row of a model, detached from the store it was read from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    model: String,
    id: i64,
    attributes: Attributes,
}

impl Record {
    pub fn new(model: impl Into<String>, id: i64, attributes: Attributes) -> Self {
        Self {
            model: model.into(),
            id,
            attributes,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.model.clone(), self.id)
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.attributes.get(column)
    }

    /// Integer value of `column`, `None` when absent, null or not an integer.
    pub fn integer(&self, column: &str) -> Option<i64> {
        self.attributes.get(column).and_then(Value::as_i64)
    }

    pub fn text(&self, column: &str) -> Option<&str> {
        self.attributes.get(column).and_then(Value::as_str)
    }

    /// Fresh copy carrying only the writable attributes. An empty column list keeps them all.
    pub fn detached(&self, columns: &[String]) -> Record {
        let attributes = if columns.is_empty() {
            self.attributes.clone()
        } else {
            self.attributes
                .iter()
                .filter(|(name, _)| columns.iter().any(|column| column == *name))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect()
        };
        Record::new(self.model.clone(), self.id, attributes)
    }
}

/// Insertion-ordered, duplicate-free set of rows found during one sync run.
#[derive(Debug, Default)]
pub struct IdentifiedRecords {
    records: Vec<Record>,
    index: AHashMap<RecordKey, usize>,
}

impl IdentifiedRecords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when a row with the same identity was already present.
    pub fn insert(&mut self, record: Record) -> bool {
        let key = record.key();
        if self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key, self.records.len());
        self.records.push(record);
        true
    }

    /// Merges `records`, returning how many were new.
    pub fn merge<I: IntoIterator<Item = Record>>(&mut self, records: I) -> usize {
        let mut added = 0;
        for record in records {
            if self.insert(record) {
                added += 1;
            }
        }
        added
    }

    pub fn contains(&self, key: &RecordKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &RecordKey) -> Option<&Record> {
        self.index.get(key).map(|&idx| &self.records[idx])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    /// Attribute access for in-place edits; identities cannot be changed.
    pub fn attributes_mut(&mut self, key: &RecordKey) -> Option<&mut Attributes> {
        let idx = *self.index.get(key)?;
        Some(self.records[idx].attributes_mut())
    }

    pub fn iter_attributes_mut(&mut self) -> impl Iterator<Item = (&str, i64, &mut Attributes)> {
        self.records
            .iter_mut()
            .map(|record| (record.model.as_str(), record.id, &mut record.attributes))
    }

    /// Rows grouped by model, groups in order of first appearance.
    pub fn grouped(&self) -> Vec<(&str, Vec<&Record>)> {
        let mut order: AHashMap<&str, usize> = AHashMap::new();
        let mut groups: Vec<(&str, Vec<&Record>)> = Vec::new();
        for record in &self.records {
            let slot = *order.entry(record.model()).or_insert_with(|| {
                groups.push((record.model(), Vec::new()));
                groups.len() - 1
            });
            groups[slot].1.push(record);
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(model: &str, id: i64, name: &str) -> Record {
        let mut attributes = Attributes::new();
        attributes.insert("id".into(), json!(id));
        attributes.insert("name".into(), json!(name));
        Record::new(model, id, attributes)
    }

    #[test]
    fn identity_merge_is_a_noop() {
        let mut set = IdentifiedRecords::new();
        assert!(set.insert(record("Partner", 1, "a")));
        assert!(!set.insert(record("Partner", 1, "changed")));
        assert!(set.insert(record("Vertical", 1, "v")));
        assert_eq!(set.len(), 2);
        let kept = set.get(&RecordKey::new("Partner", 1)).unwrap();
        assert_eq!(kept.text("name"), Some("a"));
    }

    #[test]
    fn grouping_keeps_first_appearance_order() {
        let mut set = IdentifiedRecords::new();
        set.merge(vec![
            record("Campaign", 3, "c"),
            record("Partner", 1, "p"),
            record("Campaign", 4, "d"),
        ]);
        let groups = set.grouped();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "Campaign");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, "Partner");
    }

    #[test]
    fn detached_copy_drops_unlisted_columns() {
        let copy = record("Partner", 7, "x").detached(&["id".to_string()]);
        assert_eq!(copy.id(), 7);
        assert!(copy.get("name").is_none());
        assert_eq!(copy.integer("id"), Some(7));
    }
}
