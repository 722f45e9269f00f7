//! Canonical traversal plans: one single-relationship chain per expansion.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::{descriptor::Descriptor, errors::SyncError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Nested {
    Leaf,
    Then(Box<AssociationPath>),
    Polymorphic(BTreeMap<String, Option<Descriptor>>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssociationPath {
    pub relationship: String,
    pub nested: Nested,
}

pub type CanonicalDescriptor = Vec<AssociationPath>;

impl AssociationPath {
    pub fn leaf(relationship: impl Into<String>) -> Self {
        Self {
            relationship: relationship.into(),
            nested: Nested::Leaf,
        }
    }

    pub fn then(relationship: impl Into<String>, next: AssociationPath) -> Self {
        Self {
            relationship: relationship.into(),
            nested: Nested::Then(Box::new(next)),
        }
    }

    pub fn polymorphic(
        relationship: impl Into<String>,
        branches: BTreeMap<String, Option<Descriptor>>,
    ) -> Self {
        Self {
            relationship: relationship.into(),
            nested: Nested::Polymorphic(branches),
        }
    }

    pub fn is_polymorphic(&self) -> bool {
        matches!(self.nested, Nested::Polymorphic(_))
    }

    /// Single-key shorthand for this chain; a leaf renders as `{name: {}}`.
    pub fn to_descriptor(&self) -> Descriptor {
        let nested = match &self.nested {
            Nested::Leaf => Descriptor::Map(Vec::new()),
            Nested::Then(next) => next.to_descriptor(),
            Nested::Polymorphic(branches) => Descriptor::ByType(branches.clone()),
        };
        Descriptor::nested(self.relationship.clone(), nested)
    }
}

pub fn normalize(descriptor: &Descriptor) -> Result<CanonicalDescriptor, SyncError> {
    let mut paths = Vec::new();
    collect_paths(descriptor, &mut paths)?;
    Ok(paths)
}

/// Renders a canonical plan back into shorthand, one single-key map per chain.
pub fn to_descriptor(paths: &[AssociationPath]) -> Descriptor {
    Descriptor::List(paths.iter().map(AssociationPath::to_descriptor).collect())
}

/// JSON rendering of a canonical plan: `[{"a": {"b": {}}}, ...]`.
pub fn to_json(paths: &[AssociationPath]) -> Value {
    Value::Array(
        paths
            .iter()
            .map(|path| Value::from(&path.to_descriptor()))
            .collect(),
    )
}

fn collect_paths(
    descriptor: &Descriptor,
    paths: &mut CanonicalDescriptor,
) -> Result<(), SyncError> {
    match descriptor {
        Descriptor::Name(name) => paths.push(AssociationPath::leaf(name.clone())),
        Descriptor::List(items) => {
            for item in items {
                collect_paths(item, paths)?;
            }
        }
        Descriptor::Map(entries) => {
            for (name, value) in entries {
                if let Some(branches) = polymorphic_branches(value) {
                    paths.push(AssociationPath::polymorphic(name.clone(), branches));
                    continue;
                }
                let nested = normalize(value)?;
                if nested.is_empty() {
                    paths.push(AssociationPath::leaf(name.clone()));
                }
                for next in nested {
                    paths.push(AssociationPath::then(name.clone(), next));
                }
            }
        }
        Descriptor::ByType(branches) => {
            let models: Vec<&str> = branches.keys().map(String::as_str).collect();
            return Err(SyncError::invalid_input(format!(
                "per-model branches ({}) must sit under a relationship name",
                models.join(", ")
            )));
        }
    }
    Ok(())
}

/// Branch map of a relationship value, merging a list made only of branch maps.
fn polymorphic_branches(value: &Descriptor) -> Option<BTreeMap<String, Option<Descriptor>>> {
    match value {
        Descriptor::ByType(branches) => Some(branches.clone()),
        Descriptor::List(items)
            if !items.is_empty() && items.iter().all(|i| matches!(i, Descriptor::ByType(_))) =>
        {
            let mut merged = BTreeMap::new();
            for item in items {
                if let Descriptor::ByType(branches) = item {
                    merged.extend(branches.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
            }
            Some(merged)
        }
        _ => None,
    }
}
