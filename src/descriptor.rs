//! Caller-facing traversal shorthand. In JSON an object whose keys all start with an
//! uppercase letter is a per-model branch map.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};
use serde_json::{Map, Value};

use crate::errors::SyncError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Descriptor {
    Name(String),
    List(Vec<Descriptor>),
    /// Relationship name to nested descriptor, in caller order. An empty map is `{}`.
    Map(Vec<(String, Descriptor)>),
    /// Runtime model to the descriptor to continue with; `None` stops there.
    ByType(BTreeMap<String, Option<Descriptor>>),
}

impl Descriptor {
    pub fn name(name: impl Into<String>) -> Self {
        Descriptor::Name(name.into())
    }

    pub fn nested(name: impl Into<String>, nested: Descriptor) -> Self {
        Descriptor::Map(vec![(name.into(), nested)])
    }

    pub fn by_type<I, S>(branches: I) -> Self
    where
        I: IntoIterator<Item = (S, Option<Descriptor>)>,
        S: Into<String>,
    {
        Descriptor::ByType(
            branches
                .into_iter()
                .map(|(model, branch)| (model.into(), branch))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Descriptor::Name(_) => false,
            Descriptor::List(items) => items.iter().all(Descriptor::is_empty),
            Descriptor::Map(entries) => entries.is_empty(),
            Descriptor::ByType(branches) => branches.is_empty(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, SyncError> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| SyncError::invalid_input(format!("invalid descriptor: {e}")))?;
        Descriptor::try_from(&value)
    }

    pub fn to_json(&self) -> Value {
        Value::from(self)
    }
}

impl Default for Descriptor {
    fn default() -> Self {
        Descriptor::List(Vec::new())
    }
}

impl From<&str> for Descriptor {
    fn from(name: &str) -> Self {
        Descriptor::Name(name.to_string())
    }
}

impl From<Vec<Descriptor>> for Descriptor {
    fn from(items: Vec<Descriptor>) -> Self {
        Descriptor::List(items)
    }
}

impl From<&Descriptor> for Value {
    fn from(descriptor: &Descriptor) -> Self {
        match descriptor {
            Descriptor::Name(name) => Value::String(name.clone()),
            Descriptor::List(items) => Value::Array(items.iter().map(Value::from).collect()),
            Descriptor::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(name, nested)| (name.clone(), Value::from(nested)))
                    .collect(),
            ),
            Descriptor::ByType(branches) => Value::Object(
                branches
                    .iter()
                    .map(|(model, branch)| {
                        (model.clone(), branch.as_ref().map_or(Value::Null, Value::from))
                    })
                    .collect(),
            ),
        }
    }
}

impl TryFrom<&Value> for Descriptor {
    type Error = SyncError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Ok(Descriptor::default()),
            Value::String(name) => Ok(Descriptor::Name(name.clone())),
            Value::Array(items) => items
                .iter()
                .map(Descriptor::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(Descriptor::List),
            Value::Object(map) if is_branch_map(map) => {
                let mut branches = BTreeMap::new();
                for (model, branch) in map {
                    let branch = match branch {
                        Value::Null => None,
                        other => Some(Descriptor::try_from(other)?),
                    };
                    branches.insert(model.clone(), branch);
                }
                Ok(Descriptor::ByType(branches))
            }
            Value::Object(map) => {
                let mut entries = Vec::with_capacity(map.len());
                for (name, nested) in map {
                    let nested = match nested {
                        Value::Null => Descriptor::Map(Vec::new()),
                        other => Descriptor::try_from(other)?,
                    };
                    entries.push((name.clone(), nested));
                }
                Ok(Descriptor::Map(entries))
            }
            other => Err(SyncError::invalid_input(format!(
                "descriptor entries must be names, lists or objects, got {other}"
            ))),
        }
    }
}

fn is_branch_map(map: &Map<String, Value>) -> bool {
    !map.is_empty()
        && map
            .keys()
            .all(|key| key.chars().next().is_some_and(|c| c.is_ascii_uppercase()))
}

impl Serialize for Descriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Value::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Descriptor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Descriptor::try_from(&value).map_err(D::Error::custom)
    }
}
