//! Model and relationship metadata. Unset foreign keys, discriminators and join tables
//! follow the usual conventions (`partner_id`, `imageable_type`, `assemblies_parts`).

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::errors::SyncError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    Single,
    Multiple,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinTable {
    #[serde(default)]
    pub table: String,
    #[serde(default)]
    pub owner_key: String,
    #[serde(default)]
    pub associated_key: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationshipKind {
    BelongsTo {
        #[serde(default)]
        foreign_key: String,
    },
    HasOne {
        #[serde(default)]
        foreign_key: String,
        /// Discriminator column on the target table for `as:` relationships.
        #[serde(default)]
        type_column: Option<String>,
    },
    HasMany {
        #[serde(default)]
        foreign_key: String,
        #[serde(default)]
        type_column: Option<String>,
    },
    HasAndBelongsToMany {
        #[serde(default)]
        join: JoinTable,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Model(String),
    /// The runtime model is named by a discriminator column on the owner row.
    Polymorphic {
        #[serde(default)]
        type_column: String,
    },
}

/// Indirect relationship: follow `via` on the owner, then `source` on what `via` reaches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Through {
    pub via: String,
    pub source: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub name: String,
    #[serde(flatten)]
    pub kind: RelationshipKind,
    pub target: Target,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub through: Option<Through>,
}

impl Relationship {
    pub fn belongs_to(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: RelationshipKind::BelongsTo {
                foreign_key: String::new(),
            },
            target: Target::Model(target.into()),
            through: None,
        }
    }

    pub fn belongs_to_polymorphic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: RelationshipKind::BelongsTo {
                foreign_key: String::new(),
            },
            target: Target::Polymorphic {
                type_column: String::new(),
            },
            through: None,
        }
    }

    pub fn has_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: RelationshipKind::HasOne {
                foreign_key: String::new(),
                type_column: None,
            },
            target: Target::Model(target.into()),
            through: None,
        }
    }

    pub fn has_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: RelationshipKind::HasMany {
                foreign_key: String::new(),
                type_column: None,
            },
            target: Target::Model(target.into()),
            through: None,
        }
    }

    pub fn has_and_belongs_to_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: RelationshipKind::HasAndBelongsToMany {
                join: JoinTable::default(),
            },
            target: Target::Model(target.into()),
            through: None,
        }
    }

    /// A has-many reached through `via` and then `source` on the intermediate model.
    pub fn has_many_through(
        name: impl Into<String>,
        target: impl Into<String>,
        via: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        let mut relationship = Self::has_many(name, target);
        relationship.through = Some(Through {
            via: via.into(),
            source: source.into(),
        });
        relationship
    }

    /// A has-one reached through `via` and then `source` on the intermediate model.
    pub fn has_one_through(
        name: impl Into<String>,
        target: impl Into<String>,
        via: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        let mut relationship = Self::has_one(name, target);
        relationship.through = Some(Through {
            via: via.into(),
            source: source.into(),
        });
        relationship
    }

    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        match &mut self.kind {
            RelationshipKind::BelongsTo { foreign_key }
            | RelationshipKind::HasOne { foreign_key, .. }
            | RelationshipKind::HasMany { foreign_key, .. } => *foreign_key = column.into(),
            RelationshipKind::HasAndBelongsToMany { join } => join.owner_key = column.into(),
        }
        self
    }

    /// Marks a has-one/has-many as the inverse of a polymorphic belongs-to named `interface`.
    pub fn as_interface(mut self, interface: &str) -> Self {
        if let RelationshipKind::HasOne {
            foreign_key,
            type_column,
        }
        | RelationshipKind::HasMany {
            foreign_key,
            type_column,
        } = &mut self.kind
        {
            *foreign_key = format!("{interface}_id");
            *type_column = Some(format!("{interface}_type"));
        }
        self
    }

    pub fn type_column(mut self, column: impl Into<String>) -> Self {
        if let Target::Polymorphic { type_column } = &mut self.target {
            *type_column = column.into();
        }
        self
    }

    pub fn join_table(
        mut self,
        table: impl Into<String>,
        owner_key: impl Into<String>,
        associated_key: impl Into<String>,
    ) -> Self {
        if let RelationshipKind::HasAndBelongsToMany { join } = &mut self.kind {
            *join = JoinTable {
                table: table.into(),
                owner_key: owner_key.into(),
                associated_key: associated_key.into(),
            };
        }
        self
    }

    pub fn cardinality(&self) -> Cardinality {
        match self.kind {
            RelationshipKind::BelongsTo { .. } | RelationshipKind::HasOne { .. } => {
                Cardinality::Single
            }
            RelationshipKind::HasMany { .. } | RelationshipKind::HasAndBelongsToMany { .. } => {
                Cardinality::Multiple
            }
        }
    }

    pub fn is_through(&self) -> bool {
        self.through.is_some()
    }

    pub fn is_polymorphic(&self) -> bool {
        matches!(self.target, Target::Polymorphic { .. })
    }

    pub fn target_model(&self) -> Option<&str> {
        match &self.target {
            Target::Model(model) => Some(model.as_str()),
            Target::Polymorphic { .. } => None,
        }
    }

    pub fn join(&self) -> Option<&JoinTable> {
        match &self.kind {
            RelationshipKind::HasAndBelongsToMany { join } => Some(join),
            _ => None,
        }
    }
}

fn default_primary_key() -> String {
    "id".to_string()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDef {
    pub name: String,
    pub table: String,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    /// Writable columns. Empty means every column the store returns.
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl ModelDef {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            primary_key: default_primary_key(),
            columns: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn belongs_to(self, name: &str, target: &str) -> Self {
        self.relationship(Relationship::belongs_to(name, target))
    }

    pub fn belongs_to_polymorphic(self, name: &str) -> Self {
        self.relationship(Relationship::belongs_to_polymorphic(name))
    }

    pub fn has_one(self, name: &str, target: &str) -> Self {
        self.relationship(Relationship::has_one(name, target))
    }

    pub fn has_many(self, name: &str, target: &str) -> Self {
        self.relationship(Relationship::has_many(name, target))
    }

    pub fn has_and_belongs_to_many(self, name: &str, target: &str) -> Self {
        self.relationship(Relationship::has_and_belongs_to_many(name, target))
    }

    pub fn find_relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|rel| rel.name == name)
    }
}

#[derive(Deserialize)]
struct SchemaFile {
    models: Vec<ModelDef>,
}

/// Validated registry of models with every relationship convention filled in.
#[derive(Clone, Debug)]
pub struct Schema {
    models: Vec<ModelDef>,
    index: AHashMap<String, usize>,
}

impl Schema {
    pub fn new(models: Vec<ModelDef>) -> Result<Self, SyncError> {
        let mut index = AHashMap::new();
        for (idx, model) in models.iter().enumerate() {
            if model.name.trim().is_empty() || model.table.trim().is_empty() {
                return Err(SyncError::schema("model name and table must be set"));
            }
            if index.insert(model.name.clone(), idx).is_some() {
                return Err(SyncError::schema(format!(
                    "model {} is defined twice",
                    model.name
                )));
            }
        }
        let tables: AHashMap<String, String> = models
            .iter()
            .map(|model| (model.name.clone(), model.table.clone()))
            .collect();

        let mut resolved = Vec::with_capacity(models.len());
        for mut model in models {
            let owner = model.name.clone();
            let owner_table = model.table.clone();
            for relationship in &mut model.relationships {
                apply_conventions(&owner, &owner_table, relationship, &tables)?;
            }
            resolved.push(model);
        }
        let schema = Self {
            models: resolved,
            index,
        };
        schema.validate_through()?;
        Ok(schema)
    }

    pub fn from_json_str(json: &str) -> Result<Self, SyncError> {
        let file: SchemaFile = serde_json::from_str(json)
            .map_err(|e| SyncError::schema(format!("invalid schema document: {e}")))?;
        Self::new(file.models)
    }

    pub fn model(&self, name: &str) -> Result<&ModelDef, SyncError> {
        self.index
            .get(name)
            .map(|&idx| &self.models[idx])
            .ok_or_else(|| SyncError::schema(format!("unknown model {name}")))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelDef> {
        self.models.iter()
    }

    pub fn relationship(&self, model: &str, name: &str) -> Result<&Relationship, SyncError> {
        self.model(model)?
            .find_relationship(name)
            .ok_or_else(|| SyncError::schema(format!("{model} has no relationship named {name}")))
    }

    fn validate_through(&self) -> Result<(), SyncError> {
        for model in &self.models {
            for relationship in &model.relationships {
                let Some(through) = &relationship.through else {
                    continue;
                };
                let via = self.relationship(&model.name, &through.via)?;
                let Some(via_target) = via.target_model() else {
                    return Err(SyncError::schema(format!(
                        "{}.{} cannot go through polymorphic {}",
                        model.name, relationship.name, through.via
                    )));
                };
                self.relationship(via_target, &through.source)?;
            }
        }
        Ok(())
    }
}

/// Relationship metadata as seen by the resolver.
pub trait SchemaProvider {
    fn relationships_of(&self, model: &str) -> Result<&[Relationship], SyncError>;

    /// Distinct runtime models a polymorphic relationship points at in the source data.
    fn observed_target_types(
        &self,
        model: &str,
        relationship: &Relationship,
    ) -> Result<Vec<String>, SyncError>;
}

fn apply_conventions(
    owner: &str,
    owner_table: &str,
    relationship: &mut Relationship,
    tables: &AHashMap<String, String>,
) -> Result<(), SyncError> {
    if relationship.name.trim().is_empty() {
        return Err(SyncError::schema(format!(
            "{owner} has a relationship without a name"
        )));
    }
    if let Target::Model(target) = &relationship.target {
        if !tables.contains_key(target) {
            return Err(SyncError::schema(format!(
                "{owner}.{} targets unknown model {target}",
                relationship.name
            )));
        }
    }
    let name = relationship.name.clone();
    match (&mut relationship.kind, &mut relationship.target) {
        (RelationshipKind::BelongsTo { foreign_key }, Target::Polymorphic { type_column }) => {
            if foreign_key.is_empty() {
                *foreign_key = format!("{name}_id");
            }
            if type_column.is_empty() {
                *type_column = format!("{name}_type");
            }
        }
        (RelationshipKind::BelongsTo { foreign_key }, Target::Model(_)) => {
            if foreign_key.is_empty() {
                *foreign_key = format!("{name}_id");
            }
        }
        (
            RelationshipKind::HasOne { foreign_key, .. }
            | RelationshipKind::HasMany { foreign_key, .. },
            Target::Model(_),
        ) => {
            if foreign_key.is_empty() {
                *foreign_key = format!("{}_id", snake_case(owner));
            }
        }
        (RelationshipKind::HasAndBelongsToMany { join }, Target::Model(target)) => {
            if join.table.is_empty() {
                let target_table = tables.get(target.as_str()).cloned().unwrap_or_default();
                let mut pair = [owner_table.to_string(), target_table];
                pair.sort();
                join.table = pair.join("_");
            }
            if join.owner_key.is_empty() {
                join.owner_key = format!("{}_id", snake_case(owner));
            }
            if join.associated_key.is_empty() {
                join.associated_key = format!("{}_id", snake_case(target));
            }
        }
        (_, Target::Polymorphic { .. }) => {
            return Err(SyncError::schema(format!(
                "{owner}.{name}: only belongs_to relationships can be polymorphic"
            )));
        }
    }
    Ok(())
}

/// `RealEstateAgent` -> `real_estate_agent`.
pub(crate) fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
            prev_lower = false;
        } else {
            prev_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
            out.push(ch);
        }
    }
    out
}
