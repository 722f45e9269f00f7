use std::collections::{BTreeMap, BTreeSet};

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    errors::SyncError,
    schema::{ModelDef, Relationship, RelationshipKind, Schema, Target},
    sqlite_store::quote_ident,
};

#[derive(Clone, Debug)]
pub enum SchemaShape {
    /// `Model{i}` belongs to `Model{i+1}`, which has many `Model{i}` back.
    Chain,
    /// A hub model with a has-many to every other model, each pointing back.
    Star,
    /// Every model gets `relationships` belongs-to/has-many edges to random models.
    Random { relationships: usize },
}

pub fn model_name(idx: usize) -> String {
    format!("Model{idx}")
}

pub fn table_name(idx: usize) -> String {
    format!("model{idx}s")
}

pub fn generate_schema(
    shape: SchemaShape,
    model_count: usize,
    seed: u64,
) -> Result<Schema, SyncError> {
    assert!(model_count > 1, "model_count must exceed 1");
    let mut models: Vec<ModelDef> = (0..model_count)
        .map(|idx| ModelDef::new(model_name(idx), table_name(idx)))
        .collect();
    match shape {
        SchemaShape::Chain => {
            for idx in 0..model_count - 1 {
                let next = idx + 1;
                push(&mut models, idx, Relationship::belongs_to(format!("model{next}"), model_name(next)));
                push(&mut models, next, Relationship::has_many(table_name(idx), model_name(idx)));
            }
        }
        SchemaShape::Star => {
            for leaf in 1..model_count {
                push(&mut models, 0, Relationship::has_many(table_name(leaf), model_name(leaf)));
                push(&mut models, leaf, Relationship::belongs_to("model0", model_name(0)));
            }
        }
        SchemaShape::Random { relationships } => {
            let mut rng = StdRng::seed_from_u64(seed);
            for idx in 0..model_count {
                for slot in 0..relationships {
                    let target = rng.gen_range(0..model_count);
                    let relationship = if rng.gen_bool(0.5) {
                        Relationship::belongs_to(format!("parent{slot}"), model_name(target))
                    } else {
                        Relationship::has_many(format!("children{slot}"), model_name(target))
                            .foreign_key(format!("owner{idx}_slot{slot}_id"))
                    };
                    push(&mut models, idx, relationship);
                }
            }
        }
    }
    Schema::new(models)
}

fn push(models: &mut [ModelDef], idx: usize, relationship: Relationship) {
    models[idx].relationships.push(relationship);
}

/// `CREATE TABLE` statements covering every key column the schema's relationships read.
pub fn schema_ddl(schema: &Schema) -> String {
    let mut columns: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut joins: BTreeMap<String, (String, String)> = BTreeMap::new();
    for model in schema.models() {
        columns.entry(model.table.clone()).or_default();
        for relationship in &model.relationships {
            match (&relationship.kind, &relationship.target) {
                (RelationshipKind::BelongsTo { foreign_key }, Target::Model(_)) => {
                    columns
                        .entry(model.table.clone())
                        .or_default()
                        .insert(foreign_key.clone());
                }
                (RelationshipKind::BelongsTo { foreign_key }, Target::Polymorphic { type_column }) => {
                    let owned = columns.entry(model.table.clone()).or_default();
                    owned.insert(foreign_key.clone());
                    owned.insert(type_column.clone());
                }
                (
                    RelationshipKind::HasOne {
                        foreign_key,
                        type_column,
                    }
                    | RelationshipKind::HasMany {
                        foreign_key,
                        type_column,
                    },
                    Target::Model(target),
                ) => {
                    let Ok(target) = schema.model(target) else {
                        continue;
                    };
                    let owned = columns.entry(target.table.clone()).or_default();
                    owned.insert(foreign_key.clone());
                    if let Some(type_column) = type_column {
                        owned.insert(type_column.clone());
                    }
                }
                (RelationshipKind::HasAndBelongsToMany { join }, _) => {
                    joins.insert(
                        join.table.clone(),
                        (join.owner_key.clone(), join.associated_key.clone()),
                    );
                }
                _ => {}
            }
        }
    }
    let mut ddl = String::new();
    for (table, keys) in &columns {
        let mut defs = vec!["\"id\" INTEGER PRIMARY KEY".to_string(), "\"name\" TEXT".to_string()];
        defs.extend(keys.iter().filter(|k| *k != "id").map(|k| format!("{} INTEGER", quote_ident(k))));
        ddl.push_str(&format!("CREATE TABLE {} ({});\n", quote_ident(table), defs.join(", ")));
    }
    for (table, (owner, associated)) in &joins {
        ddl.push_str(&format!(
            "CREATE TABLE {} ({} INTEGER, {} INTEGER);\n",
            quote_ident(table),
            quote_ident(owner),
            quote_ident(associated)
        ));
    }
    ddl
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_schemas_are_deterministic_per_seed() {
        let first = generate_schema(SchemaShape::Random { relationships: 2 }, 6, 7).unwrap();
        let second = generate_schema(SchemaShape::Random { relationships: 2 }, 6, 7).unwrap();
        let names = |schema: &Schema| -> Vec<Option<String>> {
            schema
                .models()
                .flat_map(|m| m.relationships.iter().map(|r| r.target_model().map(str::to_string)))
                .collect()
        };
        assert_eq!(names(&first), names(&second));
    }

    #[test]
    fn ddl_places_has_many_keys_on_the_target() {
        let schema = generate_schema(SchemaShape::Chain, 2, 0).unwrap();
        let ddl = schema_ddl(&schema);
        assert!(ddl.contains(
            "CREATE TABLE \"model0s\" (\"id\" INTEGER PRIMARY KEY, \"name\" TEXT, \"model1_id\" INTEGER);"
        ));
        assert!(ddl.contains("CREATE TABLE \"model1s\" (\"id\" INTEGER PRIMARY KEY, \"name\" TEXT);"));
    }
}
