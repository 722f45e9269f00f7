use crate::{
    cache::ObservedTypeCache,
    errors::SyncError,
    schema::{Relationship, Schema, SchemaProvider, Target},
    store::Store,
};

/// [`SchemaProvider`] backed by a static [`Schema`] plus a store holding live rows.
///
/// Polymorphic targets are discovered from the distinct discriminator values present in
/// the store and cached for the lifetime of the introspector.
pub struct Introspector<'a> {
    schema: &'a Schema,
    store: &'a dyn Store,
    observed: ObservedTypeCache,
}

impl<'a> Introspector<'a> {
    pub fn new(schema: &'a Schema, store: &'a dyn Store) -> Self {
        Self {
            schema,
            store,
            observed: ObservedTypeCache::new(),
        }
    }

    pub fn schema(&self) -> &Schema {
        self.schema
    }

    pub fn clear_cache(&self) {
        self.observed.clear();
    }
}

impl SchemaProvider for Introspector<'_> {
    fn relationships_of(&self, model: &str) -> Result<&[Relationship], SyncError> {
        Ok(&self.schema.model(model)?.relationships)
    }

    fn observed_target_types(
        &self,
        model: &str,
        relationship: &Relationship,
    ) -> Result<Vec<String>, SyncError> {
        let Target::Polymorphic { type_column } = &relationship.target else {
            return Ok(relationship.target_model().map(str::to_string).into_iter().collect());
        };
        if let Some(cached) = self.observed.get(model, &relationship.name) {
            return Ok(cached);
        }
        let table = &self.schema.model(model)?.table;
        let types = self.store.distinct_values(table, type_column)?;
        for observed in &types {
            if !self.schema.contains(observed) {
                return Err(SyncError::schema(format!(
                    "{model}.{} points at unknown model {observed}",
                    relationship.name
                )));
            }
        }
        self.observed.insert(model, &relationship.name, types.clone());
        Ok(types)
    }
}
