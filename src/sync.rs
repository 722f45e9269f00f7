//! Record identification and bulk transfer between environments.

use std::collections::{BTreeMap, BTreeSet};

use ahash::{AHashMap, AHashSet};
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    descriptor::Descriptor,
    environment::Environments,
    errors::SyncError,
    normalize::{AssociationPath, Nested, normalize},
    record::{IdentifiedRecords, Record},
    schema::{JoinTable, ModelDef, RelationshipKind, Schema, Target},
    store::{Filter, JoinRow, Store},
};

/// How the root rows of a sync call are chosen.
#[derive(Clone, Debug, PartialEq)]
pub enum Selector {
    Id(i64),
    Filter(Filter),
}

type Hook<'h> = Box<dyn FnOnce(&mut IdentifiedRecords) + 'h>;

pub struct SyncRequest<'h> {
    pub model: String,
    pub id: Option<i64>,
    pub filter: Option<Filter>,
    pub descriptor: Descriptor,
    on_identified: Option<Hook<'h>>,
}

impl<'h> SyncRequest<'h> {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            id: None,
            filter: None,
            descriptor: Descriptor::default(),
            on_identified: None,
        }
    }

    pub fn id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn associations(mut self, descriptor: Descriptor) -> Self {
        self.descriptor = descriptor;
        self
    }

    /// Called once with the identified rows, after identification and before the write.
    /// Attribute edits made here are what lands in the destination.
    pub fn on_identified<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&mut IdentifiedRecords) + 'h,
    {
        self.on_identified = Some(Box::new(hook));
        self
    }

    /// Exactly one of `id` and `filter` must be set.
    pub fn selector(&self) -> Result<Selector, SyncError> {
        match (&self.id, &self.filter) {
            (Some(id), None) => Ok(Selector::Id(*id)),
            (None, Some(filter)) => Ok(Selector::Filter(filter.clone())),
            (Some(_), Some(_)) => Err(SyncError::configuration(
                "pass either an id or a filter, not both",
            )),
            (None, None) => Err(SyncError::configuration("an id or a filter is required")),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub identified: usize,
    /// Rows written per model, in write order.
    pub written: Vec<(String, usize)>,
    pub join_rows: usize,
}

impl SyncReport {
    pub fn written_for(&self, model: &str) -> usize {
        self.written
            .iter()
            .find(|(name, _)| name == model)
            .map_or(0, |(_, count)| *count)
    }
}

pub struct SyncEngine<'a> {
    environments: &'a Environments,
    schema: &'a Schema,
    source: String,
}

impl<'a> SyncEngine<'a> {
    pub fn new(environments: &'a Environments, schema: &'a Schema, source: impl Into<String>) -> Self {
        Self {
            environments,
            schema,
            source: source.into(),
        }
    }

    pub fn run(&self, mut request: SyncRequest<'_>) -> Result<SyncReport, SyncError> {
        let selector = request.selector()?;
        let plan = normalize(&request.descriptor)?;
        let root = self.schema.model(&request.model)?;

        let identified = {
            let guard = self.environments.activate(&self.source)?;
            let mut traversal = Traversal::new(self.schema, guard.store());
            traversal.identify(root, &selector, &plan)?;
            traversal.finish()
        };
        let (mut records, joins) = identified;
        info!(
            model = %root.name,
            source = %self.source,
            identified = records.len(),
            "identified records"
        );

        if let Some(hook) = request.on_identified.take() {
            hook(&mut records);
        }

        let destination = self.environments.current()?;
        let mut report = SyncReport {
            identified: records.len(),
            ..SyncReport::default()
        };
        destination.with_integrity_suspended(&mut || {
            report.written = write_records(self.schema, destination, &records)?;
            report.join_rows = write_join_rows(self.schema, destination, &joins)?;
            Ok(())
        })?;
        info!(
            destination = %self.environments.active_name(),
            models = report.written.len(),
            join_rows = report.join_rows,
            "sync complete"
        );
        Ok(report)
    }
}

/// Many-to-many pairs read during identification, per join table.
#[derive(Debug, Default)]
struct JoinCache {
    entries: Vec<JoinEdges>,
    index: AHashMap<(String, String), usize>,
}

#[derive(Debug)]
struct JoinEdges {
    join: JoinTable,
    owner_model: String,
    associated_model: String,
    rows: BTreeSet<JoinRow>,
}

impl JoinCache {
    fn record(&mut self, join: &JoinTable, owner_model: &str, associated_model: &str, rows: &[JoinRow]) {
        let key = (join.table.clone(), join.owner_key.clone());
        let idx = match self.index.get(&key) {
            Some(&idx) => idx,
            None => {
                self.entries.push(JoinEdges {
                    join: join.clone(),
                    owner_model: owner_model.to_string(),
                    associated_model: associated_model.to_string(),
                    rows: BTreeSet::new(),
                });
                self.index.insert(key, self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        self.entries[idx].rows.extend(rows.iter().copied());
    }
}

/// Relationship to follow from a set of owners, with everything nested below it.
#[derive(Debug)]
struct Step {
    relationship: String,
    tails: Vec<AssociationPath>,
    branches: Vec<BTreeMap<String, Option<Descriptor>>>,
}

impl Step {
    fn is_leaf(&self) -> bool {
        self.tails.is_empty() && self.branches.is_empty()
    }
}

/// Groups paths by relationship, standard paths ahead of polymorphic ones.
fn plan_steps(paths: &[AssociationPath]) -> Vec<Step> {
    let mut steps: Vec<Step> = Vec::new();
    let ordered = paths
        .iter()
        .filter(|path| !path.is_polymorphic())
        .chain(paths.iter().filter(|path| path.is_polymorphic()));
    for path in ordered {
        let idx = match steps.iter().position(|s| s.relationship == path.relationship) {
            Some(idx) => idx,
            None => {
                steps.push(Step {
                    relationship: path.relationship.clone(),
                    tails: Vec::new(),
                    branches: Vec::new(),
                });
                steps.len() - 1
            }
        };
        match &path.nested {
            Nested::Leaf => {}
            Nested::Then(next) => steps[idx].tails.push((**next).clone()),
            Nested::Polymorphic(branches) => steps[idx].branches.push(branches.clone()),
        }
    }
    steps
}

struct Traversal<'a> {
    schema: &'a Schema,
    store: &'a dyn Store,
    records: IdentifiedRecords,
    joins: JoinCache,
}

impl<'a> Traversal<'a> {
    fn new(schema: &'a Schema, store: &'a dyn Store) -> Self {
        Self {
            schema,
            store,
            records: IdentifiedRecords::new(),
            joins: JoinCache::default(),
        }
    }

    fn finish(self) -> (IdentifiedRecords, JoinCache) {
        (self.records, self.joins)
    }

    fn identify(
        &mut self,
        root: &ModelDef,
        selector: &Selector,
        plan: &[AssociationPath],
    ) -> Result<(), SyncError> {
        let roots = match selector {
            Selector::Id(id) => {
                let rows = self
                    .store
                    .select(root, &Filter::new().eq(root.primary_key.clone(), *id))?;
                if rows.is_empty() {
                    return Err(SyncError::not_found(format!("{} {id}", root.name)));
                }
                rows
            }
            Selector::Filter(filter) => self.store.select(root, filter)?,
        };
        debug!(model = %root.name, roots = roots.len(), "selected root rows");
        self.records.merge(roots.iter().cloned());
        self.walk(&root.name, &roots, plan)
    }

    fn walk(
        &mut self,
        model: &str,
        owners: &[Record],
        paths: &[AssociationPath],
    ) -> Result<(), SyncError> {
        if owners.is_empty() {
            return Ok(());
        }
        for step in plan_steps(paths) {
            self.follow(model, owners, &step)?;
        }
        Ok(())
    }

    fn follow(&mut self, model: &str, owners: &[Record], step: &Step) -> Result<(), SyncError> {
        let schema = self.schema;
        let relationship = schema.relationship(model, &step.relationship)?;

        if let Some(through) = &relationship.through {
            let mut tails = Vec::new();
            if step.is_leaf() {
                tails.push(AssociationPath::leaf(through.source.clone()));
            }
            for tail in &step.tails {
                tails.push(AssociationPath::then(through.source.clone(), tail.clone()));
            }
            for branches in &step.branches {
                tails.push(AssociationPath::polymorphic(
                    through.source.clone(),
                    branches.clone(),
                ));
            }
            let via = Step {
                relationship: through.via.clone(),
                tails,
                branches: Vec::new(),
            };
            return self.follow(model, owners, &via);
        }

        let owner_ids: Vec<i64> = owners.iter().map(Record::id).collect();
        let fetched = match (&relationship.kind, &relationship.target) {
            (RelationshipKind::BelongsTo { foreign_key }, Target::Model(target)) => {
                let target = schema.model(target)?;
                let ids = distinct_integers(owners, foreign_key);
                self.store
                    .select(target, &Filter::new().any_of(target.primary_key.clone(), ids))?
            }
            (
                RelationshipKind::BelongsTo { foreign_key },
                Target::Polymorphic { type_column },
            ) => {
                let mut by_type: Vec<(&str, Vec<&Record>)> = Vec::new();
                for owner in owners {
                    let Some(runtime) = owner.text(type_column).filter(|t| !t.is_empty()) else {
                        continue;
                    };
                    match by_type.iter_mut().find(|(name, _)| *name == runtime) {
                        Some((_, group)) => group.push(owner),
                        None => by_type.push((runtime, vec![owner])),
                    }
                }
                let mut rows = Vec::new();
                for (runtime, group) in by_type {
                    let target = schema.model(runtime)?;
                    let ids = distinct_integers(group.iter().copied(), foreign_key);
                    rows.extend(self.store.select(
                        target,
                        &Filter::new().any_of(target.primary_key.clone(), ids),
                    )?);
                }
                rows
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
                let target = schema.model(target)?;
                let mut filter = Filter::new().any_of(foreign_key.clone(), owner_ids);
                if let Some(type_column) = type_column {
                    filter = filter.eq(type_column.clone(), model);
                }
                let rows = self.store.select(target, &filter)?;
                if matches!(relationship.kind, RelationshipKind::HasOne { .. }) {
                    let mut seen = AHashSet::new();
                    rows.into_iter()
                        .filter(|row| seen.insert(row.integer(foreign_key)))
                        .collect()
                } else {
                    rows
                }
            }
            (RelationshipKind::HasAndBelongsToMany { join }, Target::Model(target)) => {
                let target = schema.model(target)?;
                let pairs = self.store.join_rows(join, &owner_ids)?;
                self.joins.record(join, model, &target.name, &pairs);
                let ids: BTreeSet<i64> = pairs.iter().map(|pair| pair.associated_id).collect();
                self.store
                    .select(target, &Filter::new().any_of(target.primary_key.clone(), ids))?
            }
            (_, Target::Polymorphic { .. }) => {
                return Err(SyncError::schema(format!(
                    "{model}.{} cannot be polymorphic",
                    relationship.name
                )));
            }
        };

        let added = self.records.merge(fetched.iter().cloned());
        debug!(
            from = model,
            relationship = %relationship.name,
            fetched = fetched.len(),
            added,
            "followed relationship"
        );
        if step.is_leaf() {
            return Ok(());
        }

        for (runtime, rows) in group_by_model(fetched) {
            if !step.tails.is_empty() {
                self.walk(&runtime, &rows, &step.tails)?;
            }
            for branches in &step.branches {
                let Some(Some(branch)) = branches.get(&runtime) else {
                    continue;
                };
                let nested = normalize(branch)?;
                self.walk(&runtime, &rows, &nested)?;
            }
        }
        Ok(())
    }
}

fn distinct_integers<'r, I>(records: I, column: &str) -> Vec<Value>
where
    I: IntoIterator<Item = &'r Record>,
{
    let ids: BTreeSet<i64> = records
        .into_iter()
        .filter_map(|record| record.integer(column))
        .collect();
    ids.into_iter().map(Value::from).collect()
}

fn group_by_model(records: Vec<Record>) -> Vec<(String, Vec<Record>)> {
    let mut groups: Vec<(String, Vec<Record>)> = Vec::new();
    for record in records {
        match groups.iter_mut().find(|(model, _)| model == record.model()) {
            Some((_, group)) => group.push(record),
            None => groups.push((record.model().to_string(), vec![record])),
        }
    }
    groups
}

fn write_records(
    schema: &Schema,
    destination: &dyn Store,
    records: &IdentifiedRecords,
) -> Result<Vec<(String, usize)>, SyncError> {
    let mut written = Vec::new();
    for (model, rows) in records.grouped() {
        let def = schema.model(model)?;
        let fresh: Vec<Record> = rows.iter().map(|row| row.detached(&def.columns)).collect();
        let count = destination.replace_all(def, &fresh)?;
        debug!(model, rows = count, "replaced rows");
        written.push((model.to_string(), count));
    }
    Ok(written)
}

fn write_join_rows(
    schema: &Schema,
    destination: &dyn Store,
    joins: &JoinCache,
) -> Result<usize, SyncError> {
    let mut total = 0;
    for edges in &joins.entries {
        if edges.rows.is_empty() {
            continue;
        }
        let owners: BTreeSet<i64> = edges.rows.iter().map(|row| row.owner_id).collect();
        let associated: BTreeSet<i64> = edges.rows.iter().map(|row| row.associated_id).collect();
        ensure_present(schema, destination, &edges.owner_model, &owners)?;
        ensure_present(schema, destination, &edges.associated_model, &associated)?;
        let rows: Vec<JoinRow> = edges.rows.iter().copied().collect();
        total += destination.replace_join_rows(&edges.join, &rows)?;
        debug!(table = %edges.join.table, rows = rows.len(), "replaced join rows");
    }
    Ok(total)
}

fn ensure_present(
    schema: &Schema,
    destination: &dyn Store,
    model: &str,
    ids: &BTreeSet<i64>,
) -> Result<(), SyncError> {
    let def = schema.model(model)?;
    let found: BTreeSet<i64> = destination
        .select(
            def,
            &Filter::new().any_of(def.primary_key.clone(), ids.iter().copied()),
        )?
        .iter()
        .map(Record::id)
        .collect();
    match ids.difference(&found).next() {
        Some(missing) => Err(SyncError::not_found(format!(
            "{model} {missing} is missing from the destination"
        ))),
        None => Ok(()),
    }
}
