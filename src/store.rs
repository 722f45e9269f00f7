use serde_json::Value;

use crate::{
    errors::SyncError,
    record::Record,
    schema::{JoinTable, ModelDef},
};

#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    /// `column = value`, or `column IS NULL` for a null value.
    Eq(String, Value),
    /// `column IN (values)`; an empty list matches nothing.
    In(String, Vec<Value>),
    /// Raw SQL fragment with positional parameters.
    Sql(String, Vec<Value>),
}

/// Conjunction of conditions selecting rows of one model.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_conditions(conditions: Vec<Condition>) -> Self {
        Self { conditions }
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Eq(column.into(), value.into()));
        self
    }

    pub fn any_of<I, V>(mut self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.conditions.push(Condition::In(
            column.into(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn sql(mut self, clause: impl Into<String>, params: Vec<Value>) -> Self {
        self.conditions.push(Condition::Sql(clause.into(), params));
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JoinRow {
    pub owner_id: i64,
    pub associated_id: i64,
}

pub trait Store {
    /// Rows of `model` matching `filter`, ordered by primary key.
    fn select(&self, model: &ModelDef, filter: &Filter) -> Result<Vec<Record>, SyncError>;

    /// Distinct non-null, non-empty values of `column`, sorted.
    fn distinct_values(&self, table: &str, column: &str) -> Result<Vec<String>, SyncError>;

    /// Deletes rows sharing an identity with `records`, then inserts `records`, as one batch.
    fn replace_all(&self, model: &ModelDef, records: &[Record]) -> Result<usize, SyncError>;

    fn join_rows(&self, join: &JoinTable, owner_ids: &[i64]) -> Result<Vec<JoinRow>, SyncError>;

    /// Writes each pair exactly once, replacing any existing copies of it.
    fn replace_join_rows(&self, join: &JoinTable, rows: &[JoinRow]) -> Result<usize, SyncError>;

    /// Runs `work` with referential-integrity checks off, restoring them on every exit path.
    fn with_integrity_suspended(
        &self,
        work: &mut dyn FnMut() -> Result<(), SyncError>,
    ) -> Result<(), SyncError>;
}

impl<'a, S> Store for &'a S
where
    S: Store + ?Sized,
{
    fn select(&self, model: &ModelDef, filter: &Filter) -> Result<Vec<Record>, SyncError> {
        (*self).select(model, filter)
    }

    fn distinct_values(&self, table: &str, column: &str) -> Result<Vec<String>, SyncError> {
        (*self).distinct_values(table, column)
    }

    fn replace_all(&self, model: &ModelDef, records: &[Record]) -> Result<usize, SyncError> {
        (*self).replace_all(model, records)
    }

    fn join_rows(&self, join: &JoinTable, owner_ids: &[i64]) -> Result<Vec<JoinRow>, SyncError> {
        (*self).join_rows(join, owner_ids)
    }

    fn replace_join_rows(&self, join: &JoinTable, rows: &[JoinRow]) -> Result<usize, SyncError> {
        (*self).replace_join_rows(join, rows)
    }

    fn with_integrity_suspended(
        &self,
        work: &mut dyn FnMut() -> Result<(), SyncError>,
    ) -> Result<(), SyncError> {
        (*self).with_integrity_suspended(work)
    }
}
