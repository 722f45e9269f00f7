use std::{path::Path, str::Utf8Error};

use rusqlite::{
    Connection, params_from_iter,
    types::{Type, Value as SqlValue, ValueRef},
};
use serde_json::{Number, Value};

use crate::{
    config::{EnvironmentConfig, SqliteConfig},
    errors::SyncError,
    record::{Attributes, Record},
    schema::{JoinTable, ModelDef},
    store::{Condition, Filter, JoinRow, Store},
};

const IN_CHUNK: usize = 500;

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P, config: &SqliteConfig) -> Result<Self, SyncError> {
        let conn =
            Connection::open(path).map_err(|e| SyncError::connection(e.to_string()))?;
        Self::configured(conn, config)
    }

    pub fn open_in_memory() -> Result<Self, SyncError> {
        let conn =
            Connection::open_in_memory().map_err(|e| SyncError::connection(e.to_string()))?;
        Self::configured(conn, &SqliteConfig::default())
    }

    pub fn from_environment(env: &EnvironmentConfig) -> Result<Self, SyncError> {
        if env.is_memory() {
            let conn = Connection::open_in_memory()
                .map_err(|e| SyncError::connection(e.to_string()))?;
            Self::configured(conn, &env.sqlite)
        } else {
            Self::open(&env.path, &env.sqlite)
        }
    }

    /// Runs DDL or seed statements directly against the connection.
    pub fn execute_batch(&self, sql: &str) -> Result<(), SyncError> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| SyncError::query(e.to_string()))
    }

    pub fn count(&self, table: &str) -> Result<i64, SyncError> {
        self.conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
                [],
                |row| row.get(0),
            )
            .map_err(|e| SyncError::query(e.to_string()))
    }

    pub fn foreign_keys_enabled(&self) -> Result<bool, SyncError> {
        let value: i64 = self
            .conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .map_err(|e| SyncError::query(e.to_string()))?;
        Ok(value != 0)
    }

    fn configured(conn: Connection, config: &SqliteConfig) -> Result<Self, SyncError> {
        let store = Self { conn };
        store.set_foreign_keys(config.foreign_keys)?;
        if let Some(ms) = config.busy_timeout_ms {
            store
                .conn
                .busy_timeout(std::time::Duration::from_millis(ms))
                .map_err(|e| SyncError::connection(e.to_string()))?;
        }
        for (key, value) in &config.pragma_settings {
            let pragma_sql = format!("PRAGMA {key} = {value}");
            match store.conn.execute(&pragma_sql, []) {
                Ok(_) => {}
                // Some PRAGMAs echo their new value back.
                Err(rusqlite::Error::ExecuteReturnedResults) => {}
                Err(e) => {
                    return Err(SyncError::connection(format!(
                        "PRAGMA {key} = {value}: {e}"
                    )));
                }
            }
        }
        Ok(store)
    }

    fn set_foreign_keys(&self, enabled: bool) -> Result<(), SyncError> {
        let sql = if enabled {
            "PRAGMA foreign_keys = ON"
        } else {
            "PRAGMA foreign_keys = OFF"
        };
        self.conn
            .execute_batch(sql)
            .map_err(|e| SyncError::connection(e.to_string()))
    }

    fn query_records(
        &self,
        model: &ModelDef,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Vec<Record>, SyncError> {
        let mut stmt = self
            .conn
            .prepare_cached(sql)
            .map_err(|e| SyncError::query(e.to_string()))?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let pk_index = columns
            .iter()
            .position(|c| *c == model.primary_key)
            .ok_or_else(|| {
                SyncError::schema(format!(
                    "{} has no primary key column {}",
                    model.table, model.primary_key
                ))
            })?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                let mut attributes = Attributes::new();
                for (idx, column) in columns.iter().enumerate() {
                    let value = sql_to_json(row.get_ref(idx)?).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
                    })?;
                    attributes.insert(column.clone(), value);
                }
                let id: i64 = row.get(pk_index)?;
                Ok((id, attributes))
            })
            .map_err(|e| SyncError::query(e.to_string()))?;
        let mut records = Vec::new();
        for row in rows {
            let (id, attributes) = row.map_err(|e| SyncError::query(e.to_string()))?;
            records.push(Record::new(model.name.clone(), id, attributes));
        }
        Ok(records)
    }

    /// One query for the whole filter; `In` lists must already fit the bind limit.
    fn select_chunk(&self, model: &ModelDef, filter: &Filter) -> Result<Vec<Record>, SyncError> {
        let mut clauses = Vec::new();
        let mut params = Vec::new();
        for condition in filter.conditions() {
            match condition {
                Condition::Eq(column, Value::Null) => {
                    clauses.push(format!("{} IS NULL", quote_ident(column)));
                }
                Condition::Eq(column, value) => {
                    params.push(json_to_sql(value));
                    clauses.push(format!("{} = ?{}", quote_ident(column), params.len()));
                }
                Condition::In(_, values) if values.is_empty() => {
                    return Ok(Vec::new());
                }
                Condition::In(column, values) => {
                    let mut slots = Vec::with_capacity(values.len());
                    for value in values {
                        params.push(json_to_sql(value));
                        slots.push(format!("?{}", params.len()));
                    }
                    clauses.push(format!("{} IN ({})", quote_ident(column), slots.join(", ")));
                }
                Condition::Sql(clause, values) => {
                    if !values.is_empty() && !params.is_empty() {
                        return Err(SyncError::invalid_input(
                            "raw SQL parameters cannot be mixed with other conditions",
                        ));
                    }
                    params.extend(values.iter().map(json_to_sql));
                    clauses.push(format!("({clause})"));
                }
            }
        }
        let mut sql = format!("SELECT * FROM {}", quote_ident(&model.table));
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(&format!(" ORDER BY {}", quote_ident(&model.primary_key)));
        self.query_records(model, &sql, &params)
    }
}

impl Store for SqliteStore {
    fn select(&self, model: &ModelDef, filter: &Filter) -> Result<Vec<Record>, SyncError> {
        let oversized = filter
            .conditions()
            .iter()
            .enumerate()
            .find_map(|(idx, condition)| match condition {
                Condition::In(column, values) if values.len() > IN_CHUNK => {
                    Some((idx, column, values))
                }
                _ => None,
            });
        let Some((idx, column, values)) = oversized else {
            return self.select_chunk(model, filter);
        };
        let mut records = Vec::new();
        for chunk in values.chunks(IN_CHUNK) {
            let mut conditions = filter.conditions().to_vec();
            conditions[idx] = Condition::In(column.clone(), chunk.to_vec());
            records.extend(self.select(model, &Filter::from_conditions(conditions))?);
        }
        records.sort_by_key(Record::id);
        records.dedup_by_key(|record| record.id());
        Ok(records)
    }

    fn distinct_values(&self, table: &str, column: &str) -> Result<Vec<String>, SyncError> {
        let column = quote_ident(column);
        let sql = format!(
            "SELECT DISTINCT {column} FROM {} WHERE {column} IS NOT NULL AND {column} != '' \
             ORDER BY {column}",
            quote_ident(table)
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| SyncError::query(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| SyncError::query(e.to_string()))?;
        let mut values = Vec::new();
        for value in rows {
            values.push(value.map_err(|e| SyncError::query(e.to_string()))?);
        }
        Ok(values)
    }

    fn replace_all(&self, model: &ModelDef, records: &[Record]) -> Result<usize, SyncError> {
        if records.is_empty() {
            return Ok(0);
        }
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| SyncError::query(e.to_string()))?;
        let table = quote_ident(&model.table);
        let pk = quote_ident(&model.primary_key);
        let ids: Vec<i64> = records.iter().map(Record::id).collect();
        for chunk in ids.chunks(IN_CHUNK) {
            let slots = placeholders(chunk.len());
            tx.execute(
                &format!("DELETE FROM {table} WHERE {pk} IN ({slots})"),
                params_from_iter(chunk.iter()),
            )
            .map_err(|e| SyncError::query(e.to_string()))?;
        }
        for record in records {
            let mut attributes = record.attributes().clone();
            attributes
                .entry(model.primary_key.clone())
                .or_insert_with(|| Value::from(record.id()));
            let columns: Vec<String> = attributes.keys().map(|c| quote_ident(c)).collect();
            let values: Vec<SqlValue> = attributes.values().map(json_to_sql).collect();
            let sql = format!(
                "INSERT INTO {table} ({}) VALUES ({})",
                columns.join(", "),
                placeholders(values.len())
            );
            tx.execute(&sql, params_from_iter(values.iter()))
                .map_err(|e| SyncError::query(e.to_string()))?;
        }
        tx.commit().map_err(|e| SyncError::query(e.to_string()))?;
        Ok(records.len())
    }

    fn join_rows(&self, join: &JoinTable, owner_ids: &[i64]) -> Result<Vec<JoinRow>, SyncError> {
        let owner = quote_ident(&join.owner_key);
        let associated = quote_ident(&join.associated_key);
        let mut result = Vec::new();
        for chunk in owner_ids.chunks(IN_CHUNK) {
            let sql = format!(
                "SELECT {owner}, {associated} FROM {} WHERE {owner} IN ({}) \
                 ORDER BY {owner}, {associated}",
                quote_ident(&join.table),
                placeholders(chunk.len())
            );
            let mut stmt = self
                .conn
                .prepare(&sql)
                .map_err(|e| SyncError::query(e.to_string()))?;
            let rows = stmt
                .query_map(params_from_iter(chunk.iter()), |row| {
                    Ok(JoinRow {
                        owner_id: row.get(0)?,
                        associated_id: row.get(1)?,
                    })
                })
                .map_err(|e| SyncError::query(e.to_string()))?;
            for row in rows {
                result.push(row.map_err(|e| SyncError::query(e.to_string()))?);
            }
        }
        Ok(result)
    }

    fn replace_join_rows(&self, join: &JoinTable, rows: &[JoinRow]) -> Result<usize, SyncError> {
        let mut unique = rows.to_vec();
        unique.sort_unstable();
        unique.dedup();
        let table = quote_ident(&join.table);
        let owner = quote_ident(&join.owner_key);
        let associated = quote_ident(&join.associated_key);
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| SyncError::query(e.to_string()))?;
        for row in &unique {
            tx.execute(
                &format!("DELETE FROM {table} WHERE {owner} = ?1 AND {associated} = ?2"),
                [row.owner_id, row.associated_id],
            )
            .map_err(|e| SyncError::query(e.to_string()))?;
            tx.execute(
                &format!("INSERT INTO {table} ({owner}, {associated}) VALUES (?1, ?2)"),
                [row.owner_id, row.associated_id],
            )
            .map_err(|e| SyncError::query(e.to_string()))?;
        }
        tx.commit().map_err(|e| SyncError::query(e.to_string()))?;
        Ok(unique.len())
    }

    fn with_integrity_suspended(
        &self,
        work: &mut dyn FnMut() -> Result<(), SyncError>,
    ) -> Result<(), SyncError> {
        let previous = self.foreign_keys_enabled()?;
        self.set_foreign_keys(false)?;
        let outcome = work();
        let restored = self.set_foreign_keys(previous);
        outcome.and(restored)
    }
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|idx| format!("?{idx}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// TEXT that is not valid UTF-8 is an error rather than a lossy copy.
fn sql_to_json(value: ValueRef<'_>) -> Result<Value, Utf8Error> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(std::str::from_utf8(bytes)?.to_owned()),
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
    })
}

fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => match number.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(number.as_f64().unwrap_or_default()),
        },
        Value::String(text) => SqlValue::Text(text.clone()),
        Value::Array(items) => match blob_bytes(items) {
            Some(bytes) => SqlValue::Blob(bytes),
            None => SqlValue::Text(value.to_string()),
        },
        Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

fn blob_bytes(items: &[Value]) -> Option<Vec<u8>> {
    items
        .iter()
        .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
        .collect()
}
