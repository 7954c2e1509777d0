/// Query Execution Module
///
/// This module prepares statements, binds typed parameters, executes them and
/// materializes the results into owned rows.

use super::params::{ParamKey, Params};
use crate::core::{GateError, Result};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, Statement};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// A single column value read from a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// JSON rendering; blobs become arrays of bytes.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Integer(i) => JsonValue::from(*i),
            Value::Real(f) => JsonValue::from(*f),
            Value::Text(s) => JsonValue::from(s.as_str()),
            Value::Blob(b) => JsonValue::from(b.clone()),
        }
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(t) => f.write_str(t),
            Value::Blob(b) => write!(f, "<BLOB: {} bytes>", b.len()),
        }
    }
}

/// One result row: column names (shared across the result set) and values in
/// column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Row { columns, values }
    }

    /// Value of the first column called `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == name)
            .and_then(|i| self.values.get(i))
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    pub fn into_first(self) -> Option<Value> {
        self.values.into_iter().next()
    }

    /// JSON object keyed by column name.
    pub fn to_json(&self) -> JsonValue {
        let map: Map<String, JsonValue> = self
            .iter()
            .map(|(column, value)| (column.to_string(), value.to_json()))
            .collect();
        JsonValue::Object(map)
    }
}

/// The fully materialized outcome of one statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    columns: Arc<[String]>,
    rows: Vec<Row>,
    row_count: usize,
}

impl ResultSet {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Rows affected by a data-changing statement, or rows returned by a query.
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// All rows; empty when nothing matched.
    pub fn fetch_all(self) -> Vec<Row> {
        self.rows
    }

    /// The first row, if any.
    pub fn fetch(self) -> Option<Row> {
        self.rows.into_iter().next()
    }

    /// First column of the first row, if any.
    pub fn fetch_column(self) -> Option<Value> {
        self.fetch().and_then(Row::into_first)
    }
}

/// Query execution service that operates on a database connection
pub struct QueryExecutor<'a> {
    connection: &'a Connection,
}

impl<'a> QueryExecutor<'a> {
    /// Creates a new QueryExecutor for the given connection
    pub fn new(connection: &'a Connection) -> Self {
        QueryExecutor { connection }
    }

    /// Prepares `sql`, binds `params` and executes it.
    ///
    /// Positional keys bind at `index + 1`; named keys bind at their
    /// placeholder.
    ///
    /// # Errors
    ///
    /// `GateError::Statement` when the engine rejects the statement,
    /// `GateError::UnknownParameter` when a key has no placeholder and
    /// `GateError::UnboundParameter` when a placeholder has no value.
    pub fn run(&self, sql: &str, params: &Params) -> Result<ResultSet> {
        let mut stmt = self.prepare(sql)?;
        bind_params(&mut stmt, params)?;

        let columns: Arc<[String]> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>()
            .into();
        let changes_before = self.total_changes()?;

        if columns.is_empty() {
            stmt.raw_execute()?;
            let changed = self.changed_since(changes_before)?;
            trace!(changed, "Statement executed");
            return Ok(ResultSet {
                columns,
                rows: Vec::new(),
                row_count: changed,
            });
        }

        let mut rows = Vec::new();
        {
            let mut cursor = stmt.raw_query();
            while let Some(row) = cursor.next()? {
                let values = (0..columns.len())
                    .map(|i| row.get_ref(i).map(Value::from))
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows.push(Row::new(Arc::clone(&columns), values));
            }
        }

        // RETURNING clauses report changed rows rather than returned rows.
        let row_count = if stmt.readonly() {
            rows.len()
        } else {
            self.changed_since(changes_before)?
        };
        trace!(rows = rows.len(), row_count, "Query executed");

        Ok(ResultSet {
            columns,
            rows,
            row_count,
        })
    }

    /// Prepares a SQL statement for execution without running it
    ///
    /// # Errors
    ///
    /// Returns `GateError::Statement` if the SQL statement cannot be prepared.
    pub fn prepare(&self, sql: &str) -> Result<Statement<'a>> {
        Ok(self.connection.prepare(sql)?)
    }

    fn total_changes(&self) -> Result<u64> {
        let total: i64 = self
            .connection
            .prepare_cached("SELECT total_changes()")?
            .query_row([], |row| row.get(0))?;
        Ok(total.max(0) as u64)
    }

    /// Rows changed by the statement that just ran.
    ///
    /// `changes()` keeps the count of the last completed INSERT, UPDATE or
    /// DELETE, so it is only trusted when the running total moved. Trigger
    /// side effects move the total but are excluded from `changes()`.
    fn changed_since(&self, total_before: u64) -> Result<usize> {
        if self.total_changes()? == total_before {
            return Ok(0);
        }
        Ok(self.connection.changes() as usize)
    }
}

fn bind_params(stmt: &mut Statement<'_>, params: &Params) -> Result<()> {
    let mut bound = vec![false; stmt.parameter_count()];
    for (key, value) in params {
        let index = match key {
            ParamKey::Position(_) => key
                .ordinal()
                .ok_or_else(|| GateError::UnknownParameter(key.to_string()))?,
            ParamKey::Name(name) => stmt
                .parameter_index(name)?
                .ok_or_else(|| GateError::UnknownParameter(name.clone()))?,
        };
        stmt.raw_bind_parameter(index, value)?;
        if let Some(slot) = bound.get_mut(index - 1) {
            *slot = true;
        }
    }

    // SQLite would silently bind NULL to anything left over.
    if let Some(missing) = bound.iter().position(|done| !done) {
        let ordinal = missing + 1;
        let name = stmt
            .parameter_name(ordinal)
            .map_or_else(|| format!("?{}", ordinal), String::from);
        return Err(GateError::UnboundParameter(name));
    }
    Ok(())
}
