/// Query Parameters Module
///
/// Parameter keys, typed parameter values and the IN-clause helper. Binding
/// type is decided by the runtime value, never by the declared column type.

use rusqlite::types::{ToSql, ToSqlOutput};
use serde_json::Value as JsonValue;
use std::fmt;

/// Marker every named placeholder starts with.
pub const PLACEHOLDER_PREFIX: char = ':';

/// Identifies where a parameter is bound in a statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamKey {
    /// Zero-based position, bound at ordinal `index + 1`
    Position(usize),
    /// Named placeholder, always stored with the `:` prefix
    Name(String),
}

impl ParamKey {
    /// Builds a named key, prepending `:` unless already present.
    pub fn named(name: &str) -> Self {
        if name.starts_with(PLACEHOLDER_PREFIX) {
            ParamKey::Name(name.to_string())
        } else {
            ParamKey::Name(format!("{}{}", PLACEHOLDER_PREFIX, name))
        }
    }

    /// One-based bind ordinal for positional keys.
    pub fn ordinal(&self) -> Option<usize> {
        match self {
            ParamKey::Position(index) => index.checked_add(1),
            ParamKey::Name(_) => None,
        }
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamKey::Position(index) => write!(f, "#{}", index),
            ParamKey::Name(name) => f.write_str(name),
        }
    }
}

impl From<usize> for ParamKey {
    fn from(index: usize) -> Self {
        ParamKey::Position(index)
    }
}

impl From<&str> for ParamKey {
    fn from(name: &str) -> Self {
        ParamKey::named(name)
    }
}

impl From<String> for ParamKey {
    fn from(name: String) -> Self {
        ParamKey::named(&name)
    }
}

/// The SQL type a value is bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindType {
    Int,
    Bool,
    Null,
    Str,
}

/// A typed parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Bool(bool),
    Null,
    Str(String),
}

impl ParamValue {
    /// Infers a parameter from a dynamic JSON value.
    ///
    /// Precedence is integer, then boolean, then null; everything else
    /// (floats, strings, arrays, objects) binds as its string rendering.
    pub fn infer(value: &JsonValue) -> Self {
        if let Some(i) = value.as_i64() {
            return ParamValue::Int(i);
        }
        if let Some(b) = value.as_bool() {
            return ParamValue::Bool(b);
        }
        if value.is_null() {
            return ParamValue::Null;
        }
        match value {
            JsonValue::String(s) => ParamValue::Str(s.clone()),
            other => ParamValue::Str(other.to_string()),
        }
    }

    pub fn bind_type(&self) -> BindType {
        match self {
            ParamValue::Int(_) => BindType::Int,
            ParamValue::Bool(_) => BindType::Bool,
            ParamValue::Null => BindType::Null,
            ParamValue::Str(_) => BindType::Str,
        }
    }
}

impl ToSql for ParamValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            ParamValue::Int(i) => i.to_sql(),
            ParamValue::Bool(b) => b.to_sql(),
            ParamValue::Null => Ok(ToSqlOutput::Owned(rusqlite::types::Value::Null)),
            ParamValue::Str(s) => s.to_sql(),
        }
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for ParamValue {
                fn from(value: $t) -> Self {
                    ParamValue::Int(i64::from(value))
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ParamValue::Null, Into::into)
    }
}

impl From<&JsonValue> for ParamValue {
    fn from(value: &JsonValue) -> Self {
        ParamValue::infer(value)
    }
}

/// An ordered parameter set for one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    entries: Vec<(ParamKey, ParamValue)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a named parameter; `name` may omit the `:` prefix.
    pub fn named(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.insert(ParamKey::named(name), value.into());
        self
    }

    /// Adds a zero-based positional parameter.
    pub fn positional(mut self, index: usize, value: impl Into<ParamValue>) -> Self {
        self.insert(ParamKey::Position(index), value.into());
        self
    }

    /// Positional parameters `0..n` from a sequence of values.
    pub fn from_values<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ParamValue>,
    {
        values
            .into_iter()
            .enumerate()
            .fold(Params::new(), |params, (i, v)| params.positional(i, v))
    }

    /// Builds a parameter set from a JSON object (named) or array (positional).
    ///
    /// Any other JSON value yields an empty set.
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Object(map) => map
                .iter()
                .fold(Params::new(), |params, (k, v)| params.named(k, v)),
            JsonValue::Array(items) => Params::from_values(items.iter()),
            _ => Params::new(),
        }
    }

    /// Sets `key` to `value`, replacing an earlier entry with the same key.
    pub fn insert(&mut self, key: ParamKey, value: ParamValue) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &ParamKey) -> Option<&ParamValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(ParamKey, ParamValue)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends every entry of `other`, replacing duplicates.
    pub fn extend(&mut self, other: Params) {
        for (key, value) in other.entries {
            self.insert(key, value);
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<ParamKey>,
    V: Into<ParamValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.insert(k.into(), v.into());
        }
        params
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = &'a (ParamKey, ParamValue);
    type IntoIter = std::slice::Iter<'a, (ParamKey, ParamValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Placeholders and bindings for a SQL `IN (...)` fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct InClause {
    /// Comma-joined placeholders, e.g. `:in_0,:in_1`
    pub placeholders: String,
    /// Placeholder to value mapping
    pub bindings: Params,
}

impl InClause {
    /// Splices the bindings into an existing parameter set.
    pub fn merge_into(self, params: &mut Params) {
        params.extend(self.bindings);
    }
}

/// Expands `values` into uniquely numbered `:in_<i>` placeholders.
pub fn build_in_clause<I, V>(values: I) -> InClause
where
    I: IntoIterator<Item = V>,
    V: Into<ParamValue>,
{
    let mut names = Vec::new();
    let mut bindings = Params::new();
    for (i, value) in values.into_iter().enumerate() {
        let name = format!("{}in_{}", PLACEHOLDER_PREFIX, i);
        bindings.insert(ParamKey::Name(name.clone()), value.into());
        names.push(name);
    }
    InClause {
        placeholders: names.join(","),
        bindings,
    }
}
