//! Scalar values carried by predicates, assignments and derived-query
//! arguments.

use rusqlite::types::{ToSqlOutput, Value as SqlValue};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// One scalar bound into a query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Text(String),
    Bool(bool),
}

impl Value {
    /// Absent or empty input. Optional filter criteria treat these as
    /// "no restriction".
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(text) => text.is_empty(),
            Self::Integer(_) | Self::Bool(_) => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub(crate) fn to_sql_value(&self) -> SqlValue {
        match self {
            Self::Null => SqlValue::Null,
            Self::Integer(value) => SqlValue::Integer(*value),
            Self::Text(value) => SqlValue::Text(value.clone()),
            Self::Bool(value) => SqlValue::Integer(i64::from(*value)),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "'{value}'"),
            Self::Bool(value) => write!(f, "{value}"),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Owned(self.to_sql_value()))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Positional argument passed to a derived query.
///
/// `In`/`NotIn` parts take a `List`; every other operator takes `Single`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryArg {
    Single(Value),
    List(Vec<Value>),
}

impl QueryArg {
    pub fn list<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<Value> for QueryArg {
    fn from(value: Value) -> Self {
        Self::Single(value)
    }
}

impl From<i64> for QueryArg {
    fn from(value: i64) -> Self {
        Self::Single(value.into())
    }
}

impl From<i32> for QueryArg {
    fn from(value: i32) -> Self {
        Self::Single(value.into())
    }
}

impl From<bool> for QueryArg {
    fn from(value: bool) -> Self {
        Self::Single(value.into())
    }
}

impl From<&str> for QueryArg {
    fn from(value: &str) -> Self {
        Self::Single(value.into())
    }
}

impl From<String> for QueryArg {
    fn from(value: String) -> Self {
        Self::Single(value.into())
    }
}

impl From<Vec<Value>> for QueryArg {
    fn from(value: Vec<Value>) -> Self {
        Self::List(value)
    }
}

impl From<Vec<&str>> for QueryArg {
    fn from(value: Vec<&str>) -> Self {
        Self::list(value)
    }
}

impl From<Vec<String>> for QueryArg {
    fn from(value: Vec<String>) -> Self {
        Self::list(value)
    }
}

impl From<Vec<i64>> for QueryArg {
    fn from(value: Vec<i64>) -> Self {
        Self::list(value)
    }
}
