//! Dynamic row adapter for columns the typed records do not interpret.
//!
//! Skype's schema drifts between client versions, so every record keeps the
//! full source row next to its typed fields. Merges copy rows through this
//! adapter column by column.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum SqlValue {
    #[default]
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(value) => Some(*value),
            SqlValue::Real(value) => Some(*value as i64),
            SqlValue::Text(value) => value.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Raw bytes of a text or blob value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            SqlValue::Text(value) => Some(value.as_bytes()),
            SqlValue::Blob(value) => Some(value.as_slice()),
            _ => None,
        }
    }

    /// Value destined for a BLOB column: text is stored as its raw bytes.
    pub fn into_blob(self) -> SqlValue {
        match self {
            SqlValue::Text(value) if !value.is_empty() => SqlValue::Blob(value.into_bytes()),
            other => other,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Integer(value) => write!(f, "{value}"),
            SqlValue::Real(value) => write!(f, "{value}"),
            SqlValue::Text(value) => f.write_str(value),
            SqlValue::Blob(value) => write!(f, "<{} bytes>", value.len()),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Real(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(value: Vec<u8>) -> Self {
        SqlValue::Blob(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Column name to value mapping, with column names lowercased.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    values: BTreeMap<String, SqlValue>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.values.get(&column.to_lowercase())
    }

    pub fn set(&mut self, column: impl AsRef<str>, value: impl Into<SqlValue>) {
        self.values
            .insert(column.as_ref().to_lowercase(), value.into());
    }

    pub fn with(mut self, column: impl AsRef<str>, value: impl Into<SqlValue>) -> Self {
        self.set(column, value);
        self
    }

    pub fn remove(&mut self, column: &str) -> Option<SqlValue> {
        self.values.remove(&column.to_lowercase())
    }

    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(&column.to_lowercase())
    }

    pub fn i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(SqlValue::as_i64)
    }

    pub fn text(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(SqlValue::as_str)
    }

    /// Text value, or None for NULL and empty strings.
    pub fn non_empty(&self, column: &str) -> Option<&str> {
        self.text(column).filter(|value| !value.is_empty())
    }

    pub fn bytes(&self, column: &str) -> Option<&[u8]> {
        self.get(column).and_then(SqlValue::as_bytes)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copy with every listed column present, absent ones set to NULL.
    pub fn fill_missing(&self, columns: &[String]) -> Row {
        let mut filled = self.clone();
        for column in columns {
            let key = column.to_lowercase();
            filled.values.entry(key).or_insert(SqlValue::Null);
        }
        filled
    }
}

impl FromIterator<(String, SqlValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, SqlValue)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.set(column, value);
        }
        row
    }
}
