//! Column values and rows returned by ERP queries.
//!
//! Firebird result sets are mapped column by column into [`Value`]. Callers
//! read them back through the typed getters on [`Row`], which report a
//! [`RowError`] instead of panicking when the schema drifts.

use chrono::{NaiveDate, NaiveDateTime};

/// A single SQL value, either a query parameter or a fetched column.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL `NULL`.
    Null,
    /// Any integer column (`SMALLINT`, `INTEGER`, `BIGINT`).
    Int(i64),
    /// Floating point and scaled numeric columns.
    Float(f64),
    /// Character data (`CHAR`, `VARCHAR`, text blobs).
    Text(String),
    /// `DATE` and `TIMESTAMP` columns.
    Timestamp(NaiveDateTime),
    /// `BOOLEAN` columns.
    Bool(bool),
}

impl Value {
    /// Short type name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Timestamp(_) => "timestamp",
            Self::Bool(_) => "bool",
        }
    }

    /// Whether this value is SQL `NULL`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::Timestamp(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::Timestamp(v.and_time(chrono::NaiveTime::MIN))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Errors reading a typed value out of a [`Row`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RowError {
    /// The query did not select a column with this name.
    #[error("column {0} not present in row")]
    MissingColumn(String),

    /// The column exists but holds an incompatible type.
    #[error("column {column} has type {found}, expected {expected}")]
    TypeMismatch {
        /// Column name as requested.
        column: String,
        /// Type the caller asked for.
        expected: &'static str,
        /// Type actually stored in the row.
        found: &'static str,
    },
}

/// One result row: named columns in select order.
///
/// Column lookup is case-insensitive because Firebird upper-cases unquoted
/// aliases.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    /// Build a row from `(name, value)` pairs.
    pub fn new(columns: Vec<(String, Value)>) -> Self {
        Self { columns }
    }

    /// Build a row from borrowed names, mostly for fixtures.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self {
            columns: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Look up a column value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(column, _)| column.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    /// Iterate over `(name, value)` pairs in select order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of columns in the row.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    fn require(&self, name: &str) -> Result<&Value, RowError> {
        self.get(name)
            .ok_or_else(|| RowError::MissingColumn(name.to_owned()))
    }

    /// Read a non-null integer column.
    ///
    /// # Errors
    ///
    /// Returns [`RowError`] when the column is missing, null or not an integer.
    pub fn i64(&self, name: &str) -> Result<i64, RowError> {
        self.opt_i64(name)?.ok_or_else(|| mismatch(name, "int", "null"))
    }

    /// Read a nullable integer column.
    ///
    /// # Errors
    ///
    /// Returns [`RowError`] when the column is missing or not an integer.
    pub fn opt_i64(&self, name: &str) -> Result<Option<i64>, RowError> {
        match self.require(name)? {
            Value::Null => Ok(None),
            Value::Int(v) => Ok(Some(*v)),
            Value::Text(s) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| mismatch(name, "int", "text")),
            other => Err(mismatch(name, "int", other.kind())),
        }
    }

    /// Read a nullable numeric column, widening integers.
    ///
    /// # Errors
    ///
    /// Returns [`RowError`] when the column is missing or not numeric.
    pub fn opt_f64(&self, name: &str) -> Result<Option<f64>, RowError> {
        match self.require(name)? {
            Value::Null => Ok(None),
            Value::Float(v) => Ok(Some(*v)),
            Value::Int(v) => i32::try_from(*v)
                .map(|n| Some(f64::from(n)))
                .map_err(|_| mismatch(name, "float", "int")),
            other => Err(mismatch(name, "float", other.kind())),
        }
    }

    /// Read a numeric column, treating null as zero.
    ///
    /// # Errors
    ///
    /// Returns [`RowError`] when the column is missing or not numeric.
    pub fn f64_or_zero(&self, name: &str) -> Result<f64, RowError> {
        Ok(self.opt_f64(name)?.unwrap_or(0.0))
    }

    /// Read a nullable text column with trailing `CHAR` padding removed.
    ///
    /// Integers are rendered as decimal text.
    ///
    /// # Errors
    ///
    /// Returns [`RowError`] when the column is missing or holds a
    /// non-textual value.
    pub fn opt_string(&self, name: &str) -> Result<Option<String>, RowError> {
        match self.require(name)? {
            Value::Null => Ok(None),
            Value::Text(s) => Ok(Some(s.trim_end().to_owned())),
            Value::Int(v) => Ok(Some(v.to_string())),
            other => Err(mismatch(name, "text", other.kind())),
        }
    }

    /// Read a nullable timestamp column.
    ///
    /// # Errors
    ///
    /// Returns [`RowError`] when the column is missing or not a timestamp.
    pub fn opt_timestamp(&self, name: &str) -> Result<Option<NaiveDateTime>, RowError> {
        match self.require(name)? {
            Value::Null => Ok(None),
            Value::Timestamp(ts) => Ok(Some(*ts)),
            other => Err(mismatch(name, "timestamp", other.kind())),
        }
    }

    /// Read a nullable date, accepting timestamps or `YYYY-MM-DD` text.
    ///
    /// # Errors
    ///
    /// Returns [`RowError`] when the column is missing or not date-like.
    pub fn opt_date(&self, name: &str) -> Result<Option<NaiveDate>, RowError> {
        match self.require(name)? {
            Value::Null => Ok(None),
            Value::Timestamp(ts) => Ok(Some(ts.date())),
            Value::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map(Some)
                .map_err(|_| mismatch(name, "date", "text")),
            other => Err(mismatch(name, "date", other.kind())),
        }
    }
}

fn mismatch(column: &str, expected: &'static str, found: &'static str) -> RowError {
    RowError::TypeMismatch {
        column: column.to_owned(),
        expected,
        found,
    }
}
