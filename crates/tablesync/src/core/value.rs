//! Column values and rows moved between endpoints.
//!
//! Rows are produced lazily by cursors and consumed by batch writers; a row
//! never outlives the page it was fetched in unless a caller keeps it.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single column value.
///
/// Equality and hashing are structural so that values can be used as diff
/// keys. Floats compare by bit pattern, which keeps `Eq` and `Hash` lawful.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL. Two NULLs are equal when used as keys.
    Null,

    /// Integral NUMBER that fits in 64 bits.
    Int(i64),

    /// BINARY_FLOAT / BINARY_DOUBLE. Serialized as its bit pattern so NaN
    /// and infinities survive a round trip.
    #[serde(with = "float_bits")]
    Float(f64),

    /// NUMBER with a fractional part or beyond i64 range.
    Decimal(Decimal),

    /// Character data (VARCHAR2, CHAR, CLOB, ...).
    Text(String),

    /// Binary data (RAW, BLOB).
    Bytes(Vec<u8>),

    /// DATE and TIMESTAMP without zone.
    DateTime(NaiveDateTime),

    /// TIMESTAMP WITH TIME ZONE.
    DateTimeTz(DateTime<FixedOffset>),
}

impl Value {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

mod float_bits {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.to_bits())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        u64::deserialize(deserializer).map(f64::from_bits)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::DateTimeTz(a), Value::DateTimeTz(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Int(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::Decimal(v) => v.hash(state),
            Value::Text(v) => v.hash(state),
            Value::Bytes(v) => v.hash(state),
            Value::DateTime(v) => v.hash(state),
            Value::DateTimeTz(v) => v.hash(state),
        }
    }
}

/// Native textual form, as written to backup files.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Decimal(v) => write!(f, "{}", v),
            Value::Text(v) => f.write_str(v),
            Value::Bytes(v) => {
                for byte in v {
                    write!(f, "{:02X}", byte)?;
                }
                Ok(())
            }
            Value::DateTime(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S")),
            Value::DateTimeTz(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%:z")),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// One fetched record: values in cursor order, keyed by upper-cased column name.
///
/// The column list is shared by every row of a cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    /// Create a row. `columns` must already be upper-cased.
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Column names in cursor order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values in cursor order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consume the row, returning its values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Look up a value by column name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .map(|i| &self.values[i])
    }

    /// Values for `names`, in that order.
    ///
    /// Returns the first missing column name on failure.
    pub fn project(&self, names: &[String]) -> std::result::Result<Vec<Value>, String> {
        names
            .iter()
            .map(|n| self.get(n).cloned().ok_or_else(|| n.clone()))
            .collect()
    }
}

/// Shared, upper-cased column header for a cursor.
pub fn column_header<I, S>(names: I) -> Arc<[String]>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|n| n.as_ref().to_uppercase())
        .collect::<Vec<_>>()
        .into()
}
