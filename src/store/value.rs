//! Scalar values exchanged with the graph store and the row shape returned by
//! read queries. Rows are loosely typed; [`FromRow`] turns them into one
//! strongly typed record per query and fails on the first mismatch.
use time::OffsetDateTime;

use crate::error::{StoreError, StoreResult};

/// Typed scalar carried by query parameters and result rows.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// SQL/graph null.
    Null,
    /// Signed 64-bit integer.
    Int(i64),
    /// 64-bit floating point.
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// Point in time, UTC.
    Timestamp(OffsetDateTime),
}

impl Value {
    /// Short type tag used in mismatch diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "string",
            Value::Timestamp(_) => "timestamp",
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<OffsetDateTime> for Value {
    fn from(value: OffsetDateTime) -> Self {
        Value::Timestamp(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Named query parameters. Names are given without the `:` sigil.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Params {
    entries: Vec<(String, Value)>,
}

impl Params {
    /// Empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter, replacing an earlier one with the same name.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| existing == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name.to_owned(), value)),
        }
        self
    }

    /// Iterates `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Whether no parameters were supplied.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One result row: column name to scalar, in projection order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    /// Builds a row from projected columns.
    pub fn new(columns: Vec<(String, Value)>) -> Self {
        Self { columns }
    }

    /// Column names in projection order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Raw value for `column`.
    pub fn get(&self, column: &str) -> StoreResult<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
            .ok_or_else(|| StoreError::MissingColumn(column.to_owned()))
    }

    /// Integer column.
    pub fn int(&self, column: &str) -> StoreResult<i64> {
        match self.get(column)? {
            Value::Int(value) => Ok(*value),
            other => Err(mismatch(column, "integer", other)),
        }
    }

    /// Nullable integer column.
    pub fn opt_int(&self, column: &str) -> StoreResult<Option<i64>> {
        match self.get(column)? {
            Value::Null => Ok(None),
            Value::Int(value) => Ok(Some(*value)),
            other => Err(mismatch(column, "integer", other)),
        }
    }

    /// Float column. Integers widen, since engines may hand back whole
    /// numbers stored in a real column as integers.
    pub fn float(&self, column: &str) -> StoreResult<f64> {
        match self.get(column)? {
            Value::Float(value) => Ok(*value),
            Value::Int(value) => Ok(*value as f64),
            other => Err(mismatch(column, "float", other)),
        }
    }

    /// Text column.
    pub fn text(&self, column: &str) -> StoreResult<&str> {
        match self.get(column)? {
            Value::Text(value) => Ok(value),
            other => Err(mismatch(column, "string", other)),
        }
    }

    /// Nullable text column.
    pub fn opt_text(&self, column: &str) -> StoreResult<Option<&str>> {
        match self.get(column)? {
            Value::Null => Ok(None),
            Value::Text(value) => Ok(Some(value)),
            other => Err(mismatch(column, "string", other)),
        }
    }

    /// Timestamp column. Engines without a native timestamp type store
    /// seconds since the Unix epoch.
    pub fn timestamp(&self, column: &str) -> StoreResult<OffsetDateTime> {
        match self.get(column)? {
            Value::Timestamp(value) => Ok(*value),
            Value::Int(secs) => OffsetDateTime::from_unix_timestamp(*secs).map_err(|_| {
                StoreError::TypeMismatch {
                    column: column.to_owned(),
                    expected: "timestamp",
                    found: "out-of-range integer",
                }
            }),
            other => Err(mismatch(column, "timestamp", other)),
        }
    }
}

fn mismatch(column: &str, expected: &'static str, found: &Value) -> StoreError {
    StoreError::TypeMismatch {
        column: column.to_owned(),
        expected,
        found: found.type_name(),
    }
}

/// Conversion from a loosely typed [`Row`] into a query's result record.
pub trait FromRow: Sized {
    /// Decodes one row, failing fast on a missing column or a type mismatch.
    fn from_row(row: &Row) -> StoreResult<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn row() -> Row {
        Row::new(vec![
            ("item_id".into(), Value::Int(7)),
            ("price".into(), Value::Int(12)),
            ("name".into(), Value::Text("Falafel".into())),
            ("description".into(), Value::Null),
            ("created_at".into(), Value::Int(1_700_000_000)),
        ])
    }

    #[test]
    fn typed_accessors_decode_matching_columns() {
        let row = row();
        assert_eq!(row.int("item_id").unwrap(), 7);
        assert_eq!(row.float("price").unwrap(), 12.0);
        assert_eq!(row.text("name").unwrap(), "Falafel");
        assert_eq!(row.opt_text("description").unwrap(), None);
        assert_eq!(
            row.timestamp("created_at").unwrap(),
            datetime!(2023-11-14 22:13:20 UTC)
        );
    }

    #[test]
    fn type_mismatch_is_reported_with_column() {
        let err = row().int("name").unwrap_err();
        match err {
            StoreError::TypeMismatch {
                column,
                expected,
                found,
            } => {
                assert_eq!(column, "name");
                assert_eq!(expected, "integer");
                assert_eq!(found, "string");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_column_fails_fast() {
        assert!(matches!(
            row().int("times"),
            Err(StoreError::MissingColumn(column)) if column == "times"
        ));
    }

    #[test]
    fn params_replace_duplicate_names() {
        let params = Params::new().with("user_id", 1i64).with("user_id", 2i64);
        let collected: Vec<_> = params.iter().collect();
        assert_eq!(collected, vec![("user_id", &Value::Int(2))]);
    }
}
