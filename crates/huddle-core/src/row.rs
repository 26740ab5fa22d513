//! Backend-neutral row values.
//!
//! Dimension and fact records are lowered into [`Row`]s before they reach a
//! [`Warehouse`](crate::store::Warehouse). Booleans are stored as integers and
//! dates as ISO 8601 text, which every relational backend understands.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
  Null,
  Int(i64),
  Real(f64),
  Text(String),
}

impl Cell {
  pub fn is_null(&self) -> bool { matches!(self, Self::Null) }

  pub fn as_i64(&self) -> Option<i64> {
    match self {
      Self::Int(v) => Some(*v),
      Self::Real(v) if v.fract() == 0.0 => Some(*v as i64),
      Self::Text(s) => s.parse().ok(),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Self::Text(s) => Some(s),
      _ => None,
    }
  }

  /// Canonical text used to compare keys across the batch/store boundary.
  /// Integral reals collapse onto their integer form so `1.0` and `1` match.
  pub fn key_text(&self) -> String {
    match self {
      Self::Null => String::new(),
      Self::Int(v) => v.to_string(),
      Self::Real(v) if v.fract() == 0.0 && v.abs() < 1e15 => (*v as i64).to_string(),
      Self::Real(v) => v.to_string(),
      Self::Text(s) => s.clone(),
    }
  }

  /// Lower an arbitrary JSON value. Nested structures are kept as JSON text.
  pub fn from_json(value: &serde_json::Value) -> Self {
    use serde_json::Value;
    match value {
      Value::Null => Self::Null,
      Value::Bool(b) => Self::from(*b),
      Value::Number(n) => match n.as_i64() {
        Some(i) => Self::Int(i),
        None => n.as_f64().map_or(Self::Null, Self::Real),
      },
      Value::String(s) => Self::Text(s.clone()),
      other => Self::Text(other.to_string()),
    }
  }
}

impl Serialize for Cell {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    match self {
      Self::Null => serializer.serialize_none(),
      Self::Int(v) => serializer.serialize_i64(*v),
      Self::Real(v) => serializer.serialize_f64(*v),
      Self::Text(s) => serializer.serialize_str(s),
    }
  }
}

// ─── Conversions ─────────────────────────────────────────────────────────────

impl From<i64> for Cell {
  fn from(v: i64) -> Self { Self::Int(v) }
}

impl From<i32> for Cell {
  fn from(v: i32) -> Self { Self::Int(v.into()) }
}

impl From<u32> for Cell {
  fn from(v: u32) -> Self { Self::Int(v.into()) }
}

impl From<f64> for Cell {
  fn from(v: f64) -> Self { Self::Real(v) }
}

impl From<bool> for Cell {
  fn from(v: bool) -> Self { Self::Int(i64::from(v)) }
}

impl From<String> for Cell {
  fn from(v: String) -> Self { Self::Text(v) }
}

impl From<&str> for Cell {
  fn from(v: &str) -> Self { Self::Text(v.to_owned()) }
}

impl From<NaiveDate> for Cell {
  fn from(v: NaiveDate) -> Self { Self::Text(v.format("%Y-%m-%d").to_string()) }
}

impl From<NaiveDateTime> for Cell {
  fn from(v: NaiveDateTime) -> Self {
    Self::Text(v.format("%Y-%m-%dT%H:%M:%S").to_string())
  }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
  fn from(v: Option<T>) -> Self { v.map_or(Self::Null, Into::into) }
}

// ─── Row ─────────────────────────────────────────────────────────────────────

/// Column name → value. Ordered so that fingerprints and debug output are
/// deterministic.
pub type Row = BTreeMap<String, Cell>;

/// Lowers a typed record into a [`Row`].
pub trait IntoRow {
  fn into_row(self) -> Row;
}

/// Build a [`Row`] from `"column" => value` pairs.
#[macro_export]
macro_rules! row {
  ($($column:literal => $value:expr),* $(,)?) => {{
    let mut row = $crate::row::Row::new();
    $( row.insert($column.to_owned(), $crate::row::Cell::from($value)); )*
    row
  }};
}

/// The key tuple of `row` over `columns`, in canonical text form.
pub fn key_of(row: &Row, columns: &[impl AsRef<str>]) -> Vec<String> {
  columns
    .iter()
    .map(|c| row.get(c.as_ref()).map(Cell::key_text).unwrap_or_default())
    .collect()
}

/// Lower a JSON object into a row.
pub fn row_from_json(object: &serde_json::Map<String, serde_json::Value>) -> Row {
  object.iter().map(|(k, v)| (k.clone(), Cell::from_json(v))).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn integral_reals_share_key_text_with_ints() {
    assert_eq!(Cell::Real(3.0).key_text(), Cell::Int(3).key_text());
    assert_ne!(Cell::Real(3.5).key_text(), Cell::Int(3).key_text());
    assert_eq!(Cell::Null.key_text(), "");
  }

  #[test]
  fn json_values_lower_to_cells() {
    let value = serde_json::json!({
      "a": 1, "b": 1.5, "c": true, "d": null, "e": "x", "f": [1, 2]
    });
    let row = row_from_json(value.as_object().unwrap());
    assert_eq!(row["a"], Cell::Int(1));
    assert_eq!(row["b"], Cell::Real(1.5));
    assert_eq!(row["c"], Cell::Int(1));
    assert_eq!(row["d"], Cell::Null);
    assert_eq!(row["e"], Cell::Text("x".into()));
    assert_eq!(row["f"], Cell::Text("[1,2]".into()));
  }

  #[test]
  fn key_of_reads_missing_columns_as_empty() {
    let r = crate::row! { "a" => 7i64 };
    assert_eq!(key_of(&r, &["a", "b"]), vec!["7".to_owned(), String::new()]);
  }
}
