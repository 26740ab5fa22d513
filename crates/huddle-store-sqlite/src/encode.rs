//! Conversions between [`Cell`]s and SQLite values, plus identifier and
//! timestamp helpers.
//!
//! Dates and timestamps are stored as ISO 8601 text. Blobs never come from
//! the loader but are read back as hex text if another writer put them there.

use chrono::NaiveDateTime;
use huddle_core::row::{Cell, Row};
use rusqlite::types::{Value, ValueRef};

use crate::{Error, Result};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

// ─── Cells ───────────────────────────────────────────────────────────────────

pub fn encode_cell(cell: &Cell) -> Value {
  match cell {
    Cell::Null => Value::Null,
    Cell::Int(v) => Value::Integer(*v),
    Cell::Real(v) => Value::Real(*v),
    Cell::Text(s) => Value::Text(s.clone()),
  }
}

pub fn decode_cell(value: ValueRef<'_>) -> Cell {
  match value {
    ValueRef::Null => Cell::Null,
    ValueRef::Integer(v) => Cell::Int(v),
    ValueRef::Real(v) => Cell::Real(v),
    ValueRef::Text(bytes) => Cell::Text(String::from_utf8_lossy(bytes).into_owned()),
    ValueRef::Blob(bytes) => Cell::Text(hex::encode(bytes)),
  }
}

/// The values of `columns` in `row`, in order. Absent columns bind NULL.
pub fn encode_columns(row: &Row, columns: &[impl AsRef<str>]) -> Vec<Value> {
  columns
    .iter()
    .map(|c| row.get(c.as_ref()).map_or(Value::Null, encode_cell))
    .collect()
}

// ─── Identifiers ─────────────────────────────────────────────────────────────

/// Quote an identifier. Table and column names only ever come from the
/// static table descriptors or validated load plans.
pub fn quote(ident: &str) -> String { format!("\"{}\"", ident.replace('"', "\"\"")) }

pub fn quote_list(idents: &[impl AsRef<str>]) -> String {
  idents
    .iter()
    .map(|i| quote(i.as_ref()))
    .collect::<Vec<_>>()
    .join(", ")
}

/// `"a" IS ?1 AND "b" IS ?2 ...`, numbering placeholders from `first`.
pub fn match_clause(columns: &[impl AsRef<str>], first: usize) -> String {
  columns
    .iter()
    .enumerate()
    .map(|(i, c)| format!("{} IS ?{}", quote(c.as_ref()), first + i))
    .collect::<Vec<_>>()
    .join(" AND ")
}

// ─── Timestamps ──────────────────────────────────────────────────────────────

pub fn encode_timestamp(at: NaiveDateTime) -> String { at.format(TIMESTAMP_FORMAT).to_string() }

pub fn decode_timestamp(s: &str) -> Result<NaiveDateTime> {
  NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).map_err(|e| Error::DateParse(e.to_string()))
}
