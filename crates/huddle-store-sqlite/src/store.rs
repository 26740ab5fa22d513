//! The SQLite implementation of [`Warehouse`].

use std::{
  collections::{HashMap, HashSet},
  path::Path,
  str::FromStr,
};

use chrono::NaiveDateTime;
use rusqlite::{Connection, params_from_iter};

use huddle_core::{
  change::ChangeMetadata,
  entity::EntityType,
  plan::Strategy,
  row::{Row, key_of},
  store::{Warehouse, WriteStats},
  table::TableId,
};

use crate::{
  Error, Result,
  encode::{
    decode_cell, decode_timestamp, encode_columns, encode_timestamp, match_clause, quote,
    quote_list,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Huddle warehouse backed by a single SQLite file.
///
/// Clones share one background connection thread.
#[derive(Clone)]
pub struct SqliteWarehouse {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteWarehouse {
  /// Open (or create) a warehouse at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory warehouse.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Strategy execution ──────────────────────────────────────────────────────
//
// Each function runs inside the caller's transaction.

fn insert_rows(conn: &Connection, table: TableId, rows: &[&Row]) -> rusqlite::Result<u64> {
  if rows.is_empty() {
    return Ok(0);
  }
  let columns = table.spec().columns;
  let placeholders = (1..=columns.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
  let sql = format!(
    "INSERT INTO {} ({}) VALUES ({placeholders})",
    quote(table.name()),
    quote_list(columns)
  );
  let mut stmt = conn.prepare(&sql)?;
  for row in rows {
    stmt.execute(params_from_iter(encode_columns(row, columns)))?;
  }
  Ok(rows.len() as u64)
}

/// Every persisted key tuple over `columns`, in canonical text form.
fn existing_keys(
  conn: &Connection,
  table: TableId,
  columns: &[String],
) -> rusqlite::Result<HashSet<Vec<String>>> {
  let sql = format!("SELECT {} FROM {}", quote_list(columns), quote(table.name()));
  let mut stmt = conn.prepare(&sql)?;
  let mut rows = stmt.query([])?;
  let mut keys = HashSet::new();
  while let Some(row) = rows.next()? {
    let key = (0..columns.len())
      .map(|i| row.get_ref(i).map(|v| decode_cell(v).key_text()))
      .collect::<rusqlite::Result<Vec<_>>>()?;
    keys.insert(key);
  }
  Ok(keys)
}

/// New keys are inserted whole; existing keys have their mutable fields
/// overwritten. In-batch repeats collapse to the last occurrence.
fn upsert(
  conn: &Connection,
  table: TableId,
  primary_key: &[String],
  mutable_fields: &[String],
  rows: &[Row],
) -> rusqlite::Result<WriteStats> {
  let mut last: HashMap<Vec<String>, usize> = HashMap::new();
  for (i, row) in rows.iter().enumerate() {
    last.insert(key_of(row, primary_key), i);
  }
  let mut stats = WriteStats { skipped: (rows.len() - last.len()) as u64, ..Default::default() };

  let existing = existing_keys(conn, table, primary_key)?;
  let (mut fresh, mut known) = (Vec::new(), Vec::new());
  for (i, row) in rows.iter().enumerate() {
    let key = key_of(row, primary_key);
    if last.get(&key) != Some(&i) {
      continue;
    }
    if existing.contains(&key) {
      known.push(row);
    } else {
      fresh.push(row);
    }
  }
  stats.inserted = insert_rows(conn, table, &fresh)?;

  if mutable_fields.is_empty() || known.is_empty() {
    return Ok(stats);
  }
  // Rows whose mutable fields already match are left untouched and not
  // counted as updated.
  let assignments = mutable_fields
    .iter()
    .enumerate()
    .map(|(i, c)| format!("{} = ?{}", quote(c), i + 1))
    .collect::<Vec<_>>()
    .join(", ");
  let sql = format!(
    "UPDATE {} SET {assignments} WHERE {} AND NOT ({})",
    quote(table.name()),
    match_clause(primary_key, mutable_fields.len() + 1),
    match_clause(mutable_fields, 1),
  );
  let mut stmt = conn.prepare(&sql)?;
  for row in known {
    let mut values = encode_columns(row, mutable_fields);
    values.extend(encode_columns(row, primary_key));
    stats.updated += stmt.execute(params_from_iter(values))? as u64;
  }
  Ok(stats)
}

/// Delete every persisted row in a period present in the batch, then insert
/// the batch.
fn incremental_append(
  conn: &Connection,
  table: TableId,
  period_fields: &[String],
  rows: &[Row],
) -> rusqlite::Result<WriteStats> {
  let mut seen = HashSet::new();
  let periods: Vec<_> = rows
    .iter()
    .filter(|row| seen.insert(key_of(row, period_fields)))
    .map(|row| encode_columns(row, period_fields))
    .collect();

  let mut stats = WriteStats::default();
  let sql = format!("DELETE FROM {} WHERE {}", quote(table.name()), match_clause(period_fields, 1));
  let mut stmt = conn.prepare(&sql)?;
  for period in periods {
    stats.deleted += stmt.execute(params_from_iter(period))? as u64;
  }
  stats.inserted = insert_rows(conn, table, &rows.iter().collect::<Vec<_>>())?;
  Ok(stats)
}

/// Insert keys not yet persisted. Persisted and repeated keys are skipped;
/// the first occurrence in the batch wins.
fn append_only(
  conn: &Connection,
  table: TableId,
  primary_key: &[String],
  rows: &[Row],
) -> rusqlite::Result<WriteStats> {
  let mut keys = existing_keys(conn, table, primary_key)?;
  let mut stats = WriteStats::default();
  let mut fresh = Vec::new();
  for row in rows {
    if keys.insert(key_of(row, primary_key)) {
      fresh.push(row);
    } else {
      stats.skipped += 1;
    }
  }
  stats.inserted = insert_rows(conn, table, &fresh)?;
  Ok(stats)
}

fn replace(conn: &Connection, table: TableId, rows: &[Row]) -> rusqlite::Result<WriteStats> {
  let deleted = conn.execute(&format!("DELETE FROM {}", quote(table.name())), [])?;
  Ok(WriteStats {
    inserted: insert_rows(conn, table, &rows.iter().collect::<Vec<_>>())?,
    deleted: deleted as u64,
    ..Default::default()
  })
}

// ─── Warehouse impl ──────────────────────────────────────────────────────────

impl Warehouse for SqliteWarehouse {
  type Error = Error;

  async fn ensure_schema(&self) -> Result<()> { self.init_schema().await }

  // ── Change metadata ───────────────────────────────────────────────────────

  async fn change_metadata(&self) -> Result<Vec<ChangeMetadata>> {
    let raws: Vec<(String, String, i64)> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT entity_type, last_processed_at, record_count FROM load_metadata
           ORDER BY entity_type",
        )?;
        let rows = stmt
          .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|(entity, at, count)| {
        Ok(ChangeMetadata {
          entity_type:       EntityType::from_str(&entity)
            .map_err(|_| Error::UnknownEntityType(entity.clone()))?,
          last_processed_at: decode_timestamp(&at)?,
          record_count:      count.max(0) as u64,
        })
      })
      .collect()
  }

  async fn mark_processed(
    &self,
    entity: EntityType,
    record_count: u64,
    at: NaiveDateTime,
  ) -> Result<()> {
    let entity_str = entity.to_string();
    let at_str = encode_timestamp(at);
    let count = record_count as i64;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO load_metadata (entity_type, last_processed_at, record_count)
           VALUES (?1, ?2, ?3)
           ON CONFLICT (entity_type) DO UPDATE SET
             last_processed_at = excluded.last_processed_at,
             record_count      = excluded.record_count",
          rusqlite::params![entity_str, at_str, count],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn row_count(&self, table: TableId) -> Result<u64> {
    let sql = format!("SELECT COUNT(*) FROM {}", quote(table.name()));
    let count: i64 = self
      .conn
      .call(move |conn| Ok(conn.query_row(&sql, [], |row| row.get(0))?))
      .await?;
    Ok(count.max(0) as u64)
  }

  async fn select(&self, table: TableId, columns: &[&str]) -> Result<Vec<Row>> {
    let spec = table.spec();
    if let Some(column) = columns.iter().find(|c| !spec.has_column(c)) {
      return Err(Error::UnknownColumn { table: table.name(), column: (*column).to_owned() });
    }
    let names: Vec<String> = columns.iter().map(|c| (*c).to_owned()).collect();
    let sql = format!("SELECT {} FROM {} ORDER BY rowid", quote_list(&names), quote(table.name()));

    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map([], |row| {
            names
              .iter()
              .enumerate()
              .map(|(i, name)| Ok((name.clone(), decode_cell(row.get_ref(i)?))))
              .collect::<rusqlite::Result<Row>>()
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(rows)
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn apply(&self, table: TableId, strategy: Option<&Strategy>, rows: Vec<Row>) -> Result<WriteStats> {
    if let Some(strategy) = strategy {
      strategy.validate(table)?;
    }
    let strategy = strategy.cloned();

    let stats = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let stats = match &strategy {
          Some(Strategy::Upsert { primary_key, mutable_fields }) => {
            upsert(&tx, table, primary_key, mutable_fields, &rows)?
          }
          Some(Strategy::IncrementalAppend { period_fields }) => {
            incremental_append(&tx, table, period_fields, &rows)?
          }
          Some(Strategy::AppendOnly { primary_key }) => append_only(&tx, table, primary_key, &rows)?,
          None => replace(&tx, table, &rows)?,
        };
        tx.commit()?;
        Ok(stats)
      })
      .await?;
    Ok(stats)
  }
}
