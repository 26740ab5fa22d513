//! The `Warehouse` trait.
//!
//! Implemented by storage backends (e.g. `huddle-store-sqlite`). The pipeline
//! and the auditor depend on this abstraction only.

use std::future::Future;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::{change::ChangeMetadata, entity::EntityType, plan::Strategy, row::Row, table::TableId};

// ─── Errors ──────────────────────────────────────────────────────────────────

/// How the pipeline reacts to a store error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
  /// The store is unreachable; the run aborts.
  Connection,
  /// A table is missing; the schema is recreated and the table retried once.
  SchemaMissing,
  /// Anything else; the table fails and the run continues.
  Other,
}

pub trait StoreError: std::error::Error + Send + Sync + 'static {
  fn failure(&self) -> Failure;
}

// ─── Write statistics ────────────────────────────────────────────────────────

/// Row counts from applying one strategy to one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteStats {
  pub inserted: u64,
  pub updated:  u64,
  pub deleted:  u64,
  pub skipped:  u64,
}

impl std::ops::AddAssign for WriteStats {
  fn add_assign(&mut self, rhs: Self) {
    self.inserted += rhs.inserted;
    self.updated += rhs.updated;
    self.deleted += rhs.deleted;
    self.skipped += rhs.skipped;
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a warehouse backend.
///
/// All methods return `Send` futures so the pipeline can run on a
/// multi-threaded tokio runtime.
pub trait Warehouse: Send + Sync {
  type Error: StoreError;

  /// Create every warehouse table that does not exist yet. Idempotent.
  fn ensure_schema(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Change metadata ───────────────────────────────────────────────────

  /// Every persisted per-entity watermark.
  fn change_metadata(
    &self,
  ) -> impl Future<Output = Result<Vec<ChangeMetadata>, Self::Error>> + Send + '_;

  /// Record that `entity` was loaded successfully with `record_count`
  /// records at `at`.
  fn mark_processed(
    &self,
    entity: EntityType,
    record_count: u64,
    at: NaiveDateTime,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  fn row_count(&self, table: TableId) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Read `columns` of every row of `table`, in storage order.
  fn select<'a>(
    &'a self,
    table: TableId,
    columns: &'a [&'a str],
  ) -> impl Future<Output = Result<Vec<Row>, Self::Error>> + Send + 'a;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Apply `rows` to `table` under `strategy`, or REPLACE when `None`, in a
  /// single transaction.
  fn apply<'a>(
    &'a self,
    table: TableId,
    strategy: Option<&'a Strategy>,
    rows: Vec<Row>,
  ) -> impl Future<Output = Result<WriteStats, Self::Error>> + Send + 'a;
}
