//! The outcome of one load run.

use chrono::NaiveDateTime;
use serde::Serialize;
use uuid::Uuid;

use crate::{entity::EntityType, store::WriteStats, table::TableId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
  Succeeded,
  Unchanged,
  Failed,
  Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityOutcome {
  pub entity_type:  EntityType,
  pub status:       EntityStatus,
  pub record_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableOutcome {
  pub table:    TableId,
  /// `upsert`, `incremental_append`, `append_only` or `replace`.
  pub strategy: &'static str,
  #[serde(flatten)]
  pub stats:    WriteStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadError {
  pub table:   Option<TableId>,
  pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadReport {
  pub run_id:               Uuid,
  pub started_at:           NaiveDateTime,
  pub finished_at:          Option<NaiveDateTime>,
  pub first_run:            bool,
  pub tables_processed:     u64,
  pub records_inserted:     u64,
  pub records_updated:      u64,
  pub records_deleted:      u64,
  pub records_skipped:      u64,
  /// Records dropped because a dimension key could not be resolved.
  pub skipped_unresolved:   u64,
  /// Records dropped because a timestamp could not be parsed.
  pub skipped_unparsable:   u64,
  /// Records of leagues outside the leagues of record, dropped before change
  /// detection.
  pub skipped_out_of_scope: u64,
  pub entities:             Vec<EntityOutcome>,
  pub tables:               Vec<TableOutcome>,
  pub errors:               Vec<LoadError>,
  pub cancelled:            bool,
}

impl LoadReport {
  pub fn new(started_at: NaiveDateTime) -> Self {
    Self {
      run_id: Uuid::new_v4(),
      started_at,
      finished_at: None,
      first_run: false,
      tables_processed: 0,
      records_inserted: 0,
      records_updated: 0,
      records_deleted: 0,
      records_skipped: 0,
      skipped_unresolved: 0,
      skipped_unparsable: 0,
      skipped_out_of_scope: 0,
      entities: Vec::new(),
      tables: Vec::new(),
      errors: Vec::new(),
      cancelled: false,
    }
  }

  pub fn record_table(&mut self, table: TableId, strategy: &'static str, stats: WriteStats) {
    self.tables_processed += 1;
    self.records_inserted += stats.inserted;
    self.records_updated += stats.updated;
    self.records_deleted += stats.deleted;
    self.records_skipped += stats.skipped;
    self.tables.push(TableOutcome { table, strategy, stats });
  }

  pub fn record_error(&mut self, table: Option<TableId>, message: impl Into<String>) {
    self.errors.push(LoadError { table, message: message.into() });
  }

  pub fn table(&self, table: TableId) -> Option<&TableOutcome> {
    self.tables.iter().find(|t| t.table == table)
  }

  pub fn entity(&self, entity: EntityType) -> Option<&EntityOutcome> {
    self.entities.iter().find(|e| e.entity_type == entity)
  }

  pub fn is_success(&self) -> bool { self.errors.is_empty() && !self.cancelled }
}
