//! Load and audit entry points, generic over any [`Warehouse`].
//!
//! A load run is sequential: change detection, dimension resolution in
//! dependency order, one bulk read of every dimension key into a
//! [`KeyCache`], then fact transformation and loading. Each table is written
//! in its own store transaction, so a failure at one table leaves the tables
//! before it committed. The cancellation token is checked between tables.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDateTime, Utc};
use strum::IntoEnumIterator;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
  audit::{AuditReport, Severity, audit_rows, batch_rule, store_rule},
  cache::{KeyCache, key_columns},
  change::{ChangeMetadata, ChangeSet, detect_changes},
  dimension::{self, LeagueSeasons, SeasonCalendar},
  entity::EntityType,
  plan::{LoadPlans, Strategy},
  record::{Batch, OperationalRecord},
  report::{EntityOutcome, EntityStatus, LoadReport},
  row::{IntoRow, Row},
  rules::BusinessRules,
  store::{Failure, StoreError, Warehouse},
  table::TableId,
  transform::Context,
};

/// Dimensions in resolution order.
pub const DIMENSIONS: [TableId; 5] = [
  TableId::DimSeason,
  TableId::DimWeek,
  TableId::DimPlayer,
  TableId::DimLeague,
  TableId::DimTeam,
];

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum PipelineError<E: StoreError> {
  /// The store could not be reached; nothing further was attempted.
  #[error("warehouse unavailable: {0}")]
  Connection(#[source] E),

  #[error("warehouse error: {0}")]
  Store(#[source] E),

  #[error(transparent)]
  Core(#[from] crate::Error),
}

impl<E: StoreError> PipelineError<E> {
  fn from_store(error: E) -> Self {
    match error.failure() {
      Failure::Connection => Self::Connection(error),
      _ => Self::Store(error),
    }
  }
}

// ─── Options ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
  /// Treat every entity type in the batch as dirty.
  pub force_full: bool,
  pub rules:      BusinessRules,
  pub cancel:     CancellationToken,
  /// Clock for `valid_from`, `loaded_at` and the current-season/week flags.
  /// Defaults to now.
  pub as_of:      Option<NaiveDateTime>,
}

// ─── Store helpers ───────────────────────────────────────────────────────────

/// Await `$op`; if the store reports a missing table, recreate the schema
/// and await `$op` once more.
macro_rules! with_schema_retry {
  ($store:expr, $label:expr, $op:expr) => {
    match $op.await {
      Err(e) if e.failure() == Failure::SchemaMissing => {
        tracing::warn!(target_name = $label, error = %e, "schema missing, recreating");
        match $store.ensure_schema().await {
          Ok(()) => $op.await,
          Err(e) => Err(e),
        }
      }
      other => other,
    }
  };
}

async fn read_metadata<W: Warehouse>(
  store: &W,
) -> Result<Option<Vec<ChangeMetadata>>, PipelineError<W::Error>> {
  match store.change_metadata().await {
    Ok(metadata) => Ok(Some(metadata)),
    Err(e) if e.failure() == Failure::Connection => Err(PipelineError::Connection(e)),
    Err(e) => {
      tracing::warn!(error = %e, "change metadata unavailable, treating as first run");
      Ok(None)
    }
  }
}

// ─── Load ────────────────────────────────────────────────────────────────────

struct Run<'a, W: Warehouse> {
  store:     &'a W,
  plans:     &'a LoadPlans,
  options:   &'a LoadOptions,
  now:       NaiveDateTime,
  report:    LoadReport,
  succeeded: BTreeSet<TableId>,
  failed:    BTreeSet<TableId>,
}

impl<W: Warehouse> Run<'_, W> {
  fn cancelled(&mut self) -> bool {
    if !self.report.cancelled && self.options.cancel.is_cancelled() {
      tracing::warn!("load cancelled");
      self.report.cancelled = true;
    }
    self.report.cancelled
  }

  /// Record a store failure. Connection failures abort the run.
  fn fail(&mut self, table: Option<TableId>, error: W::Error) -> Result<(), PipelineError<W::Error>> {
    if error.failure() == Failure::Connection {
      return Err(PipelineError::Connection(error));
    }
    tracing::error!(table = table.map(TableId::name), %error, "table failed");
    self.report.record_error(table, error.to_string());
    if let Some(table) = table {
      self.failed.insert(table);
    }
    Ok(())
  }

  async fn write(&mut self, table: TableId, rows: Vec<Row>) -> Result<(), PipelineError<W::Error>> {
    let (store, plans) = (self.store, self.plans);
    let strategy = plans.get(table);
    let name = strategy.map_or("replace", Strategy::name);
    match with_schema_retry!(store, table.name(), store.apply(table, strategy, rows.clone())) {
      Ok(stats) => {
        tracing::info!(
          table = %table,
          strategy = name,
          inserted = stats.inserted,
          updated = stats.updated,
          deleted = stats.deleted,
          skipped = stats.skipped,
          "table loaded"
        );
        self.report.record_table(table, name, stats);
        self.succeeded.insert(table);
        Ok(())
      }
      Err(e) => self.fail(Some(table), e),
    }
  }

  /// Read the surrogate keys of `tables`. `None` when a read failed; the
  /// failure is already recorded.
  async fn read_keys(
    &mut self,
    tables: &[TableId],
  ) -> Result<Option<KeyCache>, PipelineError<W::Error>> {
    let store = self.store;
    let mut cache = KeyCache::new();
    for &table in tables {
      match with_schema_retry!(store, table.name(), store.select(table, key_columns(table))) {
        Ok(rows) => cache.absorb(table, &rows),
        Err(e) => {
          self.fail(None, e)?;
          return Ok(None);
        }
      }
    }
    Ok(Some(cache))
  }

  /// Season calendars already persisted. `None` when the read failed; the
  /// failure is already recorded.
  async fn read_calendars(
    &mut self,
  ) -> Result<Option<BTreeMap<i32, SeasonCalendar>>, PipelineError<W::Error>> {
    let store = self.store;
    let table = TableId::DimSeason;
    let columns = dimension::CALENDAR_COLUMNS;
    match with_schema_retry!(store, table.name(), store.select(table, columns)) {
      Ok(rows) => Ok(Some(dimension::persisted_calendars(&rows))),
      Err(e) => {
        self.fail(None, e)?;
        Ok(None)
      }
    }
  }

  async fn resolve_dimensions(
    &mut self,
    batch: &Batch,
    needed: &BTreeSet<TableId>,
  ) -> Result<(), PipelineError<W::Error>> {
    let (options, now) = (self.options, self.now);
    let rules = &options.rules;

    // Season and week rows are merged with the persisted calendars; when
    // those cannot be read neither table is written.
    let mut calendars = None;
    if needed.contains(&TableId::DimSeason) || needed.contains(&TableId::DimWeek) {
      let leagues = self.read_keys(&[TableId::DimLeague]).await?;
      let persisted = self.read_calendars().await?;
      if let (Some(leagues), Some(mut known)) = (leagues, persisted) {
        let seasons = LeagueSeasons::new(batch, &leagues);
        let touched = dimension::season_calendars(batch, &seasons, &known, rules);
        known.extend(touched.iter().map(|(season, calendar)| (*season, *calendar)));
        calendars = Some((seasons, touched, known));
      }
    }

    for table in DIMENSIONS.into_iter().filter(|t| needed.contains(t)) {
      if self.cancelled() {
        break;
      }
      let rows: Vec<Row> = match table {
        TableId::DimSeason | TableId::DimWeek => {
          let Some((seasons, touched, known)) = &calendars else {
            self.failed.insert(table);
            continue;
          };
          if table == TableId::DimSeason {
            lower(dimension::build_seasons(touched, rules, now))
          } else {
            lower(dimension::build_weeks(batch, seasons, known, rules, now))
          }
        }
        TableId::DimPlayer => lower(dimension::build_players(batch, now)),
        TableId::DimLeague => lower(dimension::build_leagues(batch, now)),
        TableId::DimTeam => {
          let Some(leagues) = self.read_keys(&[TableId::DimLeague]).await? else {
            self.failed.insert(table);
            continue;
          };
          let (teams, skipped) = dimension::build_teams(batch, &leagues, now);
          if skipped > 0 {
            tracing::warn!(skipped, "teams reference leagues with no key");
            self.report.skipped_unresolved += skipped as u64;
          }
          lower(teams)
        }
        _ => continue,
      };
      self.write(table, rows).await?;
    }
    Ok(())
  }

  async fn load_facts(
    &mut self,
    batch: &Batch,
    dirty: &BTreeSet<EntityType>,
  ) -> Result<(), PipelineError<W::Error>> {
    let options = self.options;
    let fact_types: Vec<EntityType> =
      dirty.iter().copied().filter(|e| !e.primary_table().is_dimension()).collect();
    if fact_types.is_empty() || self.cancelled() {
      return Ok(());
    }

    let Some(cache) = self.read_keys(&DIMENSIONS).await? else {
      for entity in fact_types {
        self.failed.insert(entity.primary_table());
      }
      return Ok(());
    };
    tracing::debug!(keys = cache.len(), "key cache loaded");

    let cx = Context { cache: &cache, rules: &options.rules, loaded_at: self.now };
    for entity in fact_types {
      for (table, output) in cx.facts(batch, entity) {
        if self.cancelled() {
          return Ok(());
        }
        if output.skipped() > 0 {
          tracing::warn!(
            entity = %entity,
            table = %table,
            unresolved = output.skipped_unresolved,
            unparsable = output.skipped_unparsable,
            "records skipped"
          );
        }
        self.report.skipped_unresolved += output.skipped_unresolved;
        self.report.skipped_unparsable += output.skipped_unparsable;
        self.write(table, output.rows).await?;
      }
    }
    Ok(())
  }

  fn status_of(&self, entity: EntityType, changes: &ChangeSet) -> EntityStatus {
    if !changes.is_dirty(entity) {
      return EntityStatus::Unchanged;
    }
    let targets = entity.target_tables();
    if targets.iter().any(|t| self.failed.contains(t)) {
      return EntityStatus::Failed;
    }
    if !targets.iter().all(|t| self.succeeded.contains(t)) {
      return if self.report.cancelled { EntityStatus::Cancelled } else { EntityStatus::Failed };
    }
    // Facts loaded against a failed dimension may have lost records.
    let dimension_failed = self.failed.iter().any(|t| t.is_dimension());
    if !entity.primary_table().is_dimension() && dimension_failed {
      return EntityStatus::Failed;
    }
    EntityStatus::Succeeded
  }

  async fn settle(&mut self, changes: &ChangeSet) -> Result<(), PipelineError<W::Error>> {
    let store = self.store;
    for (&entity, &record_count) in &changes.counts {
      let mut status = self.status_of(entity, changes);
      if status == EntityStatus::Succeeded {
        let marked = with_schema_retry!(
          store,
          "load_metadata",
          store.mark_processed(entity, record_count, self.now)
        );
        if let Err(e) = marked {
          self.fail(None, e)?;
          status = EntityStatus::Failed;
        }
      }
      self.report.entities.push(EntityOutcome { entity_type: entity, status, record_count });
    }
    Ok(())
  }
}

fn lower<T: IntoRow>(records: Vec<T>) -> Vec<Row> {
  records.into_iter().map(IntoRow::into_row).collect()
}

/// Load `batch` into `store` incrementally.
///
/// Per-table failures are recorded in the report and the run continues; only
/// an unreachable store or an invalid plan/rule set returns `Err`.
pub async fn run_incremental_load<W: Warehouse>(
  batch: &Batch,
  store: &W,
  plans: &LoadPlans,
  options: &LoadOptions,
) -> Result<LoadReport, PipelineError<W::Error>> {
  plans.validate()?;
  options.rules.validate()?;

  let (batch, out_of_scope) = batch.scoped(&options.rules.leagues);
  let now = options.as_of.unwrap_or_else(|| Utc::now().naive_utc());
  let mut run = Run {
    store,
    plans,
    options,
    now,
    report: LoadReport::new(now),
    succeeded: BTreeSet::new(),
    failed: BTreeSet::new(),
  };
  tracing::info!(run_id = %run.report.run_id, force_full = options.force_full, "load started");
  if out_of_scope > 0 {
    tracing::info!(records = out_of_scope, "records outside the leagues of record dropped");
  }
  run.report.skipped_out_of_scope = out_of_scope;

  let previous = read_metadata(store).await?;
  let changes = detect_changes(batch.counts(), previous.as_deref(), options.force_full);
  run.report.first_run = changes.first_run;
  tracing::info!(
    first_run = changes.first_run,
    dirty = ?changes.dirty,
    unchanged = ?changes.unchanged().collect::<Vec<_>>(),
    "changes detected"
  );

  let needed: BTreeSet<TableId> = changes
    .dirty
    .iter()
    .flat_map(|entity| entity.target_tables())
    .copied()
    .collect();

  run.resolve_dimensions(&batch, &needed).await?;
  run.load_facts(&batch, &changes.dirty).await?;
  run.settle(&changes).await?;

  let mut report = run.report;
  report.finished_at = Some(Utc::now().naive_utc());
  tracing::info!(
    run_id = %report.run_id,
    tables = report.tables_processed,
    inserted = report.records_inserted,
    updated = report.records_updated,
    deleted = report.records_deleted,
    skipped = report.records_skipped,
    errors = report.errors.len(),
    cancelled = report.cancelled,
    "load finished"
  );
  Ok(report)
}

// ─── Status & audit ──────────────────────────────────────────────────────────

/// Change detection without a batch: each entity type is represented by the
/// row count of its primary warehouse table.
pub async fn detect_store_changes<W: Warehouse>(
  store: &W,
) -> Result<ChangeSet, PipelineError<W::Error>> {
  let mut counts = BTreeMap::new();
  for entity in EntityType::iter() {
    match store.row_count(entity.primary_table()).await {
      Ok(count) => {
        counts.insert(entity, count);
      }
      Err(e) if e.failure() == Failure::SchemaMissing => {}
      Err(e) => return Err(PipelineError::from_store(e)),
    }
  }
  let previous = read_metadata(store).await?;
  Ok(detect_changes(counts, previous.as_deref(), false))
}

/// Audit a staged batch before loading. Findings are `High`.
pub fn audit_batch(batch: &Batch) -> crate::Result<AuditReport> {
  let mut report = AuditReport::default();
  for entity in batch.counts().into_keys() {
    let rows = batch
      .records(entity)
      .iter()
      .map(OperationalRecord::to_row)
      .collect::<crate::Result<Vec<_>>>()?;
    report.push(rows.len(), audit_rows(&batch_rule(entity), &rows, Severity::High));
  }
  Ok(report)
}

/// Audit every persisted warehouse table. Findings are `Critical`. Missing
/// tables are skipped.
pub async fn audit_store<W: Warehouse>(store: &W) -> Result<AuditReport, PipelineError<W::Error>> {
  let mut report = AuditReport::default();
  for table in TableId::iter() {
    let columns = table.spec().all_columns();
    let rows = match store.select(table, &columns).await {
      Ok(rows) => rows,
      Err(e) if e.failure() == Failure::SchemaMissing => {
        tracing::warn!(table = %table, "table missing, not audited");
        continue;
      }
      Err(e) => return Err(PipelineError::from_store(e)),
    };
    report.push(rows.len(), audit_rows(&store_rule(table), &rows, Severity::Critical));
  }
  Ok(report)
}
