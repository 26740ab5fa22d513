//! Per-table load plans.
//!
//! A plan picks the merge policy the loader applies to one warehouse table.
//! Tables without a plan fall back to REPLACE (delete everything, insert the
//! batch).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::{
  Error, Result,
  table::{TableId, Tier},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Strategy {
  /// Insert new keys, update existing keys on `mutable_fields` only.
  Upsert { primary_key: Vec<String>, mutable_fields: Vec<String> },
  /// Replace every period present in the batch wholesale.
  IncrementalAppend { period_fields: Vec<String> },
  /// Insert keys not yet persisted; never update.
  AppendOnly { primary_key: Vec<String> },
}

impl Strategy {
  pub fn name(&self) -> &'static str {
    match self {
      Self::Upsert { .. } => "upsert",
      Self::IncrementalAppend { .. } => "incremental_append",
      Self::AppendOnly { .. } => "append_only",
    }
  }

  fn key(&self) -> &[String] {
    match self {
      Self::Upsert { primary_key, .. } | Self::AppendOnly { primary_key } => primary_key,
      Self::IncrementalAppend { period_fields } => period_fields,
    }
  }

  fn columns(&self) -> impl Iterator<Item = &String> {
    let mutable = match self {
      Self::Upsert { mutable_fields, .. } => mutable_fields.as_slice(),
      _ => &[],
    };
    self.key().iter().chain(mutable)
  }

  /// Check every named column against the table descriptor.
  pub fn validate(&self, table: TableId) -> Result<()> {
    let spec = table.spec();
    if self.key().is_empty() {
      return Err(Error::EmptyPlanKey(table.to_string()));
    }
    for column in self.columns() {
      if !spec.has_column(column) || spec.surrogate_key == Some(column.as_str()) {
        return Err(Error::UnknownPlanColumn {
          table:  table.to_string(),
          column: column.clone(),
        });
      }
    }
    Ok(())
  }
}

fn strings(columns: &[&str]) -> Vec<String> { columns.iter().map(|c| (*c).to_owned()).collect() }

/// The plan set for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoadPlans(BTreeMap<TableId, Strategy>);

impl Default for LoadPlans {
  fn default() -> Self {
    let mut plans = BTreeMap::new();
    for table in TableId::iter() {
      let spec = table.spec();
      let strategy = match (spec.tier, table) {
        (Tier::Dimension, _) => Strategy::Upsert {
          primary_key:    strings(spec.natural_key),
          mutable_fields: strings(spec.refreshable),
        },
        (_, TableId::FactRoster | TableId::FactMatchup | TableId::FactTeamPerformance) => {
          Strategy::IncrementalAppend { period_fields: strings(&["league_key", "week_key"]) }
        }
        _ => Strategy::AppendOnly { primary_key: strings(spec.natural_key) },
      };
      plans.insert(table, strategy);
    }
    Self(plans)
  }
}

impl LoadPlans {
  /// No plans at all: every table uses REPLACE.
  pub fn empty() -> Self { Self(BTreeMap::new()) }

  /// The defaults with `overrides` layered on top.
  pub fn with_overrides(overrides: BTreeMap<TableId, Strategy>) -> Self {
    let mut plans = Self::default();
    plans.0.extend(overrides);
    plans
  }

  /// `None` selects the REPLACE fallback.
  pub fn get(&self, table: TableId) -> Option<&Strategy> { self.0.get(&table) }

  pub fn set(&mut self, table: TableId, strategy: Strategy) { self.0.insert(table, strategy); }

  pub fn remove(&mut self, table: TableId) -> Option<Strategy> { self.0.remove(&table) }

  pub fn validate(&self) -> Result<()> {
    self.0.iter().try_for_each(|(table, strategy)| strategy.validate(*table))
  }
}
