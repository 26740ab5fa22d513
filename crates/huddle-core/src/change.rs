//! Change detection.
//!
//! Compares the record counts of the current batch with the counts recorded
//! the last time each entity type was loaded successfully. Only dirty types
//! are processed.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::entity::EntityType;

/// Persisted per-entity watermark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeMetadata {
  pub entity_type:       EntityType,
  pub last_processed_at: NaiveDateTime,
  pub record_count:      u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
  pub first_run: bool,
  pub dirty:     BTreeSet<EntityType>,
  /// Current record count of every entity type considered.
  pub counts:    BTreeMap<EntityType, u64>,
}

impl ChangeSet {
  pub fn is_dirty(&self, entity: EntityType) -> bool { self.dirty.contains(&entity) }

  pub fn unchanged(&self) -> impl Iterator<Item = EntityType> + '_ {
    self.counts.keys().copied().filter(|e| !self.dirty.contains(e))
  }
}

/// Decide which entity types need processing.
///
/// `previous` is `None` when the metadata could not be read at all; that, an
/// empty metadata set, or `force_full` makes this a first run with every type
/// dirty.
pub fn detect_changes(
  counts: BTreeMap<EntityType, u64>,
  previous: Option<&[ChangeMetadata]>,
  force_full: bool,
) -> ChangeSet {
  let previous = previous.filter(|p| !p.is_empty());
  let Some(previous) = previous.filter(|_| !force_full) else {
    return ChangeSet { first_run: true, dirty: counts.keys().copied().collect(), counts };
  };

  let recorded: BTreeMap<EntityType, u64> =
    previous.iter().map(|m| (m.entity_type, m.record_count)).collect();
  let dirty = counts
    .iter()
    .filter(|(entity, count)| recorded.get(entity) != Some(count))
    .map(|(entity, _)| *entity)
    .collect();

  ChangeSet { first_run: false, dirty, counts }
}
