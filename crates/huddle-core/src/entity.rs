//! Operational entity types, the keys of an incoming batch.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

use crate::table::TableId;

/// The kind of operational record a batch section carries. Declaration order
/// is processing order.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
  EnumIter,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityType {
  Leagues,
  Teams,
  Rosters,
  Matchups,
  Transactions,
  DraftPicks,
}

impl EntityType {
  /// The warehouse table whose row count stands in for this entity type when
  /// no batch is supplied to the change detector.
  pub fn primary_table(self) -> TableId {
    match self {
      Self::Leagues => TableId::DimLeague,
      Self::Teams => TableId::DimTeam,
      Self::Rosters => TableId::FactRoster,
      Self::Matchups => TableId::FactMatchup,
      Self::Transactions => TableId::FactTransaction,
      Self::DraftPicks => TableId::FactDraft,
    }
  }

  /// Every warehouse table refreshed when this entity type is dirty.
  pub fn target_tables(self) -> &'static [TableId] {
    match self {
      Self::Leagues => &[TableId::DimSeason, TableId::DimLeague],
      Self::Teams => &[TableId::DimTeam],
      Self::Rosters => &[TableId::DimWeek, TableId::DimPlayer, TableId::FactRoster],
      Self::Matchups => &[
        TableId::DimSeason,
        TableId::DimWeek,
        TableId::FactMatchup,
        TableId::FactTeamPerformance,
      ],
      Self::Transactions => &[TableId::DimPlayer, TableId::FactTransaction],
      Self::DraftPicks => &[TableId::DimPlayer, TableId::FactDraft],
    }
  }
}

#[cfg(test)]
mod tests {
  use std::str::FromStr;

  use strum::IntoEnumIterator;

  use super::*;

  #[test]
  fn names_match_batch_keys() {
    let names: Vec<String> = EntityType::iter().map(|e| e.to_string()).collect();
    assert_eq!(
      names,
      ["leagues", "teams", "rosters", "matchups", "transactions", "draft_picks"]
    );
    assert_eq!(EntityType::from_str("draft_picks").unwrap(), EntityType::DraftPicks);
    assert!(EntityType::from_str("statistics").is_err());
  }

  #[test]
  fn primary_table_is_always_a_target() {
    for entity in EntityType::iter() {
      assert!(entity.target_tables().contains(&entity.primary_table()));
    }
  }
}
