//! Warehouse table descriptors.
//!
//! The star schema has two tiers: `dim_*` tables keyed by a store-generated
//! surrogate key with a unique natural key, and `fact_*` tables referencing
//! those surrogate keys. Column lists here must match the DDL in the storage
//! backend.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

// ─── Identity ────────────────────────────────────────────────────────────────

/// A warehouse table. Declaration order is load order: independent
/// dimensions, dependent dimensions, then facts.
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
pub enum TableId {
  DimSeason,
  DimWeek,
  DimPlayer,
  DimLeague,
  DimTeam,
  FactRoster,
  FactMatchup,
  FactTeamPerformance,
  FactTransaction,
  FactDraft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
  Dimension,
  Fact,
}

// ─── Descriptor ──────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct TableSpec {
  pub id:            TableId,
  pub tier:          Tier,
  /// Store-generated integer key; `None` for fact tables.
  pub surrogate_key: Option<&'static str>,
  /// The externally meaningful identity of a row.
  pub natural_key:   &'static [&'static str],
  /// Attributes a dimension refresh may overwrite.
  pub refreshable:   &'static [&'static str],
  /// Every column except the surrogate key, in insert order.
  pub columns:       &'static [&'static str],
}

impl TableSpec {
  pub fn has_column(&self, column: &str) -> bool {
    self.columns.contains(&column) || self.surrogate_key == Some(column)
  }

  /// All columns including the surrogate key, surrogate first.
  pub fn all_columns(&self) -> Vec<&'static str> {
    self.surrogate_key.into_iter().chain(self.columns.iter().copied()).collect()
  }
}

impl TableId {
  pub fn name(self) -> &'static str { self.into() }

  pub fn spec(self) -> &'static TableSpec {
    match self {
      Self::DimSeason => &DIM_SEASON,
      Self::DimWeek => &DIM_WEEK,
      Self::DimPlayer => &DIM_PLAYER,
      Self::DimLeague => &DIM_LEAGUE,
      Self::DimTeam => &DIM_TEAM,
      Self::FactRoster => &FACT_ROSTER,
      Self::FactMatchup => &FACT_MATCHUP,
      Self::FactTeamPerformance => &FACT_TEAM_PERFORMANCE,
      Self::FactTransaction => &FACT_TRANSACTION,
      Self::FactDraft => &FACT_DRAFT,
    }
  }

  pub fn is_dimension(self) -> bool { self.spec().tier == Tier::Dimension }
}

// ─── Dimensions ──────────────────────────────────────────────────────────────

pub static DIM_SEASON: TableSpec = TableSpec {
  id:            TableId::DimSeason,
  tier:          Tier::Dimension,
  surrogate_key: Some("season_key"),
  natural_key:   &["season_year"],
  refreshable:   &[
    "playoff_start_week",
    "championship_week",
    "playoff_start_from_flags",
    "championship_from_flags",
    "total_weeks",
    "is_current_season",
    "season_status",
  ],
  columns:       &[
    "season_year",
    "season_start_date",
    "season_end_date",
    "playoff_start_week",
    "championship_week",
    "playoff_start_from_flags",
    "championship_from_flags",
    "total_weeks",
    "is_current_season",
    "season_status",
    "valid_from",
    "valid_to",
  ],
};

pub static DIM_WEEK: TableSpec = TableSpec {
  id:            TableId::DimWeek,
  tier:          Tier::Dimension,
  surrogate_key: Some("week_key"),
  natural_key:   &["season_year", "week_number"],
  refreshable:   &["week_type", "is_current_week"],
  columns:       &[
    "season_year",
    "week_number",
    "week_type",
    "week_start_date",
    "week_end_date",
    "is_current_week",
    "valid_from",
    "valid_to",
  ],
};

pub static DIM_PLAYER: TableSpec = TableSpec {
  id:            TableId::DimPlayer,
  tier:          Tier::Dimension,
  surrogate_key: Some("player_key"),
  natural_key:   &["player_id"],
  refreshable:   &["player_name", "primary_position"],
  columns:       &[
    "player_id",
    "player_name",
    "primary_position",
    "valid_from",
    "valid_to",
  ],
};

pub static DIM_LEAGUE: TableSpec = TableSpec {
  id:            TableId::DimLeague,
  tier:          Tier::Dimension,
  surrogate_key: Some("league_key"),
  natural_key:   &["league_id"],
  refreshable:   &["league_name", "current_week", "draft_status"],
  columns:       &[
    "league_id",
    "league_name",
    "season_year",
    "num_teams",
    "league_type",
    "current_week",
    "draft_status",
    "valid_from",
    "valid_to",
  ],
};

pub static DIM_TEAM: TableSpec = TableSpec {
  id:            TableId::DimTeam,
  tier:          Tier::Dimension,
  surrogate_key: Some("team_key"),
  natural_key:   &["team_id"],
  refreshable:   &[
    "team_name",
    "manager_name",
    "wins",
    "losses",
    "ties",
    "points_for",
    "points_against",
    "playoff_seed",
    "faab_balance",
  ],
  columns:       &[
    "team_id",
    "league_key",
    "team_name",
    "manager_name",
    "wins",
    "losses",
    "ties",
    "points_for",
    "points_against",
    "playoff_seed",
    "faab_balance",
    "valid_from",
    "valid_to",
  ],
};

// ─── Facts ───────────────────────────────────────────────────────────────────

pub static FACT_ROSTER: TableSpec = TableSpec {
  id:            TableId::FactRoster,
  tier:          Tier::Fact,
  surrogate_key: None,
  natural_key:   &["team_key", "week_key", "player_key"],
  refreshable:   &[],
  columns:       &[
    "roster_id",
    "league_key",
    "team_key",
    "player_key",
    "week_key",
    "season_year",
    "is_starter",
    "roster_position",
    "weekly_points",
    "projected_points",
    "loaded_at",
  ],
};

pub static FACT_MATCHUP: TableSpec = TableSpec {
  id:            TableId::FactMatchup,
  tier:          Tier::Fact,
  surrogate_key: None,
  natural_key:   &["matchup_id"],
  refreshable:   &[],
  columns:       &[
    "matchup_id",
    "league_key",
    "week_key",
    "season_year",
    "team1_key",
    "team2_key",
    "team1_points",
    "team2_points",
    "point_difference",
    "total_points",
    "winner_team_key",
    "is_tie",
    "margin_of_victory",
    "matchup_type",
    "is_playoffs",
    "is_championship",
    "is_consolation",
    "loaded_at",
  ],
};

/// One row per team and week, derived from that week's matchups.
pub static FACT_TEAM_PERFORMANCE: TableSpec = TableSpec {
  id:            TableId::FactTeamPerformance,
  tier:          Tier::Fact,
  surrogate_key: None,
  natural_key:   &["team_key", "week_key"],
  refreshable:   &[],
  columns:       &[
    "league_key",
    "team_key",
    "week_key",
    "season_year",
    "wins",
    "losses",
    "ties",
    "points_for",
    "points_against",
    "point_differential",
    "loaded_at",
  ],
};

pub static FACT_TRANSACTION: TableSpec = TableSpec {
  id:            TableId::FactTransaction,
  tier:          Tier::Fact,
  surrogate_key: None,
  natural_key:   &["transaction_id"],
  refreshable:   &[],
  columns:       &[
    "transaction_id",
    "league_key",
    "player_key",
    "season_year",
    "transaction_date",
    "transaction_type",
    "from_team_key",
    "to_team_key",
    "faab_bid",
    "transaction_status",
    "loaded_at",
  ],
};

pub static FACT_DRAFT: TableSpec = TableSpec {
  id:            TableId::FactDraft,
  tier:          Tier::Fact,
  surrogate_key: None,
  natural_key:   &["draft_pick_id"],
  refreshable:   &[],
  columns:       &[
    "draft_pick_id",
    "league_key",
    "team_key",
    "player_key",
    "season_year",
    "overall_pick",
    "round_number",
    "pick_in_round",
    "draft_cost",
    "is_keeper_pick",
    "loaded_at",
  ],
};
