//! Fact transformation.
//!
//! Maps operational records onto fact rows by swapping natural identifiers
//! for surrogate keys and deriving measures. A record that cannot be resolved
//! is not an error: it becomes [`Transformed::Skipped`] and is counted.

use std::{collections::BTreeMap, fmt};

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::{
  cache::{KeyCache, SurrogateKey},
  entity::EntityType,
  record::{
    Batch, DraftPickRecord, MatchupRecord, RosterRecord, TransactionRecord, full_team_id,
    normalize_player_id,
  },
  row::{IntoRow, Row},
  rules::{BusinessRules, parse_timestamp},
  table::TableId,
};

/// League size assumed when deriving pick-in-round without one.
const DEFAULT_LEAGUE_SIZE: u32 = 12;
const DEFAULT_TRANSACTION_STATUS: &str = "completed";

// ─── Outcome ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
  UnresolvedDimension { dimension: TableId, natural_key: String },
  UnparsableTimestamp(String),
}

impl fmt::Display for SkipReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::UnresolvedDimension { dimension, natural_key } => {
        write!(f, "no {dimension} row for {natural_key:?}")
      }
      Self::UnparsableTimestamp(raw) => write!(f, "unparsable timestamp {raw:?}"),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transformed<T> {
  Fact(T),
  Skipped(SkipReason),
}

/// Rows ready for loading plus the skip counters.
#[derive(Debug, Default)]
pub struct TransformOutput {
  pub rows:               Vec<Row>,
  pub skipped_unresolved: u64,
  pub skipped_unparsable: u64,
}

impl TransformOutput {
  fn from_facts<T: IntoRow>(facts: impl IntoIterator<Item = T>) -> Self {
    Self { rows: facts.into_iter().map(IntoRow::into_row).collect(), ..Default::default() }
  }

  fn collect<T: IntoRow>(entity: EntityType, results: impl Iterator<Item = Transformed<T>>) -> Self {
    let mut out = Self::default();
    for (index, result) in results.enumerate() {
      match result {
        Transformed::Fact(fact) => out.rows.push(fact.into_row()),
        Transformed::Skipped(reason) => {
          tracing::debug!(entity = %entity, index, %reason, "skipping record");
          match reason {
            SkipReason::UnresolvedDimension { .. } => out.skipped_unresolved += 1,
            SkipReason::UnparsableTimestamp(_) => out.skipped_unparsable += 1,
          }
        }
      }
    }
    out
  }

  pub fn skipped(&self) -> u64 { self.skipped_unresolved + self.skipped_unparsable }
}

// ─── Resolution helpers ──────────────────────────────────────────────────────

fn unresolved<T>(dimension: TableId, natural_key: impl Into<String>) -> Transformed<T> {
  Transformed::Skipped(SkipReason::UnresolvedDimension {
    dimension,
    natural_key: natural_key.into(),
  })
}

/// Unwrap a lookup or return the skip from the enclosing transform.
macro_rules! resolve {
  ($lookup:expr, $dimension:expr, $natural_key:expr) => {
    match $lookup {
      Some(found) => found,
      None => return unresolved($dimension, $natural_key),
    }
  };
}

// ─── Facts ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct RosterFact {
  pub roster_id:        String,
  pub league_key:       SurrogateKey,
  pub team_key:         SurrogateKey,
  pub player_key:       SurrogateKey,
  pub week_key:         SurrogateKey,
  pub season_year:      i32,
  pub is_starter:       bool,
  pub roster_position:  String,
  pub weekly_points:    Option<f64>,
  pub projected_points: Option<f64>,
  pub loaded_at:        NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchupFact {
  pub matchup_id:        String,
  pub league_key:        SurrogateKey,
  pub week_key:          SurrogateKey,
  pub season_year:       i32,
  pub team1_key:         SurrogateKey,
  pub team2_key:         SurrogateKey,
  pub team1_points:      f64,
  pub team2_points:      f64,
  pub point_difference:  f64,
  pub total_points:      f64,
  pub winner_team_key:   Option<SurrogateKey>,
  pub is_tie:            bool,
  pub margin_of_victory: f64,
  pub matchup_type:      MatchupType,
  pub loaded_at:         NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchupType {
  Regular,
  Playoffs,
  Championship,
  Consolation,
}

impl MatchupType {
  /// Championship outranks consolation, which outranks playoffs.
  pub fn of(record: &MatchupRecord) -> Self {
    if record.is_championship {
      Self::Championship
    } else if record.is_consolation {
      Self::Consolation
    } else if record.is_playoffs {
      Self::Playoffs
    } else {
      Self::Regular
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Regular => "regular",
      Self::Playoffs => "playoffs",
      Self::Championship => "championship",
      Self::Consolation => "consolation",
    }
  }
}

/// One team's result for one week.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamPerformanceFact {
  pub league_key:     SurrogateKey,
  pub team_key:       SurrogateKey,
  pub week_key:       SurrogateKey,
  pub season_year:    i32,
  pub wins:           u32,
  pub losses:         u32,
  pub ties:           u32,
  pub points_for:     f64,
  pub points_against: f64,
  pub loaded_at:      NaiveDateTime,
}

impl TeamPerformanceFact {
  fn add_game(&mut self, scored: f64, allowed: f64) {
    if scored > allowed {
      self.wins += 1;
    } else if scored < allowed {
      self.losses += 1;
    } else {
      self.ties += 1;
    }
    self.points_for += scored;
    self.points_against += allowed;
  }
}

/// Fold resolved matchups into per-team weekly results, ordered by week then
/// team. A team with several matchups in one week accumulates them.
pub fn team_performance<'a>(
  matchups: impl IntoIterator<Item = &'a MatchupFact>,
) -> Vec<TeamPerformanceFact> {
  let mut teams: BTreeMap<(SurrogateKey, SurrogateKey), TeamPerformanceFact> = BTreeMap::new();
  for m in matchups {
    let sides = [
      (m.team1_key, m.team1_points, m.team2_points),
      (m.team2_key, m.team2_points, m.team1_points),
    ];
    for (team_key, scored, allowed) in sides {
      teams
        .entry((m.week_key, team_key))
        .or_insert_with(|| TeamPerformanceFact {
          league_key: m.league_key,
          team_key,
          week_key: m.week_key,
          season_year: m.season_year,
          wins: 0,
          losses: 0,
          ties: 0,
          points_for: 0.0,
          points_against: 0.0,
          loaded_at: m.loaded_at,
        })
        .add_game(scored, allowed);
    }
  }
  teams.into_values().collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionFact {
  pub transaction_id:     String,
  pub league_key:         SurrogateKey,
  pub player_key:         SurrogateKey,
  pub season_year:        i32,
  pub transaction_date:   NaiveDateTime,
  pub transaction_type:   String,
  pub from_team_key:      Option<SurrogateKey>,
  pub to_team_key:        Option<SurrogateKey>,
  pub faab_bid:           Option<f64>,
  pub transaction_status: String,
  pub loaded_at:          NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DraftFact {
  pub draft_pick_id:  String,
  pub league_key:     SurrogateKey,
  pub team_key:       SurrogateKey,
  pub player_key:     SurrogateKey,
  pub season_year:    i32,
  pub overall_pick:   u32,
  pub round_number:   u32,
  pub pick_in_round:  u32,
  pub draft_cost:     Option<f64>,
  pub is_keeper_pick: bool,
  pub loaded_at:      NaiveDateTime,
}

impl IntoRow for RosterFact {
  fn into_row(self) -> Row {
    crate::row! {
      "roster_id" => self.roster_id,
      "league_key" => self.league_key,
      "team_key" => self.team_key,
      "player_key" => self.player_key,
      "week_key" => self.week_key,
      "season_year" => self.season_year,
      "is_starter" => self.is_starter,
      "roster_position" => self.roster_position,
      "weekly_points" => self.weekly_points,
      "projected_points" => self.projected_points,
      "loaded_at" => self.loaded_at,
    }
  }
}

impl IntoRow for MatchupFact {
  fn into_row(self) -> Row {
    let kind = self.matchup_type;
    crate::row! {
      "matchup_id" => self.matchup_id,
      "league_key" => self.league_key,
      "week_key" => self.week_key,
      "season_year" => self.season_year,
      "team1_key" => self.team1_key,
      "team2_key" => self.team2_key,
      "team1_points" => self.team1_points,
      "team2_points" => self.team2_points,
      "point_difference" => self.point_difference,
      "total_points" => self.total_points,
      "winner_team_key" => self.winner_team_key,
      "is_tie" => self.is_tie,
      "margin_of_victory" => self.margin_of_victory,
      "matchup_type" => kind.as_str(),
      "is_playoffs" => matches!(kind, MatchupType::Playoffs | MatchupType::Championship),
      "is_championship" => kind == MatchupType::Championship,
      "is_consolation" => kind == MatchupType::Consolation,
      "loaded_at" => self.loaded_at,
    }
  }
}

impl IntoRow for TeamPerformanceFact {
  fn into_row(self) -> Row {
    crate::row! {
      "league_key" => self.league_key,
      "team_key" => self.team_key,
      "week_key" => self.week_key,
      "season_year" => self.season_year,
      "wins" => self.wins,
      "losses" => self.losses,
      "ties" => self.ties,
      "points_for" => self.points_for,
      "points_against" => self.points_against,
      "point_differential" => self.points_for - self.points_against,
      "loaded_at" => self.loaded_at,
    }
  }
}

impl IntoRow for TransactionFact {
  fn into_row(self) -> Row {
    crate::row! {
      "transaction_id" => self.transaction_id,
      "league_key" => self.league_key,
      "player_key" => self.player_key,
      "season_year" => self.season_year,
      "transaction_date" => self.transaction_date,
      "transaction_type" => self.transaction_type,
      "from_team_key" => self.from_team_key,
      "to_team_key" => self.to_team_key,
      "faab_bid" => self.faab_bid,
      "transaction_status" => self.transaction_status,
      "loaded_at" => self.loaded_at,
    }
  }
}

impl IntoRow for DraftFact {
  fn into_row(self) -> Row {
    crate::row! {
      "draft_pick_id" => self.draft_pick_id,
      "league_key" => self.league_key,
      "team_key" => self.team_key,
      "player_key" => self.player_key,
      "season_year" => self.season_year,
      "overall_pick" => self.overall_pick,
      "round_number" => self.round_number,
      "pick_in_round" => self.pick_in_round,
      "draft_cost" => self.draft_cost,
      "is_keeper_pick" => self.is_keeper_pick,
      "loaded_at" => self.loaded_at,
    }
  }
}

// ─── Per-record transforms ───────────────────────────────────────────────────

/// Shared inputs for one run's transforms.
pub struct Context<'a> {
  pub cache:     &'a KeyCache,
  pub rules:     &'a BusinessRules,
  pub loaded_at: NaiveDateTime,
}

impl Context<'_> {
  pub fn roster(&self, r: &RosterRecord) -> Transformed<RosterFact> {
    let league = resolve!(self.cache.league(&r.league_id), TableId::DimLeague, &r.league_id);
    let team_id = full_team_id(&r.league_id, &r.team_id);
    let team_key = resolve!(self.cache.team(&team_id), TableId::DimTeam, team_id);
    let player_id = normalize_player_id(&r.player_id);
    let player_key = resolve!(self.cache.player(player_id), TableId::DimPlayer, player_id);
    let week_key = resolve!(
      self.cache.week(league.season_year, r.week),
      TableId::DimWeek,
      format!("{}/{}", league.season_year, r.week)
    );

    let slot = r
      .selected_position
      .as_deref()
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .unwrap_or("BN");
    Transformed::Fact(RosterFact {
      roster_id: r.roster_id.clone(),
      league_key: league.key,
      team_key,
      player_key,
      week_key,
      season_year: league.season_year,
      is_starter: self.rules.is_starter(Some(slot)),
      roster_position: slot.to_owned(),
      weekly_points: r.player_points,
      projected_points: r.projected_points,
      loaded_at: self.loaded_at,
    })
  }

  pub fn matchup(&self, m: &MatchupRecord) -> Transformed<MatchupFact> {
    let league = resolve!(self.cache.league(&m.league_id), TableId::DimLeague, &m.league_id);
    let team1_id = full_team_id(&m.league_id, &m.team1_id);
    let team1_key = resolve!(self.cache.team(&team1_id), TableId::DimTeam, team1_id);
    let team2_id = full_team_id(&m.league_id, &m.team2_id);
    let team2_key = resolve!(self.cache.team(&team2_id), TableId::DimTeam, team2_id);
    let week_key = resolve!(
      self.cache.week(league.season_year, m.week),
      TableId::DimWeek,
      format!("{}/{}", league.season_year, m.week)
    );

    let (p1, p2) = (m.team1_score, m.team2_score);
    let winner_team_key = if p1 > p2 {
      Some(team1_key)
    } else if p2 > p1 {
      Some(team2_key)
    } else {
      None
    };
    let difference = (p1 - p2).abs();
    Transformed::Fact(MatchupFact {
      matchup_id: m.matchup_id.clone(),
      league_key: league.key,
      week_key,
      season_year: league.season_year,
      team1_key,
      team2_key,
      team1_points: p1,
      team2_points: p2,
      point_difference: difference,
      total_points: p1 + p2,
      winner_team_key,
      is_tie: p1 == p2,
      margin_of_victory: difference,
      matchup_type: MatchupType::of(m),
      loaded_at: self.loaded_at,
    })
  }

  pub fn transaction(&self, t: &TransactionRecord) -> Transformed<TransactionFact> {
    let league = resolve!(self.cache.league(&t.league_id), TableId::DimLeague, &t.league_id);
    let Some(date) = parse_timestamp(&t.timestamp) else {
      return Transformed::Skipped(SkipReason::UnparsableTimestamp(t.timestamp.clone()));
    };
    let player_id = normalize_player_id(&t.player_id);
    let player_key = resolve!(self.cache.player(player_id), TableId::DimPlayer, player_id);

    // Named but unknown teams skip the whole record.
    let team = |raw: &Option<String>| -> Result<Option<SurrogateKey>, String> {
      match raw.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(id) => {
          let id = full_team_id(&t.league_id, id);
          self.cache.team(&id).map(Some).ok_or(id)
        }
      }
    };
    let from_team_key = match team(&t.source_team_id) {
      Ok(key) => key,
      Err(id) => return unresolved(TableId::DimTeam, id),
    };
    let to_team_key = match team(&t.destination_team_id) {
      Ok(key) => key,
      Err(id) => return unresolved(TableId::DimTeam, id),
    };

    Transformed::Fact(TransactionFact {
      transaction_id: t.transaction_id.clone(),
      league_key: league.key,
      player_key,
      season_year: self.rules.season_year_of(date.date()),
      transaction_date: date,
      transaction_type: t.kind.clone(),
      from_team_key,
      to_team_key,
      faab_bid: t.faab_bid,
      transaction_status: t
        .status
        .clone()
        .unwrap_or_else(|| DEFAULT_TRANSACTION_STATUS.to_owned()),
      loaded_at: self.loaded_at,
    })
  }

  pub fn draft_pick(&self, d: &DraftPickRecord) -> Transformed<DraftFact> {
    let league = resolve!(self.cache.league(&d.league_id), TableId::DimLeague, &d.league_id);
    let team_id = full_team_id(&d.league_id, &d.team_id);
    let team_key = resolve!(self.cache.team(&team_id), TableId::DimTeam, team_id);
    let player_id = normalize_player_id(&d.player_id);
    let player_key = resolve!(self.cache.player(player_id), TableId::DimPlayer, player_id);

    let league_size = league.num_teams.unwrap_or(DEFAULT_LEAGUE_SIZE).max(1);
    let pick_in_round = d
      .pick_in_round
      .unwrap_or_else(|| d.pick_number.saturating_sub(1) % league_size + 1);
    Transformed::Fact(DraftFact {
      draft_pick_id: d.draft_pick_id.clone(),
      league_key: league.key,
      team_key,
      player_key,
      season_year: league.season_year,
      overall_pick: d.pick_number,
      round_number: d.round_number.unwrap_or(1),
      pick_in_round,
      draft_cost: d.cost,
      is_keeper_pick: d.is_keeper,
      loaded_at: self.loaded_at,
    })
  }

  /// Transform every record of a fact-producing entity type into the rows of
  /// each fact table it feeds, in load order. Empty for types that only feed
  /// dimensions.
  pub fn facts(&self, batch: &Batch, entity: EntityType) -> Vec<(TableId, TransformOutput)> {
    let output = match entity {
      EntityType::Rosters => {
        TransformOutput::collect(entity, batch.rosters().iter().map(|r| self.roster(r)))
      }
      EntityType::Matchups => {
        let results: Vec<_> = batch.matchups().iter().map(|m| self.matchup(m)).collect();
        let performance = team_performance(results.iter().filter_map(|r| match r {
          Transformed::Fact(fact) => Some(fact),
          Transformed::Skipped(_) => None,
        }));
        return vec![
          (TableId::FactMatchup, TransformOutput::collect(entity, results.into_iter())),
          (TableId::FactTeamPerformance, TransformOutput::from_facts(performance)),
        ];
      }
      EntityType::Transactions => {
        TransformOutput::collect(entity, batch.transactions().iter().map(|t| self.transaction(t)))
      }
      EntityType::DraftPicks => {
        TransformOutput::collect(entity, batch.draft_picks().iter().map(|d| self.draft_pick(d)))
      }
      EntityType::Leagues | EntityType::Teams => return Vec::new(),
    };
    vec![(entity.primary_table(), output)]
  }
}
