//! Run-scoped surrogate key cache.
//!
//! Built once per run, after every dimension has been resolved, from one bulk
//! read per dimension table. The transformer borrows it; nothing outlives the
//! run.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
  row::{Cell, Row},
  table::TableId,
};

/// A store-generated dimension key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurrogateKey(pub i64);

impl From<SurrogateKey> for Cell {
  fn from(key: SurrogateKey) -> Self { Cell::Int(key.0) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeagueEntry {
  pub key:         SurrogateKey,
  pub season_year: i32,
  pub num_teams:   Option<u32>,
}

#[derive(Debug, Default)]
pub struct KeyCache {
  seasons: HashMap<i32, SurrogateKey>,
  weeks:   HashMap<(i32, u32), SurrogateKey>,
  players: HashMap<String, SurrogateKey>,
  leagues: HashMap<String, LeagueEntry>,
  teams:   HashMap<String, SurrogateKey>,
}

/// The columns [`KeyCache::absorb`] reads for each dimension.
pub fn key_columns(table: TableId) -> &'static [&'static str] {
  match table {
    TableId::DimSeason => &["season_key", "season_year"],
    TableId::DimWeek => &["week_key", "season_year", "week_number"],
    TableId::DimPlayer => &["player_key", "player_id"],
    TableId::DimLeague => &["league_key", "league_id", "season_year", "num_teams"],
    TableId::DimTeam => &["team_key", "team_id"],
    _ => &[],
  }
}

fn text(row: &Row, column: &str) -> Option<String> {
  row.get(column).filter(|c| !c.is_null()).map(Cell::key_text)
}

fn int(row: &Row, column: &str) -> Option<i64> { row.get(column).and_then(Cell::as_i64) }

impl KeyCache {
  pub fn new() -> Self { Self::default() }

  /// Fold the rows of one dimension table into the cache. Rows missing their
  /// surrogate or natural key are ignored.
  pub fn absorb(&mut self, table: TableId, rows: &[Row]) {
    for row in rows {
      let Some(key) = table
        .spec()
        .surrogate_key
        .and_then(|column| int(row, column))
        .map(SurrogateKey)
      else {
        continue;
      };
      match table {
        TableId::DimSeason => {
          if let Some(season) = int(row, "season_year") {
            self.seasons.insert(season as i32, key);
          }
        }
        TableId::DimWeek => {
          if let (Some(season), Some(week)) = (int(row, "season_year"), int(row, "week_number")) {
            self.weeks.insert((season as i32, week as u32), key);
          }
        }
        TableId::DimPlayer => {
          if let Some(id) = text(row, "player_id") {
            self.players.insert(id, key);
          }
        }
        TableId::DimLeague => {
          if let (Some(id), Some(season)) = (text(row, "league_id"), int(row, "season_year")) {
            let num_teams = int(row, "num_teams").filter(|n| *n > 0).map(|n| n as u32);
            self
              .leagues
              .insert(id, LeagueEntry { key, season_year: season as i32, num_teams });
          }
        }
        TableId::DimTeam => {
          if let Some(id) = text(row, "team_id") {
            self.teams.insert(id, key);
          }
        }
        _ => {}
      }
    }
  }

  pub fn season(&self, season_year: i32) -> Option<SurrogateKey> {
    self.seasons.get(&season_year).copied()
  }

  pub fn week(&self, season_year: i32, week: u32) -> Option<SurrogateKey> {
    self.weeks.get(&(season_year, week)).copied()
  }

  pub fn player(&self, player_id: &str) -> Option<SurrogateKey> {
    self.players.get(player_id).copied()
  }

  pub fn league(&self, league_id: &str) -> Option<&LeagueEntry> { self.leagues.get(league_id) }

  pub fn team(&self, team_id: &str) -> Option<SurrogateKey> { self.teams.get(team_id).copied() }

  pub fn len(&self) -> usize {
    self.seasons.len() + self.weeks.len() + self.players.len() + self.leagues.len() + self.teams.len()
  }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}
