//! Dimension building.
//!
//! Turns the operational records of a batch into dimension rows keyed by
//! their natural keys. Surrogate keys are never produced here; the store
//! assigns them when the rows are upserted.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{NaiveDate, NaiveDateTime};

use crate::{
  cache::{KeyCache, SurrogateKey},
  record::{Batch, full_team_id, normalize_player_id},
  row::{Cell, IntoRow, Row},
  rules::{self, BusinessRules, WeekType},
};

/// `valid_to` of every current dimension row.
pub const OPEN_ENDED: &str = "9999-12-31";

const UNKNOWN_POSITION: &str = "Unknown";

fn open_ended() -> NaiveDate { NaiveDate::from_ymd_opt(9999, 12, 31).unwrap_or(NaiveDate::MAX) }

// ─── Rows ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct SeasonDim {
  pub season_year:       i32,
  pub season_start_date: Option<NaiveDate>,
  pub season_end_date:   Option<NaiveDate>,
  pub calendar:          SeasonCalendar,
  pub is_current_season: bool,
  pub season_status:     &'static str,
  pub valid_from:        NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeekDim {
  pub season_year:     i32,
  pub week_number:     u32,
  pub week_type:       WeekType,
  pub week_start_date: Option<NaiveDate>,
  pub week_end_date:   Option<NaiveDate>,
  pub is_current_week: bool,
  pub valid_from:      NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerDim {
  pub player_id:        String,
  pub player_name:      String,
  pub primary_position: String,
  pub valid_from:       NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeagueDim {
  pub league_id:    String,
  pub league_name:  String,
  pub season_year:  i32,
  pub num_teams:    u32,
  pub league_type:  Option<String>,
  pub current_week: Option<u32>,
  pub draft_status: Option<String>,
  pub valid_from:   NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeamDim {
  pub team_id:        String,
  pub league_key:     SurrogateKey,
  pub team_name:      String,
  pub manager_name:   Option<String>,
  pub wins:           u32,
  pub losses:         u32,
  pub ties:           u32,
  pub points_for:     f64,
  pub points_against: f64,
  pub playoff_seed:   Option<u32>,
  pub faab_balance:   Option<f64>,
  pub valid_from:     NaiveDate,
}

impl IntoRow for SeasonDim {
  fn into_row(self) -> Row {
    crate::row! {
      "season_year" => self.season_year,
      "season_start_date" => self.season_start_date,
      "season_end_date" => self.season_end_date,
      "playoff_start_week" => self.calendar.playoff_start.week,
      "championship_week" => self.calendar.championship.week,
      "playoff_start_from_flags" => self.calendar.playoff_start.from_flags,
      "championship_from_flags" => self.calendar.championship.from_flags,
      "total_weeks" => self.calendar.total_weeks,
      "is_current_season" => self.is_current_season,
      "season_status" => self.season_status,
      "valid_from" => self.valid_from,
      "valid_to" => open_ended(),
    }
  }
}

impl IntoRow for WeekDim {
  fn into_row(self) -> Row {
    crate::row! {
      "season_year" => self.season_year,
      "week_number" => self.week_number,
      "week_type" => self.week_type.as_str(),
      "week_start_date" => self.week_start_date,
      "week_end_date" => self.week_end_date,
      "is_current_week" => self.is_current_week,
      "valid_from" => self.valid_from,
      "valid_to" => open_ended(),
    }
  }
}

impl IntoRow for PlayerDim {
  fn into_row(self) -> Row {
    crate::row! {
      "player_id" => self.player_id,
      "player_name" => self.player_name,
      "primary_position" => self.primary_position,
      "valid_from" => self.valid_from,
      "valid_to" => open_ended(),
    }
  }
}

impl IntoRow for LeagueDim {
  fn into_row(self) -> Row {
    crate::row! {
      "league_id" => self.league_id,
      "league_name" => self.league_name,
      "season_year" => self.season_year,
      "num_teams" => self.num_teams,
      "league_type" => self.league_type,
      "current_week" => self.current_week,
      "draft_status" => self.draft_status,
      "valid_from" => self.valid_from,
      "valid_to" => open_ended(),
    }
  }
}

impl IntoRow for TeamDim {
  fn into_row(self) -> Row {
    crate::row! {
      "team_id" => self.team_id,
      "league_key" => self.league_key,
      "team_name" => self.team_name,
      "manager_name" => self.manager_name,
      "wins" => self.wins,
      "losses" => self.losses,
      "ties" => self.ties,
      "points_for" => self.points_for,
      "points_against" => self.points_against,
      "playoff_seed" => self.playoff_seed,
      "faab_balance" => self.faab_balance,
      "valid_from" => self.valid_from,
      "valid_to" => open_ended(),
    }
  }
}

// ─── League seasons ──────────────────────────────────────────────────────────

/// League id → season year, preferring the batch over what is already
/// persisted.
#[derive(Debug, Default)]
pub struct LeagueSeasons(HashMap<String, i32>);

impl LeagueSeasons {
  pub fn new(batch: &Batch, persisted: &KeyCache) -> Self {
    let mut seasons = HashMap::new();
    let league_ids = batch
      .rosters()
      .iter()
      .map(|r| &r.league_id)
      .chain(batch.matchups().iter().map(|m| &m.league_id));
    for id in league_ids {
      if let Some(entry) = persisted.league(id) {
        seasons.insert(id.clone(), entry.season_year);
      }
    }
    for league in batch.leagues() {
      seasons.insert(league.league_id.clone(), league.season);
    }
    Self(seasons)
  }

  pub fn get(&self, league_id: &str) -> Option<i32> { self.0.get(league_id).copied() }
}

// ─── Seasons ─────────────────────────────────────────────────────────────────

/// A playoff boundary week and whether matchup flags established it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarWeek {
  pub week:       u32,
  pub from_flags: bool,
}

impl CalendarWeek {
  fn configured(week: u32) -> Self { Self { week, from_flags: false } }

  /// Flag-derived weeks survive batches without flags; configured weeks
  /// follow the current rules.
  fn merge(
    observed: Option<u32>,
    persisted: Option<Self>,
    configured: u32,
    pick: fn(u32, u32) -> u32,
  ) -> Self {
    let flagged = persisted.filter(|p| p.from_flags).map(|p| p.week);
    match (observed, flagged) {
      (Some(seen), Some(kept)) => Self { week: pick(seen, kept), from_flags: true },
      (Some(week), None) | (None, Some(week)) => Self { week, from_flags: true },
      (None, None) => Self::configured(configured),
    }
  }
}

/// Playoff layout of one season.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeasonCalendar {
  pub playoff_start: CalendarWeek,
  pub championship:  CalendarWeek,
  pub total_weeks:   u32,
}

impl SeasonCalendar {
  pub fn week_type(&self, week: u32) -> WeekType {
    rules::classify(week, self.playoff_start.week, self.championship.week)
  }
}

/// The `dim_season` columns [`persisted_calendars`] reads.
pub const CALENDAR_COLUMNS: &[&str] = &[
  "season_year",
  "playoff_start_week",
  "championship_week",
  "playoff_start_from_flags",
  "championship_from_flags",
  "total_weeks",
];

/// Calendars already in the warehouse, by season. Rows missing a week
/// number are ignored.
pub fn persisted_calendars(rows: &[Row]) -> BTreeMap<i32, SeasonCalendar> {
  let int = |row: &Row, column: &str| row.get(column).and_then(Cell::as_i64);
  let week = |row: &Row, column: &str| int(row, column).and_then(|w| u32::try_from(w).ok());
  rows
    .iter()
    .filter_map(|row| {
      let season = i32::try_from(int(row, "season_year")?).ok()?;
      let calendar = SeasonCalendar {
        playoff_start: CalendarWeek {
          week:       week(row, "playoff_start_week")?,
          from_flags: int(row, "playoff_start_from_flags") == Some(1),
        },
        championship:  CalendarWeek {
          week:       week(row, "championship_week")?,
          from_flags: int(row, "championship_from_flags") == Some(1),
        },
        total_weeks:   week(row, "total_weeks").unwrap_or_default(),
      };
      Some((season, calendar))
    })
    .collect()
}

/// Calendars for every season the batch touches through leagues or
/// matchups, merged with what is already persisted.
///
/// The playoff start is the earliest week flagged `is_playoffs` and the
/// championship the latest flagged `is_championship`, across this batch and
/// earlier flag-derived values. Without flags on either side the configured
/// rules apply. `total_weeks` never shrinks: it is the larger of the stored
/// value and the latest week this batch shows (its matchups, else the
/// league's end week).
pub fn season_calendars(
  batch: &Batch,
  seasons: &LeagueSeasons,
  persisted: &BTreeMap<i32, SeasonCalendar>,
  rules: &BusinessRules,
) -> BTreeMap<i32, SeasonCalendar> {
  #[derive(Default)]
  struct Seen {
    playoff_start: Option<u32>,
    championship:  Option<u32>,
    last_week:     Option<u32>,
    end_week:      Option<u32>,
  }

  let mut seen: BTreeMap<i32, Seen> = BTreeMap::new();
  for league in batch.leagues() {
    let entry = seen.entry(league.season).or_default();
    entry.end_week = entry.end_week.max(league.end_week);
  }
  for matchup in batch.matchups() {
    let Some(season) = seasons.get(&matchup.league_id) else { continue };
    let entry = seen.entry(season).or_default();
    entry.last_week = entry.last_week.max(Some(matchup.week));
    if matchup.is_playoffs {
      entry.playoff_start = Some(entry.playoff_start.map_or(matchup.week, |w| w.min(matchup.week)));
    }
    if matchup.is_championship {
      entry.championship = entry.championship.max(Some(matchup.week));
    }
  }

  seen
    .into_iter()
    .map(|(season, seen)| {
      let stored = persisted.get(&season);
      let observed = seen.last_week.or(seen.end_week);
      let total_weeks = match (stored.map(|c| c.total_weeks), observed) {
        (Some(kept), Some(seen)) => kept.max(seen),
        (Some(weeks), None) | (None, Some(weeks)) => weeks,
        (None, None) => rules.regular_season_weeks,
      };
      let calendar = SeasonCalendar {
        playoff_start: CalendarWeek::merge(
          seen.playoff_start,
          stored.map(|c| c.playoff_start),
          rules.playoff_start_week,
          u32::min,
        ),
        championship: CalendarWeek::merge(
          seen.championship,
          stored.map(|c| c.championship),
          rules.championship_week,
          u32::max,
        ),
        total_weeks,
      };
      (season, calendar)
    })
    .collect()
}

pub fn build_seasons(
  calendars: &BTreeMap<i32, SeasonCalendar>,
  rules: &BusinessRules,
  as_of: NaiveDateTime,
) -> Vec<SeasonDim> {
  let current = rules.season_year_of(as_of.date());
  calendars
    .iter()
    .map(|(season, calendar)| SeasonDim {
      season_year:       *season,
      season_start_date: rules.season_start_date(*season),
      season_end_date:   rules::season_end_date(*season),
      calendar:          *calendar,
      is_current_season: *season == current,
      season_status:     if *season < current { "completed" } else { "active" },
      valid_from:        as_of.date(),
    })
    .collect()
}

// ─── Weeks ───────────────────────────────────────────────────────────────────

/// One row per distinct `(season, week)` referenced by rosters or matchups.
/// Records whose league season is unknown contribute nothing. `calendars`
/// should hold every known season, persisted ones included, so weeks are
/// never reclassified by the configured fallback.
pub fn build_weeks(
  batch: &Batch,
  seasons: &LeagueSeasons,
  calendars: &BTreeMap<i32, SeasonCalendar>,
  rules: &BusinessRules,
  as_of: NaiveDateTime,
) -> Vec<WeekDim> {
  let referenced: BTreeSet<(i32, u32)> = batch
    .rosters()
    .iter()
    .map(|r| (r.league_id.as_str(), r.week))
    .chain(batch.matchups().iter().map(|m| (m.league_id.as_str(), m.week)))
    .filter_map(|(league, week)| Some((seasons.get(league)?, week)))
    .collect();

  let today = as_of.date();
  referenced
    .into_iter()
    .map(|(season, week)| {
      let week_type = match calendars.get(&season) {
        Some(calendar) => calendar.week_type(week),
        None => rules.week_type_by_number(week),
      };
      let dates = rules::week_dates(season, week);
      WeekDim {
        season_year: season,
        week_number: week,
        week_type,
        week_start_date: dates.map(|d| d.0),
        week_end_date: dates.map(|d| d.1),
        is_current_week: dates.is_some_and(|(start, end)| start <= today && today <= end),
        valid_from: today,
      }
    })
    .collect()
}

// ─── Players ─────────────────────────────────────────────────────────────────

fn first_position(raw: Option<&str>) -> Option<&str> {
  let position = raw?.split(',').next()?.trim();
  (!position.is_empty() && position != UNKNOWN_POSITION).then_some(position)
}

fn present(raw: &Option<String>) -> Option<&str> {
  raw.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Players referenced by transactions, draft picks and rosters. Draft-pick
/// positions take priority over roster positions; the first name seen wins.
pub fn build_players(batch: &Batch, as_of: NaiveDateTime) -> Vec<PlayerDim> {
  let mut positions: HashMap<&str, &str> = HashMap::new();
  for pick in batch.draft_picks() {
    if let Some(position) = first_position(pick.position.as_deref()) {
      positions.entry(normalize_player_id(&pick.player_id)).or_insert(position);
    }
  }
  for roster in batch.rosters() {
    if let Some(position) = first_position(roster.position.as_deref()) {
      positions.entry(normalize_player_id(&roster.player_id)).or_insert(position);
    }
  }

  let mut names: BTreeMap<&str, Option<&str>> = BTreeMap::new();
  let sightings = batch
    .transactions()
    .iter()
    .map(|t| (t.player_id.as_str(), present(&t.player_name)))
    .chain(batch.draft_picks().iter().map(|p| (p.player_id.as_str(), present(&p.player_name))))
    .chain(batch.rosters().iter().map(|r| (r.player_id.as_str(), present(&r.player_name))));
  for (raw_id, name) in sightings {
    let slot = names.entry(normalize_player_id(raw_id)).or_default();
    if slot.is_none() {
      *slot = name;
    }
  }

  names
    .into_iter()
    .map(|(id, name)| PlayerDim {
      player_id:        id.to_owned(),
      player_name:      name.map_or_else(|| format!("Player {id}"), str::to_owned),
      primary_position: positions.get(id).copied().unwrap_or(UNKNOWN_POSITION).to_owned(),
      valid_from:       as_of.date(),
    })
    .collect()
}

// ─── Leagues & teams ─────────────────────────────────────────────────────────

pub fn build_leagues(batch: &Batch, as_of: NaiveDateTime) -> Vec<LeagueDim> {
  batch
    .leagues()
    .iter()
    .map(|l| LeagueDim {
      league_id:    l.league_id.clone(),
      league_name:  l.name.clone(),
      season_year:  l.season,
      num_teams:    l.num_teams,
      league_type:  l.league_type.clone(),
      current_week: l.current_week,
      draft_status: l.draft_status.clone(),
      valid_from:   as_of.date(),
    })
    .collect()
}

/// Team rows with their league surrogate key. Teams whose league has no key
/// yet are left out and counted.
pub fn build_teams(batch: &Batch, leagues: &KeyCache, as_of: NaiveDateTime) -> (Vec<TeamDim>, usize) {
  let mut skipped = 0;
  let mut teams = Vec::new();
  for team in batch.teams() {
    let Some(league) = leagues.league(&team.league_id) else {
      tracing::debug!(team_id = %team.team_id, league_id = %team.league_id, "team references unknown league");
      skipped += 1;
      continue;
    };
    teams.push(TeamDim {
      team_id:        full_team_id(&team.league_id, &team.team_id),
      league_key:     league.key,
      team_name:      team.name.clone(),
      manager_name:   team.manager_name.clone(),
      wins:           team.wins,
      losses:         team.losses,
      ties:           team.ties,
      points_for:     team.points_for,
      points_against: team.points_against,
      playoff_seed:   team.playoff_seed,
      faab_balance:   team.faab_balance,
      valid_from:     as_of.date(),
    });
  }
  (teams, skipped)
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::{row, table::TableId};

  fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(12, 0, 0).unwrap()
  }

  fn batch() -> Batch {
    Batch::from_json(json!({
      "leagues": [
        { "league_id": "L1", "name": "Alpha", "season": 2024, "num_teams": 10, "end_week": 17 }
      ],
      "teams": [
        { "team_id": "L1.t.1", "league_id": "L1", "name": "Ones" },
        { "team_id": "X.t.1", "league_id": "X", "name": "Orphans" }
      ],
      "matchups": [
        { "matchup_id": "m1", "league_id": "L1", "week": 1, "team1_id": "a", "team2_id": "b" },
        { "matchup_id": "m2", "league_id": "L1", "week": 15, "team1_id": "a", "team2_id": "b",
          "is_playoffs": true },
        { "matchup_id": "m3", "league_id": "L1", "week": 16, "team1_id": "a", "team2_id": "b",
          "is_playoffs": true, "is_championship": true }
      ],
      "rosters": [
        { "roster_id": "r1", "league_id": "L1", "team_id": "L1.t.1", "week": 1,
          "player_id": "449.p.7", "player_name": "Seven", "position": "S,CB" },
        { "roster_id": "r2", "league_id": "Z", "team_id": "Z.t.1", "week": 3, "player_id": "8" }
      ],
      "draft_picks": [
        { "draft_pick_id": "d1", "league_id": "L1", "team_id": "1", "player_id": "7",
          "position": "CB", "pick_number": 1 }
      ]
    }))
    .unwrap()
  }

  #[test]
  fn season_calendar_prefers_matchup_flags() {
    let batch = batch();
    let seasons = LeagueSeasons::new(&batch, &KeyCache::new());
    let rules = BusinessRules::default();
    let calendars = season_calendars(&batch, &seasons, &BTreeMap::new(), &rules);
    let calendar = calendars[&2024];
    assert_eq!(calendar.playoff_start, CalendarWeek { week: 15, from_flags: true });
    assert_eq!(calendar.championship, CalendarWeek { week: 16, from_flags: true });
    assert_eq!(calendar.total_weeks, 16);

    let rows = build_seasons(&calendars, &rules, at(2024, 11, 1));
    assert_eq!(rows.len(), 1);
    assert!(rows[0].is_current_season);
    assert_eq!(rows[0].season_status, "active");
    assert_eq!(rows[0].season_end_date, NaiveDate::from_ymd_opt(2025, 1, 31));

    let later = build_seasons(&calendars, &rules, at(2026, 2, 1));
    assert_eq!(later[0].season_status, "completed");
  }

  #[test]
  fn persisted_flag_calendars_survive_partial_batches() {
    let rules = BusinessRules::default();
    let stored = persisted_calendars(&[row! {
      "season_year" => 2024i64,
      "playoff_start_week" => 14i64,
      "championship_week" => 16i64,
      "playoff_start_from_flags" => true,
      "championship_from_flags" => true,
      "total_weeks" => 16i64,
    }]);
    let partial = Batch::from_json(json!({
      "leagues": [{ "league_id": "L1", "name": "Alpha", "season": 2024, "end_week": 17 }],
      "matchups": [
        { "matchup_id": "m5", "league_id": "L1", "week": 5, "team1_id": "a", "team2_id": "b" }
      ],
      "rosters": [
        { "roster_id": "r1", "league_id": "L1", "team_id": "L1.t.1", "week": 14, "player_id": "1" }
      ]
    }))
    .unwrap();
    let seasons = LeagueSeasons::new(&partial, &KeyCache::new());

    let calendars = season_calendars(&partial, &seasons, &stored, &rules);
    assert_eq!(calendars[&2024], stored[&2024]);
    let weeks = build_weeks(&partial, &seasons, &calendars, &rules, at(2024, 10, 1));
    let types: Vec<(u32, WeekType)> = weeks.iter().map(|w| (w.week_number, w.week_type)).collect();
    assert_eq!(types, vec![(5, WeekType::Regular), (14, WeekType::Playoffs)]);

    // An earlier flagged week moves the playoff start; a later one does not.
    let flagged = Batch::from_json(json!({
      "leagues": [{ "league_id": "L1", "name": "Alpha", "season": 2024 }],
      "matchups": [
        { "matchup_id": "m13", "league_id": "L1", "week": 13, "team1_id": "a", "team2_id": "b",
          "is_playoffs": true },
        { "matchup_id": "m15", "league_id": "L1", "week": 15, "team1_id": "a", "team2_id": "b",
          "is_playoffs": true }
      ]
    }))
    .unwrap();
    let seasons = LeagueSeasons::new(&flagged, &KeyCache::new());
    let merged = season_calendars(&flagged, &seasons, &stored, &rules)[&2024];
    assert_eq!(merged.playoff_start.week, 13);
    assert_eq!(merged.championship.week, 16);
    assert_eq!(merged.total_weeks, 16);
  }

  #[test]
  fn configured_calendar_weeks_follow_the_rules() {
    let stored = persisted_calendars(&[row! {
      "season_year" => 2024i64,
      "playoff_start_week" => 15i64,
      "championship_week" => 17i64,
      "playoff_start_from_flags" => false,
      "championship_from_flags" => false,
      "total_weeks" => 17i64,
    }]);
    let batch = Batch::from_json(json!({
      "leagues": [{ "league_id": "L1", "name": "Alpha", "season": 2024 }]
    }))
    .unwrap();
    let seasons = LeagueSeasons::new(&batch, &KeyCache::new());
    let rules = BusinessRules { playoff_start_week: 14, championship_week: 16, ..Default::default() };

    let calendar = season_calendars(&batch, &seasons, &stored, &rules)[&2024];
    assert_eq!(calendar.playoff_start, CalendarWeek { week: 14, from_flags: false });
    assert_eq!(calendar.championship, CalendarWeek { week: 16, from_flags: false });
    assert_eq!(calendar.total_weeks, 17);
  }

  #[test]
  fn weeks_skip_unknown_leagues_and_classify() {
    let batch = batch();
    let rules = BusinessRules::default();
    let seasons = LeagueSeasons::new(&batch, &KeyCache::new());
    let calendars = season_calendars(&batch, &seasons, &BTreeMap::new(), &rules);
    let weeks = build_weeks(&batch, &seasons, &calendars, &rules, at(2024, 9, 5));

    let numbers: Vec<u32> = weeks.iter().map(|w| w.week_number).collect();
    assert_eq!(numbers, vec![1, 15, 16]);
    assert_eq!(weeks[0].week_type, WeekType::Regular);
    assert!(weeks[0].is_current_week);
    assert_eq!(weeks[1].week_type, WeekType::Playoffs);
    assert_eq!(weeks[2].week_type, WeekType::Championship);
  }

  #[test]
  fn persisted_leagues_supply_missing_seasons() {
    let batch = Batch::from_json(json!({
      "rosters": [
        { "roster_id": "r1", "league_id": "L9", "team_id": "L9.t.1", "week": 2, "player_id": "1" }
      ]
    }))
    .unwrap();
    let mut persisted = KeyCache::new();
    persisted.absorb(TableId::DimLeague, &[row! {
      "league_key" => 1i64, "league_id" => "L9", "season_year" => 2023i64
    }]);
    let seasons = LeagueSeasons::new(&batch, &persisted);
    assert_eq!(seasons.get("L9"), Some(2023));
  }

  #[test]
  fn players_merge_sources_with_draft_position_priority() {
    let players = build_players(&batch(), at(2024, 9, 1));
    assert_eq!(players.len(), 2);
    let seven = players.iter().find(|p| p.player_id == "7").unwrap();
    assert_eq!(seven.primary_position, "CB");
    assert_eq!(seven.player_name, "Seven");
    let eight = players.iter().find(|p| p.player_id == "8").unwrap();
    assert_eq!(eight.primary_position, "Unknown");
    assert_eq!(eight.player_name, "Player 8");
  }

  #[test]
  fn teams_without_a_league_key_are_counted() {
    let batch = batch();
    let mut leagues = KeyCache::new();
    leagues.absorb(TableId::DimLeague, &[row! {
      "league_key" => 3i64, "league_id" => "L1", "season_year" => 2024i64
    }]);
    let (teams, skipped) = build_teams(&batch, &leagues, at(2024, 9, 1));
    assert_eq!(teams.len(), 1);
    assert_eq!(teams[0].league_key, SurrogateKey(3));
    assert_eq!(skipped, 1);

    let row = teams[0].clone().into_row();
    assert_eq!(row["valid_to"].as_str(), Some(OPEN_ENDED));
  }
}
