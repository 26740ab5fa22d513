//! League calendar rules.
//!
//! Everything here is configuration. The playoff and championship week numbers
//! are only consulted when a batch carries no matchup flags to derive them
//! from.

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessRules {
  /// Calendar month a season starts in; earlier months belong to the
  /// previous season.
  pub season_start_month:   u32,
  pub playoff_start_week:   u32,
  pub championship_week:    u32,
  pub regular_season_weeks: u32,
  /// Lineup slots that do not count as starting.
  pub bench_slots:          Vec<String>,
  pub leagues:              LeagueScope,
}

impl Default for BusinessRules {
  fn default() -> Self {
    Self {
      season_start_month:   9,
      playoff_start_week:   15,
      championship_week:    17,
      regular_season_weeks: 17,
      bench_slots:          ["BN", "IR", "IR+", "NA"].map(String::from).into(),
      leagues:              LeagueScope::default(),
    }
  }
}

/// The leagues of record. With nothing configured every league is loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeagueScope {
  /// Never loaded, whatever the other settings say.
  pub excluded:            Vec<String>,
  pub included:            Vec<String>,
  /// Leagues of this season or later are loaded without being listed.
  pub include_from_season: Option<i32>,
}

impl LeagueScope {
  fn includes_all(&self) -> bool { self.included.is_empty() && self.include_from_season.is_none() }

  pub fn is_unrestricted(&self) -> bool { self.includes_all() && self.excluded.is_empty() }

  /// `season` is `None` for a league the batch does not describe. Such a
  /// league is admitted unless excluded: its records can only resolve
  /// against a league already in the warehouse.
  pub fn admits(&self, league_id: &str, season: Option<i32>) -> bool {
    if self.excluded.iter().any(|id| id == league_id) {
      return false;
    }
    if self.includes_all() || self.included.iter().any(|id| id == league_id) {
      return true;
    }
    match (season, self.include_from_season) {
      (None, _) => true,
      (Some(season), Some(from)) => season >= from,
      (Some(_), None) => false,
    }
  }
}

/// Week classification within a season.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeekType {
  Regular,
  Playoffs,
  Championship,
}

impl WeekType {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Regular => "regular",
      Self::Playoffs => "playoffs",
      Self::Championship => "championship",
    }
  }
}

impl BusinessRules {
  pub fn validate(&self) -> Result<()> {
    if !(1..=12).contains(&self.season_start_month) {
      return Err(Error::InvalidRule(format!(
        "season_start_month must be 1-12, got {}",
        self.season_start_month
      )));
    }
    if self.playoff_start_week == 0 || self.championship_week < self.playoff_start_week {
      return Err(Error::InvalidRule(format!(
        "championship_week ({}) must not precede playoff_start_week ({})",
        self.championship_week, self.playoff_start_week
      )));
    }
    if self.regular_season_weeks == 0 {
      return Err(Error::InvalidRule("regular_season_weeks must be positive".into()));
    }
    Ok(())
  }

  /// The season a calendar date belongs to.
  pub fn season_year_of(&self, date: NaiveDate) -> i32 {
    if date.month() < self.season_start_month {
      date.year() - 1
    } else {
      date.year()
    }
  }

  pub fn is_starter(&self, slot: Option<&str>) -> bool {
    let slot = slot.map(str::trim).filter(|s| !s.is_empty()).unwrap_or("BN");
    !self.bench_slots.iter().any(|b| b.eq_ignore_ascii_case(slot))
  }

  /// Classify a week from its number alone.
  pub fn week_type_by_number(&self, week: u32) -> WeekType {
    classify(week, self.playoff_start_week, self.championship_week)
  }

  pub fn season_start_date(&self, season: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(season, self.season_start_month, 1)
  }
}

/// Classify `week` against explicit playoff and championship week numbers.
pub fn classify(week: u32, playoff_start: u32, championship: u32) -> WeekType {
  if week >= championship {
    WeekType::Championship
  } else if week >= playoff_start {
    WeekType::Playoffs
  } else {
    WeekType::Regular
  }
}

/// January 31 of the year after the season starts.
pub fn season_end_date(season: i32) -> Option<NaiveDate> {
  NaiveDate::from_ymd_opt(season + 1, 1, 31)
}

/// Week 1 starts the Tuesday after the first Monday of September; weeks span
/// seven days. Returns `(start, end)` inclusive.
pub fn week_dates(season: i32, week: u32) -> Option<(NaiveDate, NaiveDate)> {
  let first_monday = NaiveDate::from_weekday_of_month_opt(season, 9, Weekday::Mon, 1)?;
  let week_one = first_monday.checked_add_days(Days::new(1))?;
  let start = week_one.checked_add_days(Days::new(7 * u64::from(week.saturating_sub(1))))?;
  let end = start.checked_add_days(Days::new(6))?;
  Some((start, end))
}

/// Parse an upstream timestamp. Accepts RFC 3339, `YYYY-MM-DDTHH:MM:SS` and
/// `YYYY-MM-DD HH:MM:SS` (both with optional fractional seconds),
/// `YYYY-MM-DD` and Unix epoch seconds.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
  let raw = raw.trim();
  if raw.is_empty() {
    return None;
  }
  if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
    return Some(dt.naive_utc());
  }
  for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
      return Some(dt);
    }
  }
  if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
    return date.and_hms_opt(0, 0, 0);
  }
  raw
    .parse::<i64>()
    .ok()
    .and_then(|secs| DateTime::from_timestamp(secs, 0))
    .map(|dt| dt.naive_utc())
}
