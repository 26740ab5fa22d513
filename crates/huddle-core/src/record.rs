//! Operational records: the typed form of an incoming batch.
//!
//! A batch arrives as a JSON object keyed by entity type. It is validated once
//! at the boundary into the structs below; nothing downstream touches loose
//! maps. Field names follow the upstream collector so the same records can be
//! audited for duplicates by column name.

use std::{
  borrow::Cow,
  collections::{BTreeMap, HashMap},
};

use serde::{Deserialize, Deserializer, Serialize};

use crate::{
  Error, Result,
  entity::EntityType,
  row::{Row, row_from_json},
  rules::LeagueScope,
};

// ─── Lenient numeric fields ──────────────────────────────────────────────────

/// Upstream sends some integers as strings (`"season": "2024"`).
fn int_or_string<'de, D, T>(de: D) -> std::result::Result<T, D::Error>
where
  D: Deserializer<'de>,
  T: std::str::FromStr + TryFrom<i64>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Raw {
    Int(i64),
    Str(String),
  }

  match Raw::deserialize(de)? {
    Raw::Int(i) => T::try_from(i).map_err(|_| serde::de::Error::custom("integer out of range")),
    Raw::Str(s) => s
      .trim()
      .parse()
      .map_err(|_| serde::de::Error::custom(format!("not an integer: {s:?}"))),
  }
}

fn opt_int_or_string<'de, D, T>(de: D) -> std::result::Result<Option<T>, D::Error>
where
  D: Deserializer<'de>,
  T: std::str::FromStr + TryFrom<i64>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Raw {
    Int(i64),
    Str(String),
  }

  match Option::<Raw>::deserialize(de)? {
    None => Ok(None),
    Some(Raw::Int(i)) => T::try_from(i)
      .map(Some)
      .map_err(|_| serde::de::Error::custom("integer out of range")),
    Some(Raw::Str(s)) if s.trim().is_empty() => Ok(None),
    Some(Raw::Str(s)) => s
      .trim()
      .parse()
      .map(Some)
      .map_err(|_| serde::de::Error::custom(format!("not an integer: {s:?}"))),
  }
}

// ─── Records ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeagueRecord {
  pub league_id:    String,
  pub name:         String,
  #[serde(deserialize_with = "int_or_string")]
  pub season:       i32,
  #[serde(default, deserialize_with = "int_or_string")]
  pub num_teams:    u32,
  #[serde(default, deserialize_with = "opt_int_or_string")]
  pub current_week: Option<u32>,
  #[serde(default, deserialize_with = "opt_int_or_string")]
  pub start_week:   Option<u32>,
  #[serde(default, deserialize_with = "opt_int_or_string")]
  pub end_week:     Option<u32>,
  #[serde(default)]
  pub league_type:  Option<String>,
  #[serde(default)]
  pub draft_status: Option<String>,
  #[serde(default)]
  pub extracted_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRecord {
  pub team_id:        String,
  pub league_id:      String,
  pub name:           String,
  #[serde(default)]
  pub manager_name:   Option<String>,
  #[serde(default, deserialize_with = "int_or_string")]
  pub wins:           u32,
  #[serde(default, deserialize_with = "int_or_string")]
  pub losses:         u32,
  #[serde(default, deserialize_with = "int_or_string")]
  pub ties:           u32,
  #[serde(default)]
  pub points_for:     f64,
  #[serde(default)]
  pub points_against: f64,
  #[serde(default, deserialize_with = "opt_int_or_string")]
  pub playoff_seed:   Option<u32>,
  #[serde(default)]
  pub faab_balance:   Option<f64>,
  #[serde(default)]
  pub extracted_at:   Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterRecord {
  pub roster_id:         String,
  pub league_id:         String,
  pub team_id:           String,
  #[serde(deserialize_with = "int_or_string")]
  pub week:              u32,
  pub player_id:         String,
  #[serde(default)]
  pub player_name:       Option<String>,
  #[serde(default)]
  pub position:          Option<String>,
  /// The lineup slot the player occupied (e.g. `QB`, `BN`, `IR`).
  #[serde(default)]
  pub selected_position: Option<String>,
  #[serde(default)]
  pub status:            Option<String>,
  #[serde(default)]
  pub player_points:     Option<f64>,
  #[serde(default)]
  pub projected_points:  Option<f64>,
  #[serde(default)]
  pub extracted_at:      Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchupRecord {
  pub matchup_id:      String,
  pub league_id:       String,
  #[serde(deserialize_with = "int_or_string")]
  pub week:            u32,
  pub team1_id:        String,
  pub team2_id:        String,
  #[serde(default)]
  pub team1_score:     f64,
  #[serde(default)]
  pub team2_score:     f64,
  #[serde(default)]
  pub is_playoffs:     bool,
  #[serde(default)]
  pub is_championship: bool,
  #[serde(default)]
  pub is_consolation:  bool,
  #[serde(default)]
  pub extracted_at:    Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
  pub transaction_id:      String,
  pub league_id:           String,
  /// Raw upstream timestamp; parsed by the fact transformer.
  pub timestamp:           String,
  #[serde(rename = "type")]
  pub kind:                String,
  pub player_id:           String,
  #[serde(default)]
  pub player_name:         Option<String>,
  #[serde(default)]
  pub source_team_id:      Option<String>,
  #[serde(default)]
  pub destination_team_id: Option<String>,
  #[serde(default)]
  pub faab_bid:            Option<f64>,
  #[serde(default)]
  pub status:              Option<String>,
  #[serde(default)]
  pub extracted_at:        Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftPickRecord {
  pub draft_pick_id: String,
  pub league_id:     String,
  pub team_id:       String,
  pub player_id:     String,
  #[serde(default)]
  pub player_name:   Option<String>,
  #[serde(default)]
  pub position:      Option<String>,
  #[serde(deserialize_with = "int_or_string")]
  pub pick_number:   u32,
  #[serde(default, deserialize_with = "opt_int_or_string")]
  pub round_number:  Option<u32>,
  #[serde(default, deserialize_with = "opt_int_or_string")]
  pub pick_in_round: Option<u32>,
  #[serde(default)]
  pub cost:          Option<f64>,
  #[serde(default)]
  pub is_keeper:     bool,
  #[serde(default)]
  pub extracted_at:  Option<String>,
}

// ─── Tagged union ────────────────────────────────────────────────────────────

/// One validated operational record of any entity type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OperationalRecord {
  League(LeagueRecord),
  Team(TeamRecord),
  Roster(RosterRecord),
  Matchup(MatchupRecord),
  Transaction(TransactionRecord),
  DraftPick(DraftPickRecord),
}

impl OperationalRecord {
  pub fn entity_type(&self) -> EntityType {
    match self {
      Self::League(_) => EntityType::Leagues,
      Self::Team(_) => EntityType::Teams,
      Self::Roster(_) => EntityType::Rosters,
      Self::Matchup(_) => EntityType::Matchups,
      Self::Transaction(_) => EntityType::Transactions,
      Self::DraftPick(_) => EntityType::DraftPicks,
    }
  }

  /// The record as a flat row keyed by upstream field name.
  pub fn to_row(&self) -> Result<Row> {
    match serde_json::to_value(self)? {
      serde_json::Value::Object(map) => Ok(row_from_json(&map)),
      _ => Err(Error::MalformedBatch),
    }
  }
}

// ─── Batch ───────────────────────────────────────────────────────────────────

/// A validated batch. A section is `Some` when the entity type was present in
/// the input, even if empty, so the change detector can tell "absent" from
/// "zero records".
#[derive(Debug, Clone, Default)]
pub struct Batch {
  pub leagues:      Option<Vec<LeagueRecord>>,
  pub teams:        Option<Vec<TeamRecord>>,
  pub rosters:      Option<Vec<RosterRecord>>,
  pub matchups:     Option<Vec<MatchupRecord>>,
  pub transactions: Option<Vec<TransactionRecord>>,
  pub draft_picks:  Option<Vec<DraftPickRecord>>,
}

/// Drop the records of `section` whose league `keep` rejects.
fn retain_section<T>(
  section: &mut Option<Vec<T>>,
  league_of: impl Fn(&T) -> &str,
  keep: &impl Fn(&str) -> bool,
) -> u64 {
  let Some(records) = section else { return 0 };
  let before = records.len();
  records.retain(|record| keep(league_of(record)));
  (before - records.len()) as u64
}

fn parse_section<T: for<'de> Deserialize<'de>>(
  entity: EntityType,
  value: serde_json::Value,
) -> Result<Vec<T>> {
  let items = match value {
    serde_json::Value::Array(items) => items,
    serde_json::Value::Null => Vec::new(),
    _ => return Err(Error::MalformedBatch),
  };
  items
    .into_iter()
    .enumerate()
    .map(|(index, item)| {
      serde_json::from_value(item).map_err(|source| Error::InvalidRecord {
        entity: entity.into(),
        index,
        source,
      })
    })
    .collect()
}

impl Batch {
  /// Validate a raw JSON batch. Unknown entity types are rejected.
  pub fn from_json(value: serde_json::Value) -> Result<Self> {
    let serde_json::Value::Object(sections) = value else {
      return Err(Error::MalformedBatch);
    };

    let mut batch = Self::default();
    for (name, section) in sections {
      let entity: EntityType = name.parse().map_err(|_| Error::UnknownEntityType(name.clone()))?;
      match entity {
        EntityType::Leagues => batch.leagues = Some(parse_section(entity, section)?),
        EntityType::Teams => batch.teams = Some(parse_section(entity, section)?),
        EntityType::Rosters => batch.rosters = Some(parse_section(entity, section)?),
        EntityType::Matchups => batch.matchups = Some(parse_section(entity, section)?),
        EntityType::Transactions => {
          batch.transactions = Some(parse_section(entity, section)?)
        }
        EntityType::DraftPicks => batch.draft_picks = Some(parse_section(entity, section)?),
      }
    }
    Ok(batch)
  }

  pub fn parse(raw: &str) -> Result<Self> { Self::from_json(serde_json::from_str(raw)?) }

  /// Record counts for every entity type present in the batch.
  pub fn counts(&self) -> BTreeMap<EntityType, u64> {
    let mut counts = BTreeMap::new();
    let mut put = |entity, len: Option<usize>| {
      if let Some(len) = len {
        counts.insert(entity, len as u64);
      }
    };
    put(EntityType::Leagues, self.leagues.as_ref().map(Vec::len));
    put(EntityType::Teams, self.teams.as_ref().map(Vec::len));
    put(EntityType::Rosters, self.rosters.as_ref().map(Vec::len));
    put(EntityType::Matchups, self.matchups.as_ref().map(Vec::len));
    put(EntityType::Transactions, self.transactions.as_ref().map(Vec::len));
    put(EntityType::DraftPicks, self.draft_picks.as_ref().map(Vec::len));
    counts
  }

  pub fn leagues(&self) -> &[LeagueRecord] { self.leagues.as_deref().unwrap_or_default() }

  pub fn teams(&self) -> &[TeamRecord] { self.teams.as_deref().unwrap_or_default() }

  pub fn rosters(&self) -> &[RosterRecord] { self.rosters.as_deref().unwrap_or_default() }

  pub fn matchups(&self) -> &[MatchupRecord] { self.matchups.as_deref().unwrap_or_default() }

  pub fn transactions(&self) -> &[TransactionRecord] {
    self.transactions.as_deref().unwrap_or_default()
  }

  pub fn draft_picks(&self) -> &[DraftPickRecord] {
    self.draft_picks.as_deref().unwrap_or_default()
  }

  /// The batch restricted to the leagues `scope` admits, with the number of
  /// records dropped. Borrowed when nothing can be dropped.
  pub fn scoped(&self, scope: &LeagueScope) -> (Cow<'_, Self>, u64) {
    if scope.is_unrestricted() {
      return (Cow::Borrowed(self), 0);
    }
    let seasons: HashMap<&str, i32> =
      self.leagues().iter().map(|l| (l.league_id.as_str(), l.season)).collect();
    let keep = |league_id: &str| scope.admits(league_id, seasons.get(league_id).copied());

    let mut scoped = self.clone();
    let dropped = retain_section(&mut scoped.leagues, |r| r.league_id.as_str(), &keep)
      + retain_section(&mut scoped.teams, |r| r.league_id.as_str(), &keep)
      + retain_section(&mut scoped.rosters, |r| r.league_id.as_str(), &keep)
      + retain_section(&mut scoped.matchups, |r| r.league_id.as_str(), &keep)
      + retain_section(&mut scoped.transactions, |r| r.league_id.as_str(), &keep)
      + retain_section(&mut scoped.draft_picks, |r| r.league_id.as_str(), &keep);
    (Cow::Owned(scoped), dropped)
  }

  /// All records of one entity type as tagged-union values, in input order.
  pub fn records(&self, entity: EntityType) -> Vec<OperationalRecord> {
    match entity {
      EntityType::Leagues => self.leagues().iter().cloned().map(OperationalRecord::League).collect(),
      EntityType::Teams => self.teams().iter().cloned().map(OperationalRecord::Team).collect(),
      EntityType::Rosters => self.rosters().iter().cloned().map(OperationalRecord::Roster).collect(),
      EntityType::Matchups => {
        self.matchups().iter().cloned().map(OperationalRecord::Matchup).collect()
      }
      EntityType::Transactions => self
        .transactions()
        .iter()
        .cloned()
        .map(OperationalRecord::Transaction)
        .collect(),
      EntityType::DraftPicks => self
        .draft_picks()
        .iter()
        .cloned()
        .map(OperationalRecord::DraftPick)
        .collect(),
    }
  }
}

// ─── Identifier normalisation ────────────────────────────────────────────────

/// Strip the game prefix from a player key (`"449.p.30123"` → `"30123"`).
pub fn normalize_player_id(raw: &str) -> &str {
  raw.rsplit_once(".p.").map_or(raw, |(_, id)| id)
}

/// Expand a bare draft-pick team number into a full team key
/// (`"3"` in league `"449.l.1"` → `"449.l.1.t.3"`).
pub fn full_team_id(league_id: &str, team_id: &str) -> String {
  if team_id.contains(".t.") {
    team_id.to_owned()
  } else {
    format!("{league_id}.t.{team_id}")
  }
}
