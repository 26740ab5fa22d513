//! Integration tests for `SqliteWarehouse` driven through the load pipeline
//! against an in-memory database.

use chrono::{NaiveDate, NaiveDateTime};
use huddle_core::{
  audit::{DuplicateKind, Severity},
  dimension::CALENDAR_COLUMNS,
  entity::EntityType,
  pipeline::{
    LoadOptions, PipelineError, audit_store, detect_store_changes, run_incremental_load,
  },
  plan::LoadPlans,
  record::Batch,
  report::{EntityStatus, LoadReport},
  row,
  row::Cell,
  rules::{BusinessRules, LeagueScope},
  store::Warehouse,
  table::TableId,
};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::SqliteWarehouse;

async fn store() -> SqliteWarehouse {
  SqliteWarehouse::open_in_memory()
    .await
    .expect("in-memory store")
}

fn at(day: u32) -> NaiveDateTime {
  NaiveDate::from_ymd_opt(2024, 9, day)
    .unwrap()
    .and_hms_opt(12, 0, 0)
    .unwrap()
}

fn options(day: u32) -> LoadOptions {
  LoadOptions { as_of: Some(at(day)), ..Default::default() }
}

fn full(day: u32) -> LoadOptions {
  LoadOptions { force_full: true, ..options(day) }
}

fn leagues() -> Vec<Value> {
  ["L1", "L2"]
    .iter()
    .map(|id| {
      json!({
        "league_id": id,
        "name": format!("League {id}"),
        "season": 2024,
        "num_teams": 5,
        "end_week": 17,
      })
    })
    .collect()
}

fn teams() -> Vec<Value> {
  let mut teams = Vec::new();
  for league in ["L1", "L2"] {
    for n in 1..=5 {
      teams.push(json!({
        "team_id": format!("{league}.t.{n}"),
        "league_id": league,
        "name": format!("{league} team {n}"),
        "wins": n,
      }));
    }
  }
  teams
}

fn roster(league: &str, team: u32, player: u32, slot: &str) -> Value {
  json!({
    "roster_id": format!("r{player}"),
    "league_id": league,
    "team_id": format!("{league}.t.{team}"),
    "week": 1,
    "player_id": format!("p{player}"),
    "player_name": format!("Player Number {player}"),
    "position": "WR",
    "selected_position": slot,
    "player_points": 10.5,
  })
}

/// Two leagues of five teams with five players each: 25 roster rows per
/// league.
fn rosters() -> Vec<Value> {
  let mut rosters = Vec::new();
  let mut player = 0;
  for league in ["L1", "L2"] {
    for team in 1..=5 {
      for slot in ["QB", "WR", "RB", "BN", "IR"] {
        player += 1;
        rosters.push(roster(league, team, player, slot));
      }
    }
  }
  rosters
}

fn scenario() -> Value {
  json!({ "leagues": leagues(), "teams": teams(), "rosters": rosters() })
}

fn batch(value: Value) -> Batch { Batch::from_json(value).expect("valid batch") }

async fn load(s: &SqliteWarehouse, value: Value, options: &LoadOptions) -> LoadReport {
  run_incremental_load(&batch(value), s, &LoadPlans::default(), options)
    .await
    .expect("load")
}

async fn count(s: &SqliteWarehouse, table: TableId) -> u64 { s.row_count(table).await.unwrap() }

async fn recorded(s: &SqliteWarehouse, entity: EntityType) -> Option<u64> {
  s.change_metadata()
    .await
    .unwrap()
    .into_iter()
    .find(|m| m.entity_type == entity)
    .map(|m| m.record_count)
}

// ─── End to end ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn first_load_populates_dimensions_and_facts() {
  let s = store().await;
  let report = load(&s, scenario(), &options(5)).await;

  assert!(report.first_run);
  assert!(report.is_success(), "{:?}", report.errors);
  assert_eq!(count(&s, TableId::DimLeague).await, 2);
  assert_eq!(count(&s, TableId::DimTeam).await, 10);
  assert_eq!(count(&s, TableId::DimPlayer).await, 50);
  assert_eq!(count(&s, TableId::DimSeason).await, 1);
  assert_eq!(count(&s, TableId::DimWeek).await, 1);
  assert_eq!(count(&s, TableId::FactRoster).await, 50);

  for entity in [EntityType::Leagues, EntityType::Teams, EntityType::Rosters] {
    assert_eq!(report.entity(entity).unwrap().status, EntityStatus::Succeeded);
  }
  assert_eq!(recorded(&s, EntityType::Rosters).await, Some(50));

  let starters = s
    .select(TableId::FactRoster, &["is_starter"])
    .await
    .unwrap()
    .into_iter()
    .filter(|r| r["is_starter"] == Cell::Int(1))
    .count();
  assert_eq!(starters, 30);
}

#[tokio::test]
async fn unchanged_rerun_touches_nothing() {
  let s = store().await;
  load(&s, scenario(), &options(5)).await;

  let report = load(&s, scenario(), &options(6)).await;
  assert!(!report.first_run);
  assert!(report.tables.is_empty());
  assert!(report.entities.iter().all(|e| e.status == EntityStatus::Unchanged));
  assert_eq!(count(&s, TableId::FactRoster).await, 50);
}

#[tokio::test]
async fn forced_rerun_is_idempotent() {
  let s = store().await;
  load(&s, scenario(), &options(5)).await;

  let report = load(&s, scenario(), &full(6)).await;
  assert!(report.first_run);
  assert!(report.is_success(), "{:?}", report.errors);
  assert_eq!(count(&s, TableId::DimLeague).await, 2);
  assert_eq!(count(&s, TableId::DimTeam).await, 10);
  assert_eq!(count(&s, TableId::FactRoster).await, 50);

  let leagues = report.table(TableId::DimLeague).unwrap();
  assert_eq!(leagues.strategy, "upsert");
  assert_eq!((leagues.stats.inserted, leagues.stats.updated), (0, 0));
  let rosters = report.table(TableId::FactRoster).unwrap();
  assert_eq!(rosters.strategy, "incremental_append");
  assert_eq!((rosters.stats.deleted, rosters.stats.inserted), (50, 50));
}

#[tokio::test]
async fn surrogate_keys_and_valid_from_survive_reloads() {
  let s = store().await;
  load(&s, scenario(), &options(5)).await;
  let columns = ["team_id", "team_key", "valid_from"];
  let before = s.select(TableId::DimTeam, &columns).await.unwrap();

  let mut changed = scenario();
  changed["teams"][0]["name"] = json!("Renamed");
  load(&s, changed, &full(12)).await;

  let after = s.select(TableId::DimTeam, &columns).await.unwrap();
  assert_eq!(before, after);
  let names = s.select(TableId::DimTeam, &["team_name"]).await.unwrap();
  assert_eq!(names[0]["team_name"], Cell::Text("Renamed".into()));
}

// ─── Strategies ──────────────────────────────────────────────────────────────

fn league_row(name: &str, season: i64) -> huddle_core::row::Row {
  row! {
    "league_id" => "X",
    "league_name" => name,
    "season_year" => season,
    "valid_from" => "2024-09-01",
    "valid_to" => "9999-12-31",
  }
}

#[tokio::test]
async fn upsert_updates_only_changed_mutable_fields() {
  let s = store().await;
  let plans = LoadPlans::default();
  let upsert = plans.get(TableId::DimLeague);

  let stats = s
    .apply(TableId::DimLeague, upsert, vec![league_row("Old", 2024)])
    .await
    .unwrap();
  assert_eq!(stats.inserted, 1);

  // Last occurrence wins; the immutable season is left alone.
  let stats = s
    .apply(TableId::DimLeague, upsert, vec![league_row("Mid", 2025), league_row("New", 2025)])
    .await
    .unwrap();
  assert_eq!((stats.inserted, stats.updated, stats.skipped), (0, 1, 1));

  let rows = s
    .select(TableId::DimLeague, &["league_key", "league_name", "season_year"])
    .await
    .unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0]["league_key"], Cell::Int(1));
  assert_eq!(rows[0]["league_name"], Cell::Text("New".into()));
  assert_eq!(rows[0]["season_year"], Cell::Int(2024));

  let stats = s
    .apply(TableId::DimLeague, upsert, vec![league_row("New", 2024)])
    .await
    .unwrap();
  assert_eq!(stats.updated, 0);
}

#[tokio::test]
async fn replace_without_a_plan_swaps_the_table() {
  let s = store().await;
  s.apply(TableId::DimLeague, None, vec![league_row("One", 2024)]).await.unwrap();

  let stats = s.apply(TableId::DimLeague, None, vec![]).await.unwrap();
  assert_eq!((stats.deleted, stats.inserted), (1, 0));
  assert_eq!(count(&s, TableId::DimLeague).await, 0);
}

#[tokio::test]
async fn unknown_select_column_is_rejected() {
  let s = store().await;
  let err = s.select(TableId::DimTeam, &["nickname"]).await.unwrap_err();
  assert!(matches!(err, crate::Error::UnknownColumn { table: "dim_team", .. }));
}

#[tokio::test]
async fn incremental_append_replaces_only_batch_periods() {
  let s = store().await;
  load(&s, scenario(), &options(5)).await;

  // League L1 comes back with one player fewer; L2's period is untouched.
  let l1: Vec<Value> = rosters()
    .into_iter()
    .filter(|r| r["league_id"] == "L1")
    .skip(1)
    .collect();
  let report = load(&s, json!({ "rosters": l1 }), &options(6)).await;

  assert!(report.is_success(), "{:?}", report.errors);
  let rosters = report.table(TableId::FactRoster).unwrap();
  assert_eq!((rosters.stats.deleted, rosters.stats.inserted), (25, 24));
  assert_eq!(count(&s, TableId::FactRoster).await, 49);
  assert_eq!(recorded(&s, EntityType::Rosters).await, Some(24));
}

#[tokio::test]
async fn append_only_skips_known_and_repeated_keys() {
  let s = store().await;
  let mut value = scenario();
  let added = json!({
    "transaction_id": "tx1",
    "league_id": "L1",
    "timestamp": "2024-09-04T10:00:00Z",
    "type": "add",
    "player_id": "p1",
    "destination_team_id": "L1.t.1",
    "faab_bid": 12.0,
  });
  value["transactions"] = json!([
    added.clone(),
    added,
    {
      "transaction_id": "tx2",
      "league_id": "L1",
      "timestamp": "2024-09-04 08:30:00",
      "type": "drop",
      "player_id": "p2",
      "source_team_id": "L1.t.1",
      "status": "pending",
    },
    {
      "transaction_id": "tx3",
      "league_id": "L1",
      "timestamp": "sometime tuesday",
      "type": "add",
      "player_id": "p3",
    },
  ]);

  let report = load(&s, value.clone(), &options(5)).await;
  let stats = report.table(TableId::FactTransaction).unwrap().stats;
  assert_eq!((stats.inserted, stats.skipped), (2, 1));
  assert_eq!(report.skipped_unparsable, 1);
  assert_eq!(count(&s, TableId::FactTransaction).await, 2);

  let report = load(&s, value, &full(6)).await;
  let stats = report.table(TableId::FactTransaction).unwrap().stats;
  assert_eq!((stats.inserted, stats.skipped), (0, 3));
  assert_eq!(count(&s, TableId::FactTransaction).await, 2);

  let rows = s
    .select(TableId::FactTransaction, &["transaction_id", "transaction_status", "to_team_key"])
    .await
    .unwrap();
  assert_eq!(rows[0]["transaction_status"], Cell::Text("completed".into()));
  assert_eq!(rows[1]["transaction_status"], Cell::Text("pending".into()));
  assert_eq!(rows[1]["to_team_key"], Cell::Null);
}

// ─── Facts ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn matchups_and_draft_picks_load_end_to_end() {
  let s = store().await;
  let mut value = scenario();
  value["matchups"] = json!([
    {
      "matchup_id": "m1", "league_id": "L1", "week": 1,
      "team1_id": "L1.t.1", "team2_id": "L1.t.2", "team1_score": 100.0, "team2_score": 90.0,
    },
    {
      "matchup_id": "m2", "league_id": "L1", "week": 1,
      "team1_id": "L1.t.3", "team2_id": "L1.t.4", "team1_score": 80.0, "team2_score": 80.0,
    },
  ]);
  value["draft_picks"] = json!([
    {
      "draft_pick_id": "d1", "league_id": "L1", "team_id": "1", "player_id": "p1",
      "pick_number": 1, "round_number": 1, "pick_in_round": 1,
    },
    {
      "draft_pick_id": "d2", "league_id": "L1", "team_id": "2", "player_id": "449.p.77",
      "player_name": "Late Pick", "position": "TE,FLEX", "pick_number": 7,
    },
  ]);

  let report = load(&s, value, &options(5)).await;
  assert!(report.is_success(), "{:?}", report.errors);

  let matchups = s
    .select(TableId::FactMatchup, &["matchup_id", "winner_team_key", "is_tie", "matchup_type"])
    .await
    .unwrap();
  assert_eq!(matchups.len(), 2);
  assert!(!matchups[0]["winner_team_key"].is_null());
  assert_eq!(matchups[1]["winner_team_key"], Cell::Null);
  assert_eq!(matchups[1]["is_tie"], Cell::Int(1));
  assert_eq!(matchups[0]["matchup_type"], Cell::Text("regular".into()));

  let picks = s
    .select(TableId::FactDraft, &["draft_pick_id", "round_number", "pick_in_round"])
    .await
    .unwrap();
  assert_eq!(picks.len(), 2);
  assert_eq!(picks[1]["round_number"], Cell::Int(1));
  assert_eq!(picks[1]["pick_in_round"], Cell::Int(2));

  let performance = s
    .select(TableId::FactTeamPerformance, &["wins", "losses", "ties", "point_differential"])
    .await
    .unwrap();
  assert_eq!(performance.len(), 4);
  let wins = performance.iter().filter(|r| r["wins"] == Cell::Int(1)).count();
  let ties = performance.iter().filter(|r| r["ties"] == Cell::Int(1)).count();
  assert_eq!((wins, ties), (1, 2));
  assert!(performance.iter().any(|r| r["point_differential"] == Cell::Real(-10.0)));

  let players = s
    .select(TableId::DimPlayer, &["player_id", "player_name", "primary_position"])
    .await
    .unwrap();
  let late = players.iter().find(|p| p["player_id"] == Cell::Text("77".into())).unwrap();
  assert_eq!(late["player_name"], Cell::Text("Late Pick".into()));
  assert_eq!(late["primary_position"], Cell::Text("TE".into()));
}

#[tokio::test]
async fn unresolved_references_are_skipped_and_counted() {
  let s = store().await;
  let mut value = scenario();
  let rosters = value["rosters"].as_array_mut().unwrap();
  rosters.push(roster("L1", 99, 51, "QB"));
  rosters.push(roster("L9", 1, 52, "QB"));

  let report = load(&s, value, &options(5)).await;
  assert!(report.is_success(), "{:?}", report.errors);
  assert_eq!(report.skipped_unresolved, 2);
  assert_eq!(count(&s, TableId::FactRoster).await, 50);
  assert_eq!(report.entity(EntityType::Rosters).unwrap().status, EntityStatus::Succeeded);

  let orphans: i64 = s
    .conn
    .call(|conn| {
      Ok(conn.query_row(
        "SELECT COUNT(*) FROM fact_roster f
         LEFT JOIN dim_league l ON l.league_key = f.league_key
         LEFT JOIN dim_team   t ON t.team_key   = f.team_key
         LEFT JOIN dim_player p ON p.player_key = f.player_key
         LEFT JOIN dim_week   w ON w.week_key   = f.week_key
         WHERE l.league_key IS NULL OR t.team_key IS NULL
            OR p.player_key IS NULL OR w.week_key IS NULL",
        [],
        |row| row.get(0),
      )?)
    })
    .await
    .unwrap();
  assert_eq!(orphans, 0);
}

fn matchup(id: &str, week: u32, playoffs: bool, championship: bool) -> Value {
  json!({
    "matchup_id": id,
    "league_id": "L1",
    "week": week,
    "team1_id": "L1.t.1",
    "team2_id": "L1.t.2",
    "team1_score": 100.0,
    "team2_score": 90.0,
    "is_playoffs": playoffs,
    "is_championship": championship,
  })
}

async fn week_type(s: &SqliteWarehouse, week: i64) -> Cell {
  s.select(TableId::DimWeek, &["week_number", "week_type"])
    .await
    .unwrap()
    .into_iter()
    .find(|w| w["week_number"] == Cell::Int(week))
    .map(|w| w["week_type"].clone())
    .unwrap()
}

#[tokio::test]
async fn partial_weekly_batch_keeps_season_history() {
  let s = store().await;
  let mut value = scenario();
  value["matchups"] = (1..=16)
    .map(|week| matchup(&format!("m{week}"), week, week >= 14, week == 16))
    .collect();
  load(&s, value, &options(5)).await;

  let before = s.select(TableId::DimSeason, CALENDAR_COLUMNS).await.unwrap();
  assert_eq!(before[0]["playoff_start_week"], Cell::Int(14));
  assert_eq!(before[0]["championship_week"], Cell::Int(16));
  assert_eq!(before[0]["total_weeks"], Cell::Int(16));
  assert_eq!(week_type(&s, 14).await, Cell::Text("playoffs".into()));

  let mut late = roster("L1", 1, 1, "QB");
  late["week"] = json!(14);
  let partial = json!({
    "leagues": leagues(),
    "matchups": [matchup("m5-replay", 5, false, false)],
    "rosters": [late],
  });
  let report = load(&s, partial, &full(20)).await;
  assert!(report.is_success(), "{:?}", report.errors);

  let after = s.select(TableId::DimSeason, CALENDAR_COLUMNS).await.unwrap();
  assert_eq!(before, after);
  assert_eq!(week_type(&s, 14).await, Cell::Text("playoffs".into()));
  assert_eq!(week_type(&s, 16).await, Cell::Text("championship".into()));
}

#[tokio::test]
async fn leagues_outside_the_scope_are_not_loaded() {
  let s = store().await;
  let rules = BusinessRules {
    leagues: LeagueScope { excluded: vec!["L2".into()], ..Default::default() },
    ..Default::default()
  };
  let options = LoadOptions { rules, ..options(5) };

  let report = load(&s, scenario(), &options).await;
  assert!(report.is_success(), "{:?}", report.errors);
  assert_eq!(report.skipped_out_of_scope, 1 + 5 + 25);
  assert_eq!(count(&s, TableId::DimLeague).await, 1);
  assert_eq!(count(&s, TableId::DimTeam).await, 5);
  assert_eq!(count(&s, TableId::FactRoster).await, 25);
  assert_eq!(recorded(&s, EntityType::Rosters).await, Some(25));

  let rerun = load(&s, scenario(), &LoadOptions { as_of: Some(at(6)), ..options }).await;
  assert!(rerun.entities.iter().all(|e| e.status == EntityStatus::Unchanged));
}

// ─── Failures ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_types_keep_their_previous_metadata() {
  let s = store().await;
  load(&s, scenario(), &options(5)).await;

  // Without a plan dim_team falls back to REPLACE, which the facts'
  // foreign keys refuse.
  let mut plans = LoadPlans::default();
  plans.remove(TableId::DimTeam);
  let mut value = scenario();
  value["teams"]
    .as_array_mut()
    .unwrap()
    .push(json!({ "team_id": "L1.t.6", "league_id": "L1", "name": "Expansion" }));
  value["rosters"].as_array_mut().unwrap().push(roster("L1", 6, 51, "QB"));

  let report = run_incremental_load(&batch(value), &s, &plans, &options(6))
    .await
    .unwrap();

  assert!(!report.is_success());
  assert_eq!(report.errors[0].table, Some(TableId::DimTeam));
  assert_eq!(report.entity(EntityType::Teams).unwrap().status, EntityStatus::Failed);
  assert_eq!(report.entity(EntityType::Rosters).unwrap().status, EntityStatus::Failed);
  assert_eq!(report.entity(EntityType::Leagues).unwrap().status, EntityStatus::Unchanged);
  assert_eq!(recorded(&s, EntityType::Teams).await, Some(10));
  assert_eq!(recorded(&s, EntityType::Rosters).await, Some(50));
  assert_eq!(count(&s, TableId::DimTeam).await, 10);
}

#[tokio::test]
async fn dropped_table_is_recreated_and_retried() {
  let s = store().await;
  load(&s, scenario(), &options(5)).await;
  s.conn
    .call(|conn| {
      conn.execute_batch("DROP TABLE fact_roster")?;
      Ok(())
    })
    .await
    .unwrap();

  let report = load(&s, scenario(), &full(6)).await;
  assert!(report.is_success(), "{:?}", report.errors);
  let rosters = report.table(TableId::FactRoster).unwrap();
  assert_eq!((rosters.stats.deleted, rosters.stats.inserted), (0, 50));
  assert_eq!(count(&s, TableId::FactRoster).await, 50);
}

#[tokio::test]
async fn missing_metadata_means_first_run() {
  let s = store().await;
  load(&s, scenario(), &options(5)).await;
  s.conn
    .call(|conn| {
      conn.execute_batch("DROP TABLE load_metadata")?;
      Ok(())
    })
    .await
    .unwrap();

  let report = load(&s, scenario(), &options(6)).await;
  assert!(report.first_run);
  assert!(report.is_success(), "{:?}", report.errors);
  assert_eq!(count(&s, TableId::FactRoster).await, 50);
  assert_eq!(s.change_metadata().await.unwrap().len(), 3);
}

#[tokio::test]
async fn cancelled_run_writes_nothing() {
  let s = store().await;
  let cancel = CancellationToken::new();
  cancel.cancel();
  let options = LoadOptions { cancel, ..options(5) };

  let report = load(&s, scenario(), &options).await;
  assert!(report.cancelled);
  assert!(report.tables.is_empty());
  assert!(report.entities.iter().all(|e| e.status == EntityStatus::Cancelled));
  assert!(s.change_metadata().await.unwrap().is_empty());
}

#[tokio::test]
async fn closed_connection_aborts_the_run() {
  let s = store().await;
  s.clone().conn.close().await.unwrap();

  let result =
    run_incremental_load(&batch(scenario()), &s, &LoadPlans::default(), &options(5)).await;
  assert!(matches!(result, Err(PipelineError::Connection(_))));
}

// ─── Status & audit ──────────────────────────────────────────────────────────

#[tokio::test]
async fn store_changes_compare_table_counts_with_metadata() {
  let s = store().await;
  assert!(detect_store_changes(&s).await.unwrap().first_run);

  load(&s, scenario(), &options(5)).await;
  let changes = detect_store_changes(&s).await.unwrap();
  assert!(!changes.first_run);
  assert!(!changes.is_dirty(EntityType::Leagues));
  assert!(!changes.is_dirty(EntityType::Rosters));
  assert!(changes.is_dirty(EntityType::Matchups));
}

#[tokio::test]
async fn store_audit_reports_persisted_duplicates() {
  let s = store().await;
  load(&s, scenario(), &options(5)).await;

  let clean = audit_store(&s).await.unwrap();
  assert!(clean.summary.is_clean(), "{:?}", clean.findings);
  assert_eq!(clean.summary.targets_checked, 10);

  s.conn
    .call(|conn| {
      conn.execute_batch("INSERT INTO fact_roster SELECT * FROM fact_roster WHERE rowid = 1")?;
      Ok(())
    })
    .await
    .unwrap();

  let report = audit_store(&s).await.unwrap();
  assert!(!report.findings.is_empty());
  assert!(report.findings.iter().all(|f| f.entity_type == "fact_roster"));
  assert!(report.findings.iter().all(|f| f.severity == Severity::Critical));
  let kinds: Vec<DuplicateKind> = report.findings.iter().map(|f| f.kind).collect();
  assert!(kinds.contains(&DuplicateKind::BusinessKey));
  assert!(kinds.contains(&DuplicateKind::ExactRecord));
}
