//! SQL schema for the Huddle SQLite warehouse.
//!
//! Executed at connection startup and again whenever a table is found
//! missing. Column lists must match the descriptors in `huddle_core::table`.

/// Full schema DDL; idempotent thanks to `CREATE ... IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- ── Dimensions ──────────────────────────────────────────────────────────
-- Surrogate keys are assigned here and never reused.

CREATE TABLE IF NOT EXISTS dim_season (
    season_key         INTEGER PRIMARY KEY AUTOINCREMENT,
    season_year        INTEGER NOT NULL UNIQUE,
    season_start_date  TEXT,
    season_end_date    TEXT,
    playoff_start_week INTEGER,
    championship_week  INTEGER,
    -- 1 when the week came from matchup flags rather than configuration
    playoff_start_from_flags INTEGER NOT NULL DEFAULT 0,
    championship_from_flags  INTEGER NOT NULL DEFAULT 0,
    total_weeks        INTEGER,
    is_current_season  INTEGER NOT NULL DEFAULT 0,
    season_status      TEXT,                -- 'active' | 'completed'
    valid_from         TEXT NOT NULL,
    valid_to           TEXT NOT NULL DEFAULT '9999-12-31'
);

CREATE TABLE IF NOT EXISTS dim_week (
    week_key        INTEGER PRIMARY KEY AUTOINCREMENT,
    season_year     INTEGER NOT NULL,
    week_number     INTEGER NOT NULL,
    week_type       TEXT NOT NULL,          -- 'regular' | 'playoffs' | 'championship'
    week_start_date TEXT,
    week_end_date   TEXT,
    is_current_week INTEGER NOT NULL DEFAULT 0,
    valid_from      TEXT NOT NULL,
    valid_to        TEXT NOT NULL DEFAULT '9999-12-31',
    UNIQUE (season_year, week_number)
);

CREATE TABLE IF NOT EXISTS dim_player (
    player_key       INTEGER PRIMARY KEY AUTOINCREMENT,
    player_id        TEXT NOT NULL UNIQUE,
    player_name      TEXT,
    primary_position TEXT,
    valid_from       TEXT NOT NULL,
    valid_to         TEXT NOT NULL DEFAULT '9999-12-31'
);

CREATE TABLE IF NOT EXISTS dim_league (
    league_key   INTEGER PRIMARY KEY AUTOINCREMENT,
    league_id    TEXT NOT NULL UNIQUE,
    league_name  TEXT NOT NULL,
    season_year  INTEGER NOT NULL,
    num_teams    INTEGER,
    league_type  TEXT,
    current_week INTEGER,
    draft_status TEXT,
    valid_from   TEXT NOT NULL,
    valid_to     TEXT NOT NULL DEFAULT '9999-12-31'
);

CREATE TABLE IF NOT EXISTS dim_team (
    team_key       INTEGER PRIMARY KEY AUTOINCREMENT,
    team_id        TEXT NOT NULL UNIQUE,
    league_key     INTEGER NOT NULL REFERENCES dim_league(league_key),
    team_name      TEXT NOT NULL,
    manager_name   TEXT,
    wins           INTEGER NOT NULL DEFAULT 0,
    losses         INTEGER NOT NULL DEFAULT 0,
    ties           INTEGER NOT NULL DEFAULT 0,
    points_for     REAL NOT NULL DEFAULT 0,
    points_against REAL NOT NULL DEFAULT 0,
    playoff_seed   INTEGER,
    faab_balance   REAL,
    valid_from     TEXT NOT NULL,
    valid_to       TEXT NOT NULL DEFAULT '9999-12-31'
);

-- ── Facts ───────────────────────────────────────────────────────────────
-- No uniqueness constraints: the load strategies own key discipline and
-- the store audit reports any violation.

CREATE TABLE IF NOT EXISTS fact_roster (
    roster_id        TEXT NOT NULL,
    league_key       INTEGER NOT NULL REFERENCES dim_league(league_key),
    team_key         INTEGER NOT NULL REFERENCES dim_team(team_key),
    player_key       INTEGER NOT NULL REFERENCES dim_player(player_key),
    week_key         INTEGER NOT NULL REFERENCES dim_week(week_key),
    season_year      INTEGER NOT NULL,
    is_starter       INTEGER NOT NULL DEFAULT 0,
    roster_position  TEXT,
    weekly_points    REAL,
    projected_points REAL,
    loaded_at        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS fact_matchup (
    matchup_id        TEXT NOT NULL,
    league_key        INTEGER NOT NULL REFERENCES dim_league(league_key),
    week_key          INTEGER NOT NULL REFERENCES dim_week(week_key),
    season_year       INTEGER NOT NULL,
    team1_key         INTEGER NOT NULL REFERENCES dim_team(team_key),
    team2_key         INTEGER NOT NULL REFERENCES dim_team(team_key),
    team1_points      REAL NOT NULL DEFAULT 0,
    team2_points      REAL NOT NULL DEFAULT 0,
    point_difference  REAL NOT NULL DEFAULT 0,
    total_points      REAL NOT NULL DEFAULT 0,
    winner_team_key   INTEGER REFERENCES dim_team(team_key),
    is_tie            INTEGER NOT NULL DEFAULT 0,
    margin_of_victory REAL NOT NULL DEFAULT 0,
    matchup_type      TEXT NOT NULL,        -- 'regular' | 'playoffs' | 'championship' | 'consolation'
    is_playoffs       INTEGER NOT NULL DEFAULT 0,
    is_championship   INTEGER NOT NULL DEFAULT 0,
    is_consolation    INTEGER NOT NULL DEFAULT 0,
    loaded_at         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS fact_team_performance (
    league_key         INTEGER NOT NULL REFERENCES dim_league(league_key),
    team_key           INTEGER NOT NULL REFERENCES dim_team(team_key),
    week_key           INTEGER NOT NULL REFERENCES dim_week(week_key),
    season_year        INTEGER NOT NULL,
    wins               INTEGER NOT NULL DEFAULT 0,
    losses             INTEGER NOT NULL DEFAULT 0,
    ties               INTEGER NOT NULL DEFAULT 0,
    points_for         REAL NOT NULL DEFAULT 0,
    points_against     REAL NOT NULL DEFAULT 0,
    point_differential REAL NOT NULL DEFAULT 0,
    loaded_at          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS fact_transaction (
    transaction_id     TEXT NOT NULL,
    league_key         INTEGER NOT NULL REFERENCES dim_league(league_key),
    player_key         INTEGER NOT NULL REFERENCES dim_player(player_key),
    season_year        INTEGER NOT NULL,
    transaction_date   TEXT NOT NULL,
    transaction_type   TEXT NOT NULL,
    from_team_key      INTEGER REFERENCES dim_team(team_key),
    to_team_key        INTEGER REFERENCES dim_team(team_key),
    faab_bid           REAL,
    transaction_status TEXT,
    loaded_at          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS fact_draft (
    draft_pick_id  TEXT NOT NULL,
    league_key     INTEGER NOT NULL REFERENCES dim_league(league_key),
    team_key       INTEGER NOT NULL REFERENCES dim_team(team_key),
    player_key     INTEGER NOT NULL REFERENCES dim_player(player_key),
    season_year    INTEGER NOT NULL,
    overall_pick   INTEGER NOT NULL,
    round_number   INTEGER NOT NULL,
    pick_in_round  INTEGER NOT NULL,
    draft_cost     REAL,
    is_keeper_pick INTEGER NOT NULL DEFAULT 0,
    loaded_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS fact_roster_period_idx      ON fact_roster(league_key, week_key);
CREATE INDEX IF NOT EXISTS fact_matchup_period_idx     ON fact_matchup(league_key, week_key);
CREATE INDEX IF NOT EXISTS fact_team_perf_period_idx  ON fact_team_performance(league_key, week_key);
CREATE INDEX IF NOT EXISTS fact_transaction_id_idx     ON fact_transaction(transaction_id);
CREATE INDEX IF NOT EXISTS fact_draft_id_idx           ON fact_draft(draft_pick_id);

-- ── Change detection ────────────────────────────────────────────────────

CREATE TABLE IF NOT EXISTS load_metadata (
    entity_type       TEXT PRIMARY KEY,
    last_processed_at TEXT NOT NULL,
    record_count      INTEGER NOT NULL
);

PRAGMA user_version = 2;
";
