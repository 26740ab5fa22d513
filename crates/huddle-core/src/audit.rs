//! Duplicate auditing.
//!
//! Three independent passes over a set of rows: primary-key collisions,
//! business-key collisions and exact-record collisions. The exact-record pass
//! compares SHA-256 fingerprints of each row with volatile bookkeeping columns
//! removed, so two extractions of the same record taken at different times
//! still collide.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::{
  entity::EntityType,
  row::{Row, key_of},
  table::TableId,
};

/// Columns that change between otherwise identical records.
pub const VOLATILE_FIELDS: &[&str] =
  &["extracted_at", "created_at", "updated_at", "loaded_at", "valid_from", "valid_to"];

// ─── Findings ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKind {
  PrimaryKey,
  BusinessKey,
  ExactRecord,
}

/// Duplicates in a staged batch are `High`; duplicates already persisted are
/// `Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
  High,
  Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateFinding {
  /// Entity type or warehouse table name.
  pub entity_type:            String,
  pub kind:                   DuplicateKind,
  /// The colliding key tuple, or the fingerprint for exact-record findings.
  pub key:                    Vec<String>,
  pub matched_record_indices: Vec<usize>,
  pub severity:               Severity,
}

impl DuplicateFinding {
  pub fn affected_records(&self) -> usize { self.matched_record_indices.len() }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditSummary {
  pub targets_checked: usize,
  pub records_checked: usize,
  pub findings:        usize,
  pub by_kind:         BTreeMap<DuplicateKind, usize>,
  pub by_severity:     BTreeMap<Severity, usize>,
}

impl AuditSummary {
  pub fn is_clean(&self) -> bool { self.findings == 0 }
}

/// Findings and the summary for one audit run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditReport {
  pub summary:  AuditSummary,
  pub findings: Vec<DuplicateFinding>,
}

impl AuditReport {
  pub fn push(&mut self, records: usize, findings: Vec<DuplicateFinding>) {
    let summary = &mut self.summary;
    summary.targets_checked += 1;
    summary.records_checked += records;
    summary.findings += findings.len();
    for finding in &findings {
      *summary.by_kind.entry(finding.kind).or_default() += 1;
      *summary.by_severity.entry(finding.severity).or_default() += 1;
    }
    self.findings.extend(findings);
  }
}

// ─── Rules ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRule {
  pub target:       &'static str,
  pub primary_key:  Option<&'static [&'static str]>,
  pub business_key: &'static [&'static str],
  /// Extra columns ignored by the exact-record pass.
  pub ignored:      &'static [&'static str],
}

/// The rule for a staged batch section.
pub fn batch_rule(entity: EntityType) -> AuditRule {
  let (primary, business): (&'static [&'static str], &'static [&'static str]) = match entity {
    EntityType::Leagues => (&["league_id"], &["league_id"]),
    EntityType::Teams => (&["team_id"], &["league_id", "name"]),
    EntityType::Rosters => (&["roster_id"], &["team_id", "week", "player_id"]),
    EntityType::Matchups => (&["matchup_id"], &["league_id", "week", "team1_id", "team2_id"]),
    EntityType::Transactions => {
      (&["transaction_id"], &["league_id", "timestamp", "player_id", "type"])
    }
    EntityType::DraftPicks => (&["draft_pick_id"], &["league_id", "pick_number"]),
  };
  AuditRule {
    target:       entity.into(),
    primary_key:  Some(primary),
    business_key: business,
    ignored:      &[],
  }
}

/// The rule for a persisted warehouse table.
pub fn store_rule(table: TableId) -> AuditRule {
  let spec = table.spec();
  let (primary_key, business_key): (Option<&'static [&'static str]>, &'static [&'static str]) =
    match table {
      TableId::FactRoster => (None, &["team_key", "week_key", "player_key"]),
      TableId::FactMatchup => {
        (Some(&["matchup_id"]), &["league_key", "week_key", "team1_key", "team2_key"])
      }
      TableId::FactTransaction => (
        Some(&["transaction_id"]),
        &["league_key", "transaction_date", "player_key", "transaction_type"],
      ),
      TableId::FactDraft => (Some(&["draft_pick_id"]), &["league_key", "overall_pick"]),
      _ => (spec.surrogate_key.as_ref().map(std::slice::from_ref), spec.natural_key),
    };
  AuditRule {
    target: table.name(),
    primary_key,
    business_key,
    ignored: spec.surrogate_key.as_ref().map(std::slice::from_ref).unwrap_or_default(),
  }
}

// ─── Passes ──────────────────────────────────────────────────────────────────

/// SHA-256 over the canonical JSON of `row` without volatile columns.
pub fn fingerprint(row: &Row, ignored: &[&str]) -> String {
  let mut hasher = Sha256::new();
  for (column, cell) in row {
    if VOLATILE_FIELDS.contains(&column.as_str()) || ignored.contains(&column.as_str()) {
      continue;
    }
    hasher.update(column.as_bytes());
    hasher.update([0]);
    // Serialising a cell cannot fail; an empty write keeps the hash stable.
    hasher.update(serde_json::to_vec(cell).unwrap_or_default());
    hasher.update([0]);
  }
  hex::encode(hasher.finalize())
}

fn collisions(keys: impl Iterator<Item = (usize, Vec<String>)>) -> Vec<(Vec<String>, Vec<usize>)> {
  let mut groups: BTreeMap<Vec<String>, Vec<usize>> = BTreeMap::new();
  for (index, key) in keys {
    groups.entry(key).or_default().push(index);
  }
  groups.into_iter().filter(|(_, indices)| indices.len() > 1).collect()
}

fn key_collisions(rows: &[Row], columns: &[&str]) -> Vec<(Vec<String>, Vec<usize>)> {
  // Rows missing any key column cannot collide on it.
  collisions(
    rows
      .iter()
      .enumerate()
      .map(|(i, row)| (i, key_of(row, columns)))
      .filter(|(_, key)| key.iter().all(|part| !part.is_empty())),
  )
}

/// Run all three passes over `rows` under `rule`.
pub fn audit_rows(rule: &AuditRule, rows: &[Row], severity: Severity) -> Vec<DuplicateFinding> {
  let finding = |kind, (key, matched_record_indices): (Vec<String>, Vec<usize>)| DuplicateFinding {
    entity_type: rule.target.to_owned(),
    kind,
    key,
    matched_record_indices,
    severity,
  };

  let mut findings = Vec::new();
  if let Some(primary_key) = rule.primary_key {
    findings.extend(
      key_collisions(rows, primary_key)
        .into_iter()
        .map(|c| finding(DuplicateKind::PrimaryKey, c)),
    );
  }
  findings.extend(
    key_collisions(rows, rule.business_key)
      .into_iter()
      .map(|c| finding(DuplicateKind::BusinessKey, c)),
  );
  let fingerprints = rows
    .iter()
    .enumerate()
    .map(|(i, row)| (i, vec![fingerprint(row, rule.ignored)]));
  findings.extend(
    collisions(fingerprints)
      .into_iter()
      .map(|c| finding(DuplicateKind::ExactRecord, c)),
  );

  if !findings.is_empty() {
    let kinds: BTreeSet<DuplicateKind> = findings.iter().map(|f| f.kind).collect();
    tracing::warn!(
      target_name = rule.target,
      findings = findings.len(),
      ?kinds,
      ?severity,
      "duplicates found"
    );
  }
  findings
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::row;

  fn roster(id: &str, team: &str, week: i64, player: &str, extracted_at: &str) -> Row {
    row! {
      "roster_id" => id, "team_id" => team, "week" => week, "player_id" => player,
      "extracted_at" => extracted_at,
    }
  }

  #[test]
  fn detects_each_kind_independently() {
    let rows = vec![
      roster("r1", "t1", 1, "p1", "2024-10-01"),
      // same primary key, different record
      roster("r1", "t2", 1, "p2", "2024-10-01"),
      // same business key as r1, different id
      roster("r9", "t1", 1, "p1", "2024-10-01"),
      // exact copy of r3 apart from the extraction time
      roster("r9", "t1", 1, "p1", "2024-10-02"),
    ];
    let findings = audit_rows(&batch_rule(EntityType::Rosters), &rows, Severity::High);

    let of = |kind| findings.iter().filter(|f| f.kind == kind).collect::<Vec<_>>();
    let primary = of(DuplicateKind::PrimaryKey);
    assert_eq!(primary.len(), 2);
    assert_eq!(primary[0].key, vec!["r1".to_owned()]);
    assert_eq!(primary[0].matched_record_indices, vec![0, 1]);

    let business = of(DuplicateKind::BusinessKey);
    assert_eq!(business.len(), 1);
    assert_eq!(business[0].affected_records(), 3);

    let exact = of(DuplicateKind::ExactRecord);
    assert_eq!(exact.len(), 1);
    assert_eq!(exact[0].matched_record_indices, vec![2, 3]);
    assert!(findings.iter().all(|f| f.severity == Severity::High));
  }

  #[test]
  fn clean_rows_produce_no_findings() {
    let rows = vec![roster("r1", "t1", 1, "p1", "x"), roster("r2", "t1", 1, "p2", "x")];
    assert!(audit_rows(&batch_rule(EntityType::Rosters), &rows, Severity::High).is_empty());
  }

  #[test]
  fn store_rules_ignore_surrogate_keys_for_fingerprints() {
    let rule = store_rule(TableId::DimPlayer);
    assert_eq!(rule.primary_key, Some(&["player_key"][..]));
    assert_eq!(rule.business_key, &["player_id"]);
    let a = row! { "player_key" => 1i64, "player_id" => "7", "valid_from" => "2024-09-01" };
    let b = row! { "player_key" => 2i64, "player_id" => "7", "valid_from" => "2024-09-08" };
    assert_eq!(fingerprint(&a, rule.ignored), fingerprint(&b, rule.ignored));

    let findings = audit_rows(&rule, &[a, b], Severity::Critical);
    let kinds: Vec<DuplicateKind> = findings.iter().map(|f| f.kind).collect();
    assert_eq!(kinds, vec![DuplicateKind::BusinessKey, DuplicateKind::ExactRecord]);
    assert!(store_rule(TableId::FactRoster).primary_key.is_none());
  }

  #[test]
  fn report_summarises_findings() {
    let rows = vec![roster("r1", "t1", 1, "p1", "x"), roster("r1", "t1", 1, "p1", "y")];
    let mut report = AuditReport::default();
    report.push(rows.len(), audit_rows(&batch_rule(EntityType::Rosters), &rows, Severity::High));
    assert_eq!(report.summary.records_checked, 2);
    assert_eq!(report.summary.findings, 3);
    assert_eq!(report.summary.by_severity[&Severity::High], 3);
    assert!(!report.summary.is_clean());
  }
}
