//! `huddle`: load fantasy-league batches into the SQLite warehouse.
//!
//! # Usage
//!
//! ```text
//! huddle load batch.json
//! huddle load batch.json --force-full
//! huddle audit --batch batch.json --store
//! huddle status
//! ```
//!
//! Settings come from `huddle.toml` (or `--config`) and `HUDDLE_*`
//! environment variables. Every command prints its report as JSON on stdout.

mod settings;

use std::{path::PathBuf, process::ExitCode};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use huddle_core::{
  audit::AuditReport,
  pipeline::{self, LoadOptions},
  record::Batch,
  store::Warehouse,
};
use huddle_store_sqlite::SqliteWarehouse;
use serde::Serialize;
use settings::Settings;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "huddle", version, about = "Incremental fantasy-league warehouse loader")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, global = true, default_value = "huddle.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Load a JSON batch into the warehouse.
  Load {
    /// Batch file: a JSON object keyed by entity type.
    batch:      PathBuf,
    /// Reload every entity type in the batch, changed or not.
    #[arg(long)]
    force_full: bool,
    /// Skip the duplicate audit of the batch before loading.
    #[arg(long)]
    skip_audit: bool,
  },

  /// Report duplicate records in a batch and/or the warehouse.
  Audit {
    #[arg(long, value_name = "FILE")]
    batch: Option<PathBuf>,
    /// Audit the persisted warehouse tables (the default without `--batch`).
    #[arg(long)]
    store: bool,
  },

  /// Show which entity types changed since their last successful load.
  Status,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;

  match cli.command {
    Command::Load { batch, force_full, skip_audit } => {
      load(&settings, &batch, force_full, skip_audit).await
    }
    Command::Audit { batch, store } => audit(&settings, batch.as_deref(), store).await,
    Command::Status => status(&settings).await,
  }
}

async fn open_store(settings: &Settings) -> anyhow::Result<SqliteWarehouse> {
  let path = &settings.store_path;
  SqliteWarehouse::open(path)
    .await
    .with_context(|| format!("failed to open warehouse at {path:?}"))
}

fn read_batch(path: &std::path::Path) -> anyhow::Result<Batch> {
  let raw = std::fs::read_to_string(path)
    .with_context(|| format!("reading batch file {}", path.display()))?;
  Batch::parse(&raw).with_context(|| format!("invalid batch {}", path.display()))
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

// ─── Commands ────────────────────────────────────────────────────────────────

async fn load(
  settings: &Settings,
  path: &std::path::Path,
  force_full: bool,
  skip_audit: bool,
) -> anyhow::Result<ExitCode> {
  let batch = read_batch(path)?;
  let plans = settings.plans();

  // Batch duplicates are reported but never block the load.
  if !skip_audit {
    let audit = pipeline::audit_batch(&batch)?;
    if !audit.summary.is_clean() {
      tracing::warn!(
        findings = audit.summary.findings,
        records = audit.summary.records_checked,
        "batch contains duplicate records"
      );
    }
  }

  let store = open_store(settings).await?;
  let cancel = CancellationToken::new();
  tokio::spawn({
    let cancel = cancel.clone();
    async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!("interrupt received, stopping after the current table");
        cancel.cancel();
      }
    }
  });

  let options = LoadOptions {
    force_full,
    rules: settings.rules.clone(),
    cancel,
    as_of: None,
  };
  let report = pipeline::run_incremental_load(&batch, &store, &plans, &options)
    .await
    .context("load aborted")?;

  // Table failures are reported, not fatal; only an unreachable store fails
  // the process.
  print_json(&report)?;
  Ok(ExitCode::SUCCESS)
}

#[derive(Serialize)]
struct AuditOutput {
  #[serde(skip_serializing_if = "Option::is_none")]
  batch: Option<AuditReport>,
  #[serde(skip_serializing_if = "Option::is_none")]
  store: Option<AuditReport>,
}

async fn audit(
  settings: &Settings,
  batch: Option<&std::path::Path>,
  store: bool,
) -> anyhow::Result<ExitCode> {
  let batch_report = match batch {
    Some(path) => Some(pipeline::audit_batch(&read_batch(path)?)?),
    None => None,
  };
  let store_report = if store || batch.is_none() {
    let warehouse = open_store(settings).await?;
    Some(pipeline::audit_store(&warehouse).await.context("store audit failed")?)
  } else {
    None
  };

  let clean = [&batch_report, &store_report]
    .into_iter()
    .flatten()
    .all(|r| r.summary.is_clean());
  print_json(&AuditOutput { batch: batch_report, store: store_report })?;
  Ok(if clean { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

async fn status(settings: &Settings) -> anyhow::Result<ExitCode> {
  #[derive(Serialize)]
  struct StatusOutput {
    changes:  huddle_core::change::ChangeSet,
    metadata: Vec<huddle_core::change::ChangeMetadata>,
  }

  let store = open_store(settings).await?;
  let changes = pipeline::detect_store_changes(&store)
    .await
    .context("change detection failed")?;
  let metadata = store
    .change_metadata()
    .await
    .context("failed to read load metadata")?;

  print_json(&StatusOutput { changes, metadata })?;
  Ok(ExitCode::SUCCESS)
}
