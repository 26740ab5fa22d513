//! Operator configuration.
//!
//! An optional TOML file layered under `HUDDLE_*` environment variables.
//! Nested keys use a double underscore, e.g.
//! `HUDDLE_RULES__PLAYOFF_START_WEEK=14`.

use std::{
  collections::BTreeMap,
  path::{Path, PathBuf},
};

use anyhow::Context as _;
use huddle_core::{
  plan::{LoadPlans, Strategy},
  rules::BusinessRules,
  table::TableId,
};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  /// SQLite warehouse file. A leading `~/` is expanded.
  pub store_path: PathBuf,
  pub rules:      BusinessRules,
  /// Per-table strategy overrides layered on the default plans.
  pub plans:      BTreeMap<TableId, Strategy>,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      store_path: PathBuf::from("huddle.db"),
      rules:      BusinessRules::default(),
      plans:      BTreeMap::new(),
    }
  }
}

impl Settings {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    Self::from_builder(
      config::Config::builder().add_source(config::File::from(path).required(false)),
    )
  }

  fn from_builder(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
  ) -> anyhow::Result<Self> {
    let settings: Self = builder
      .add_source(config::Environment::with_prefix("HUDDLE").separator("__"))
      .build()
      .context("failed to read configuration")?
      .try_deserialize()
      .context("failed to deserialise Settings")?;
    Ok(Self { store_path: expand_tilde(&settings.store_path), ..settings })
  }

  pub fn plans(&self) -> LoadPlans { LoadPlans::with_overrides(self.plans.clone()) }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
