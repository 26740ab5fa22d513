//! Error types for `huddle-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown entity type: {0:?}")]
  UnknownEntityType(String),

  #[error("batch must be a JSON object keyed by entity type")]
  MalformedBatch,

  #[error("invalid {entity} record at index {index}: {source}")]
  InvalidRecord {
    entity: &'static str,
    index:  usize,
    #[source]
    source: serde_json::Error,
  },

  #[error("load plan for {table} names unknown column {column:?}")]
  UnknownPlanColumn { table: String, column: String },

  #[error("load plan for {0} declares an empty key")]
  EmptyPlanKey(String),

  #[error("invalid business rule: {0}")]
  InvalidRule(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
