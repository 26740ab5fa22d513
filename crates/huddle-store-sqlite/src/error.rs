//! Error type for `huddle-store-sqlite`.

use huddle_core::store::{Failure, StoreError};
use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] huddle_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("table {table} has no column {column:?}")]
  UnknownColumn { table: &'static str, column: String },

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown entity type in load metadata: {0:?}")]
  UnknownEntityType(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl StoreError for Error {
  fn failure(&self) -> Failure {
    let Self::Database(db) = self else { return Failure::Other };
    match db {
      tokio_rusqlite::Error::ConnectionClosed | tokio_rusqlite::Error::Close(_) => {
        Failure::Connection
      }
      tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, message)) => {
        match e.code {
          ErrorCode::CannotOpen | ErrorCode::NotADatabase | ErrorCode::PermissionDenied => {
            Failure::Connection
          }
          _ if message.as_deref().is_some_and(|m| m.starts_with("no such table")) => {
            Failure::SchemaMissing
          }
          _ => Failure::Other,
        }
      }
      _ => Failure::Other,
    }
  }
}
