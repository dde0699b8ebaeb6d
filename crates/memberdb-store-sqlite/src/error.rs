//! Error type for `memberdb-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown registration status: {0:?}")]
  UnknownStatus(String),

  /// An update targeted a row that does not exist.
  #[error("{table} {id} not found")]
  NotFound { table: &'static str, id: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
