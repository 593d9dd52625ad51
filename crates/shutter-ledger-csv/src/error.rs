//! Error type for `shutter-ledger-csv`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("ledger i/o error on {path:?}: {source}")]
  Io {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("csv error: {0}")]
  Csv(#[from] csv::Error),

  #[error("failed to encode ledger row: {0}")]
  Encode(#[source] std::io::Error),

  #[error("unexpected ledger header: {found:?}")]
  Header { found: Vec<String> },

  #[error("malformed ledger row at line {line}: {reason}")]
  Row { line: u64, reason: String },

  #[error("date/time parse error: {0}")]
  DateParse(String),
}

impl Error {
  pub(crate) fn io(path: &std::path::Path) -> impl FnOnce(std::io::Error) -> Self {
    let path = path.to_path_buf();
    move |source| Self::Io { path, source }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
