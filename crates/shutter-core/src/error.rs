//! Error types for `shutter-core`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid {field}: {value:?}")]
  InvalidId { field: &'static str, value: String },

  #[error("failed to read blocklist {path:?}: {source}")]
  Blocklist {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The ledger could not be read or appended to. A failed read is never
  /// treated as "no prior submission".
  #[error("ledger error: {0}")]
  Ledger(#[source] Box<dyn std::error::Error + Send + Sync>),

  /// The acceptance collaborator failed to retrieve or store the payload.
  #[error("submission could not be stored: {0}")]
  Accept(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// `true` for failures of durable storage (ledger or payload), as opposed
  /// to malformed input.
  pub fn is_storage_failure(&self) -> bool {
    matches!(self, Self::Ledger(_) | Self::Accept(_))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
