//! Submission records — the unit of the audit ledger.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One admitted submission. Immutable once written to a ledger.
///
/// `received_at` is naive local wall-clock time; append order is assumed to
/// match chronological order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
  pub subject_id:    String,
  pub submission_id: String,
  pub received_at:   NaiveDateTime,
}

impl SubmissionRecord {
  pub fn new(
    subject_id: impl Into<String>,
    submission_id: impl Into<String>,
    received_at: NaiveDateTime,
  ) -> Self {
    Self {
      subject_id: subject_id.into(),
      submission_id: submission_id.into(),
      received_at,
    }
  }
}

/// An inbound submission as delivered by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionEvent {
  pub subject_id:    String,
  pub submission_id: String,
}

/// Reject ids that are empty, could escape the image directory once joined
/// into a file name, or carry control characters. A line break inside a
/// ledger field would let a torn append cut the file mid-record.
pub fn validate_id(field: &'static str, value: &str) -> Result<()> {
  let bad = value.is_empty()
    || value.contains(['/', '\\'])
    || value.contains("..")
    || value.chars().any(char::is_control);
  if bad {
    return Err(Error::InvalidId {
      field,
      value: value.to_owned(),
    });
  }
  Ok(())
}
