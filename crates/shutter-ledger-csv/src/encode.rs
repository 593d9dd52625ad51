//! Encoding and decoding helpers between [`SubmissionRecord`] and CSV rows.
//!
//! Timestamps are naive local time in a sortable ISO 8601 form; fractional
//! seconds are written only when non-zero, so `2024-01-01T10:00:00` and
//! `2024-01-01T10:00:00.250` are both valid.

use chrono::NaiveDateTime;
use csv::StringRecord;
use shutter_core::submission::SubmissionRecord;

use crate::{Error, Result};

/// Header row written when the ledger file is created.
pub const HEADER: [&str; 3] = ["subject_id", "submission_id", "received_at"];

/// Header used by ledgers written before the columns were renamed. Still
/// accepted on read.
pub(crate) const LEGACY_HEADER: [&str; 3] = ["user_id", "file_id", "received_time"];

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

// ─── NaiveDateTime ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: NaiveDateTime) -> String { dt.format(TIMESTAMP_FORMAT).to_string() }

pub fn decode_dt(s: &str) -> Result<NaiveDateTime> {
  NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Rows ────────────────────────────────────────────────────────────────────

/// Encode one row, newline-terminated, as a single buffer so it can be
/// appended with one write.
pub fn encode_row<'a>(fields: impl IntoIterator<Item = &'a str>) -> Result<Vec<u8>> {
  let mut writer = csv::WriterBuilder::new()
    .terminator(csv::Terminator::Any(b'\n'))
    .from_writer(Vec::new());
  writer.write_record(fields)?;
  writer.into_inner().map_err(|e| Error::Encode(e.into_error()))
}

pub fn encode_record(record: &SubmissionRecord) -> Result<Vec<u8>> {
  let received_at = encode_dt(record.received_at);
  encode_row([
    record.subject_id.as_str(),
    record.submission_id.as_str(),
    received_at.as_str(),
  ])
}

pub fn decode_record(row: &StringRecord) -> Result<SubmissionRecord> {
  let line = row.position().map_or(0, |p| p.line());
  let field = move |i: usize, name: &str| {
    row.get(i).ok_or_else(|| Error::Row {
      line,
      reason: format!("missing {name}"),
    })
  };

  Ok(SubmissionRecord {
    subject_id:    field(0, "subject_id")?.to_owned(),
    submission_id: field(1, "submission_id")?.to_owned(),
    received_at:   decode_dt(field(2, "received_at")?).map_err(|e| Error::Row {
      line,
      reason: e.to_string(),
    })?,
  })
}

pub fn check_header(header: &StringRecord) -> Result<()> {
  let found: Vec<&str> = header.iter().collect();
  if found == HEADER || found == LEGACY_HEADER {
    Ok(())
  } else {
    Err(Error::Header {
      found: found.into_iter().map(str::to_owned).collect(),
    })
  }
}
