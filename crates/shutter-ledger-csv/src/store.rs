//! [`CsvLedger`] — the CSV-file implementation of [`SubmissionLedger`].

use std::{
  io,
  path::{Path, PathBuf},
  sync::Arc,
};

use chrono::NaiveDateTime;
use shutter_core::{ledger::SubmissionLedger, submission::SubmissionRecord};
use tokio::{
  fs::{self, OpenOptions},
  io::AsyncWriteExt as _,
  sync::RwLock,
};
use tracing::{debug, warn};

use crate::{
  Error, Result,
  encode::{HEADER, check_header, decode_record, encode_record, encode_row},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A submission ledger backed by a single append-only CSV file.
///
/// Appends take the write half of an in-process lock and land as one
/// `write` on a file opened in append mode; scans take the read half, so a
/// reader never observes a half-written row. Cloning is cheap — clones share
/// the lock.
#[derive(Clone)]
pub struct CsvLedger {
  inner: Arc<Inner>,
}

struct Inner {
  path: PathBuf,
  lock: RwLock<()>,
}

impl CsvLedger {
  /// Open the ledger at `path`, creating the parent directory and the file
  /// (with its header row) if needed.
  ///
  /// A trailing row without a terminating newline is the remnant of an
  /// interrupted append; it is truncated away so later appends start on a
  /// fresh line.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref().to_path_buf();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      fs::create_dir_all(parent).await.map_err(Error::io(parent))?;
    }

    let existing = match fs::read(&path).await {
      Ok(bytes) => bytes,
      Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
      Err(e) => return Err(Error::io(&path)(e)),
    };

    let complete = complete_len(&existing);
    if complete < existing.len() {
      warn!(
        path = %path.display(),
        dropped_bytes = existing.len() - complete,
        "truncating incomplete trailing ledger row"
      );
      let file = OpenOptions::new()
        .write(true)
        .open(&path)
        .await
        .map_err(Error::io(&path))?;
      file.set_len(complete as u64).await.map_err(Error::io(&path))?;
      file.sync_all().await.map_err(Error::io(&path))?;
    }

    if complete == 0 {
      debug!(path = %path.display(), "creating ledger");
      write_append(&path, &encode_row(HEADER)?).await?;
    } else {
      let header = csv::ReaderBuilder::new()
        .from_reader(&existing[..complete])
        .headers()?
        .clone();
      check_header(&header)?;
    }

    Ok(Self {
      inner: Arc::new(Inner {
        path,
        lock: RwLock::new(()),
      }),
    })
  }

  pub fn path(&self) -> &Path { &self.inner.path }

  /// Parse every complete row, in file order.
  async fn scan(&self) -> Result<Vec<SubmissionRecord>> {
    let bytes = {
      let _guard = self.inner.lock.read().await;
      fs::read(&self.inner.path)
        .await
        .map_err(Error::io(&self.inner.path))?
    };
    parse_rows(&bytes[..complete_len(&bytes)])
  }
}

// ─── SubmissionLedger impl ───────────────────────────────────────────────────

impl SubmissionLedger for CsvLedger {
  type Error = Error;

  async fn append(&self, record: SubmissionRecord) -> Result<()> {
    let row = encode_record(&record)?;
    let _guard = self.inner.lock.write().await;
    write_append(&self.inner.path, &row).await
  }

  async fn most_recent(&self, subject_id: &str) -> Result<Option<NaiveDateTime>> {
    let records = self.scan().await?;
    Ok(
      records
        .iter()
        .rev()
        .find(|r| r.subject_id == subject_id)
        .map(|r| r.received_at),
    )
  }

  async fn records(&self) -> Result<Vec<SubmissionRecord>> { self.scan().await }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Length of the prefix made of newline-terminated lines.
fn complete_len(bytes: &[u8]) -> usize {
  bytes
    .iter()
    .rposition(|&b| b == b'\n')
    .map_or(0, |i| i + 1)
}

fn parse_rows(bytes: &[u8]) -> Result<Vec<SubmissionRecord>> {
  if bytes.is_empty() {
    return Ok(Vec::new());
  }

  let mut reader = csv::ReaderBuilder::new().from_reader(bytes);
  check_header(reader.headers()?)?;

  reader
    .records()
    .map(|row| decode_record(&row?))
    .collect()
}

async fn write_append(path: &Path, bytes: &[u8]) -> Result<()> {
  let mut file = OpenOptions::new()
    .create(true)
    .append(true)
    .open(path)
    .await
    .map_err(Error::io(path))?;
  file.write_all(bytes).await.map_err(Error::io(path))?;
  file.sync_data().await.map_err(Error::io(path))?;
  Ok(())
}
