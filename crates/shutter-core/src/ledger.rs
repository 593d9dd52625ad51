//! The `SubmissionLedger` trait and an in-memory implementation.
//!
//! The trait is implemented by storage backends (e.g. `shutter-ledger-csv`).
//! The intake handler depends on this abstraction, not on any concrete
//! backend.

use std::{
  collections::HashMap,
  convert::Infallible,
  future::Future,
  sync::{PoisonError, RwLock},
};

use chrono::NaiveDateTime;

use crate::submission::SubmissionRecord;

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Append-only log of admitted submissions.
///
/// Records are never mutated or deleted. Implementations must serialise
/// concurrent appends, and a lookup running alongside an append must only
/// ever observe complete records.
pub trait SubmissionLedger: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Durably append one record as a single atomic write.
  fn append(
    &self,
    record: SubmissionRecord,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Timestamp of the newest record for `subject_id`, scanning from the end
  /// of the log backward. `None` if the subject has never been recorded.
  fn most_recent<'a>(
    &'a self,
    subject_id: &'a str,
  ) -> impl Future<Output = Result<Option<NaiveDateTime>, Self::Error>> + Send + 'a;

  /// Every record in append order.
  fn records(
    &self,
  ) -> impl Future<Output = Result<Vec<SubmissionRecord>, Self::Error>> + Send + '_;
}

// ─── In-memory ───────────────────────────────────────────────────────────────

/// A non-durable ledger held in process memory — useful for testing.
#[derive(Debug, Default)]
pub struct MemoryLedger {
  records: RwLock<Vec<SubmissionRecord>>,
}

impl MemoryLedger {
  pub fn new() -> Self { Self::default() }

  pub fn len(&self) -> usize {
    self.records.read().unwrap_or_else(PoisonError::into_inner).len()
  }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl SubmissionLedger for MemoryLedger {
  type Error = Infallible;

  async fn append(&self, record: SubmissionRecord) -> Result<(), Infallible> {
    self
      .records
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .push(record);
    Ok(())
  }

  async fn most_recent(
    &self,
    subject_id: &str,
  ) -> Result<Option<NaiveDateTime>, Infallible> {
    let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
    Ok(
      records
        .iter()
        .rev()
        .find(|r| r.subject_id == subject_id)
        .map(|r| r.received_at),
    )
  }

  async fn records(&self) -> Result<Vec<SubmissionRecord>, Infallible> {
    Ok(self.records.read().unwrap_or_else(PoisonError::into_inner).clone())
  }
}

// ─── Indexed ─────────────────────────────────────────────────────────────────

/// Wraps a ledger with an in-memory `subject_id → last timestamp` map.
///
/// The map is rebuilt from the wrapped ledger on construction and updated
/// after every successful append, never moving a subject's entry backward;
/// the wrapped ledger stays the source of truth. Lookups never touch the
/// backend.
pub struct IndexedLedger<L> {
  inner: L,
  index: RwLock<HashMap<String, NaiveDateTime>>,
}

impl<L: SubmissionLedger> IndexedLedger<L> {
  /// Scan `inner` once and index the last record of every subject.
  pub async fn build(inner: L) -> Result<Self, L::Error> {
    let mut index = HashMap::new();
    for record in inner.records().await? {
      index.insert(record.subject_id, record.received_at);
    }
    Ok(Self {
      inner,
      index: RwLock::new(index),
    })
  }

  pub fn inner(&self) -> &L { &self.inner }

  /// Number of distinct subjects indexed.
  pub fn subjects(&self) -> usize {
    self.index.read().unwrap_or_else(PoisonError::into_inner).len()
  }
}

impl<L: SubmissionLedger> SubmissionLedger for IndexedLedger<L> {
  type Error = L::Error;

  async fn append(&self, record: SubmissionRecord) -> Result<(), L::Error> {
    let subject_id = record.subject_id.clone();
    let received_at = record.received_at;
    self.inner.append(record).await?;
    // Concurrent appends may finish out of order; keep the newest.
    self
      .index
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .entry(subject_id)
      .and_modify(|last| *last = (*last).max(received_at))
      .or_insert(received_at);
    Ok(())
  }

  async fn most_recent(
    &self,
    subject_id: &str,
  ) -> Result<Option<NaiveDateTime>, L::Error> {
    Ok(
      self
        .index
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(subject_id)
        .copied(),
    )
  }

  async fn records(&self) -> Result<Vec<SubmissionRecord>, L::Error> {
    self.inner.records().await
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::*;

  fn at(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
      .unwrap()
      .and_hms_opt(h, m, 0)
      .unwrap()
  }

  /// Holds back the completion of `delayed` appends after the durable
  /// write, so a later append can overtake them.
  struct SlowLedger {
    inner:   MemoryLedger,
    delayed: &'static str,
  }

  impl SubmissionLedger for SlowLedger {
    type Error = Infallible;

    async fn append(&self, record: SubmissionRecord) -> Result<(), Infallible> {
      let delay = record.submission_id == self.delayed;
      self.inner.append(record).await?;
      if delay {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
      }
      Ok(())
    }

    async fn most_recent(
      &self,
      subject_id: &str,
    ) -> Result<Option<NaiveDateTime>, Infallible> {
      self.inner.most_recent(subject_id).await
    }

    async fn records(&self) -> Result<Vec<SubmissionRecord>, Infallible> {
      self.inner.records().await
    }
  }

  #[tokio::test]
  async fn empty_ledger_has_no_history() {
    let ledger = MemoryLedger::new();
    assert!(ledger.most_recent("42").await.unwrap().is_none());
    assert!(ledger.is_empty());
  }

  #[tokio::test]
  async fn most_recent_returns_last_appended() {
    let ledger = MemoryLedger::new();
    ledger.append(SubmissionRecord::new("42", "a", at(9, 0))).await.unwrap();
    ledger.append(SubmissionRecord::new("7", "b", at(9, 30))).await.unwrap();
    ledger.append(SubmissionRecord::new("42", "c", at(10, 0))).await.unwrap();

    assert_eq!(ledger.most_recent("42").await.unwrap(), Some(at(10, 0)));
    assert_eq!(ledger.most_recent("7").await.unwrap(), Some(at(9, 30)));
    assert_eq!(ledger.records().await.unwrap().len(), 3);
  }

  #[tokio::test]
  async fn index_is_rebuilt_from_existing_records() {
    let backing = MemoryLedger::new();
    backing.append(SubmissionRecord::new("42", "a", at(9, 0))).await.unwrap();
    backing.append(SubmissionRecord::new("42", "b", at(10, 0))).await.unwrap();
    backing.append(SubmissionRecord::new("7", "c", at(8, 0))).await.unwrap();

    let indexed = IndexedLedger::build(backing).await.unwrap();
    assert_eq!(indexed.subjects(), 2);
    assert_eq!(indexed.most_recent("42").await.unwrap(), Some(at(10, 0)));
    assert_eq!(indexed.most_recent("7").await.unwrap(), Some(at(8, 0)));
  }

  #[tokio::test]
  async fn index_follows_appends_and_writes_through() {
    let indexed = IndexedLedger::build(MemoryLedger::new()).await.unwrap();
    assert!(indexed.most_recent("42").await.unwrap().is_none());

    indexed.append(SubmissionRecord::new("42", "a", at(11, 0))).await.unwrap();
    assert_eq!(indexed.most_recent("42").await.unwrap(), Some(at(11, 0)));
    assert_eq!(indexed.inner().len(), 1);
  }

  #[tokio::test]
  async fn index_keeps_newest_when_appends_finish_out_of_order() {
    let indexed = IndexedLedger::build(SlowLedger {
      inner:   MemoryLedger::new(),
      delayed: "first",
    })
    .await
    .unwrap();

    let (a, b) = tokio::join!(
      indexed.append(SubmissionRecord::new("42", "first", at(10, 0))),
      indexed.append(SubmissionRecord::new("42", "second", at(11, 0))),
    );
    a.unwrap();
    b.unwrap();

    let logged = indexed.inner().inner.most_recent("42").await.unwrap();
    assert_eq!(logged, Some(at(11, 0)));
    assert_eq!(indexed.most_recent("42").await.unwrap(), logged);
  }
}
