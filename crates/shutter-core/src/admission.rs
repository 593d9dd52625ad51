//! Cooldown policy and the admission controller.
//!
//! Admission is a pure decision over ledger state: the controller never
//! writes during a check. Callers append a record only after the payload
//! has been stored, so the decide-then-record sequence is two steps, not a
//! transaction.

use std::sync::Arc;

use chrono::{NaiveDateTime, TimeDelta};

use crate::{ledger::SubmissionLedger, submission::SubmissionRecord};

// ─── Policy ──────────────────────────────────────────────────────────────────

/// A single fixed cooldown window applied uniformly to every subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownPolicy {
  window: TimeDelta,
}

impl Default for CooldownPolicy {
  fn default() -> Self { Self::new(TimeDelta::hours(1)) }
}

impl CooldownPolicy {
  pub fn new(window: TimeDelta) -> Self { Self { window } }

  pub fn from_secs(secs: u64) -> Self {
    let secs = i64::try_from(secs).unwrap_or(i64::MAX);
    Self::new(TimeDelta::try_seconds(secs).unwrap_or(TimeDelta::MAX))
  }

  pub fn window(&self) -> TimeDelta { self.window }

  /// Whether a submission recorded at `last` still restricts one at `now`.
  ///
  /// Strict comparison: a submission exactly one window old no longer
  /// restricts.
  pub fn restricts(&self, last: NaiveDateTime, now: NaiveDateTime) -> bool {
    match now.checked_sub_signed(self.window) {
      Some(cutoff) => last > cutoff,
      None => true,
    }
  }

  /// Earliest instant at which a subject last seen at `last` may submit
  /// again.
  pub fn retry_at(&self, last: NaiveDateTime) -> NaiveDateTime {
    last.checked_add_signed(self.window).unwrap_or(NaiveDateTime::MAX)
  }

  /// Human-readable window, e.g. `"1 hour"` or `"90 minutes"`.
  pub fn describe(&self) -> String {
    let secs = self.window.num_seconds();
    let (n, unit) = if secs != 0 && secs % 3600 == 0 {
      (secs / 3600, "hour")
    } else if secs != 0 && secs % 60 == 0 {
      (secs / 60, "minute")
    } else {
      (secs, "second")
    };
    if n == 1 { format!("1 {unit}") } else { format!("{n} {unit}s") }
  }
}

// ─── Controller ──────────────────────────────────────────────────────────────

/// Decision for one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
  Admit,
  Cooldown {
    last_at:  NaiveDateTime,
    retry_at: NaiveDateTime,
  },
}

/// Decides allow/deny from the most recent ledger entry of a subject.
pub struct AdmissionController<L> {
  ledger: Arc<L>,
}

impl<L> Clone for AdmissionController<L> {
  fn clone(&self) -> Self {
    Self {
      ledger: Arc::clone(&self.ledger),
    }
  }
}

impl<L: SubmissionLedger> AdmissionController<L> {
  pub fn new(ledger: Arc<L>) -> Self { Self { ledger } }

  pub fn ledger(&self) -> &Arc<L> { &self.ledger }

  /// Check `subject_id` against `policy` at `now`.
  ///
  /// A ledger read failure is returned as an error, never as [`Admission::Admit`].
  pub async fn check(
    &self,
    subject_id: &str,
    now: NaiveDateTime,
    policy: &CooldownPolicy,
  ) -> Result<Admission, L::Error> {
    let decision = match self.ledger.most_recent(subject_id).await? {
      Some(last_at) if policy.restricts(last_at, now) => Admission::Cooldown {
        last_at,
        retry_at: policy.retry_at(last_at),
      },
      _ => Admission::Admit,
    };
    Ok(decision)
  }

  pub async fn is_within_cooldown(
    &self,
    subject_id: &str,
    now: NaiveDateTime,
    policy: &CooldownPolicy,
  ) -> Result<bool, L::Error> {
    let decision = self.check(subject_id, now, policy).await?;
    Ok(matches!(decision, Admission::Cooldown { .. }))
  }

  /// Record an admission. Call only after the payload has been stored.
  pub async fn record(&self, record: SubmissionRecord) -> Result<(), L::Error> {
    self.ledger.append(record).await
  }
}
