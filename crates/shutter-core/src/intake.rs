//! The intake handler and the collaborator traits it drives.
//!
//! Each inbound submission walks a short state machine:
//!
//! ```text
//! RECEIVED → BLOCK_CHECK ─┬─ blocked ──────────────────────→ Outcome::Blocked
//!                         └─ COOLDOWN_CHECK ─┬─ within ────→ Outcome::Cooldown
//!                                            └─ ACCEPTING ─┬→ Outcome::Accepted
//!                                                          └→ Err(Error::Accept)
//! ```
//!
//! Exactly one reply is sent per invocation, chosen by the first terminal
//! state reached. Nothing is retained between invocations beyond the ledger
//! and the blocklist.

use std::{
  future::Future,
  path::{Path, PathBuf},
  sync::Arc,
};

use chrono::{Local, NaiveDateTime};
use tracing::{error, info, warn};

use crate::{
  Error, Result,
  admission::{Admission, AdmissionController, CooldownPolicy},
  blocklist::Blocklist,
  ledger::SubmissionLedger,
  submission::{SubmissionEvent, SubmissionRecord, validate_id},
};

// ─── Collaborators ───────────────────────────────────────────────────────────

/// Retrieves a submission's binary payload and stores it durably.
pub trait SubmissionAcceptor: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Fetch `submission_id` and write it to `destination`. On error nothing
  /// may be left at `destination`.
  fn accept<'a>(
    &'a self,
    submission_id: &'a str,
    destination: &'a Path,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}

/// Delivers a human-readable message back to a subject.
pub trait Replier: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn reply<'a>(
    &'a self,
    subject_id: &'a str,
    message: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}

impl<T: SubmissionAcceptor> SubmissionAcceptor for Arc<T> {
  type Error = T::Error;

  fn accept<'a>(
    &'a self,
    submission_id: &'a str,
    destination: &'a Path,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a {
    (**self).accept(submission_id, destination)
  }
}

impl<T: Replier> Replier for Arc<T> {
  type Error = T::Error;

  fn reply<'a>(
    &'a self,
    subject_id: &'a str,
    message: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a {
    (**self).reply(subject_id, message)
  }
}

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// Terminal state of a handler invocation that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
  Greeted,
  Accepted(SubmissionRecord),
  Blocked,
  Cooldown {
    last_at:  NaiveDateTime,
    retry_at: NaiveDateTime,
  },
}

impl Outcome {
  pub fn kind(&self) -> &'static str {
    match self {
      Self::Greeted => "greeted",
      Self::Accepted(_) => "accepted",
      Self::Blocked => "blocked",
      Self::Cooldown { .. } => "cooldown",
    }
  }
}

/// Reply sent when an invocation ends in an error.
pub const FAILURE_REPLY: &str =
  "⚠️ Sorry, your image could not be saved. Please try again later.";

const BLOCKED_REPLY: &str = "⛔ Sorry, you can no longer send images to this bot.";

const ACCEPTED_REPLY: &str = "✅ Image received successfully!";

// ─── Handler ─────────────────────────────────────────────────────────────────

/// Orchestrates blocklist gate → admission → payload acceptance → reply.
pub struct IntakeHandler<L, A, R> {
  admission: AdmissionController<L>,
  blocklist: Blocklist,
  policy:    CooldownPolicy,
  acceptor:  A,
  replier:   R,
  image_dir: PathBuf,
}

impl<L, A, R> IntakeHandler<L, A, R>
where
  L: SubmissionLedger,
  A: SubmissionAcceptor,
  R: Replier,
{
  pub fn new(
    ledger: Arc<L>,
    blocklist: Blocklist,
    policy: CooldownPolicy,
    acceptor: A,
    replier: R,
    image_dir: impl Into<PathBuf>,
  ) -> Self {
    Self {
      admission: AdmissionController::new(ledger),
      blocklist,
      policy,
      acceptor,
      replier,
      image_dir: image_dir.into(),
    }
  }

  pub fn policy(&self) -> &CooldownPolicy { &self.policy }

  pub fn ledger(&self) -> &Arc<L> { self.admission.ledger() }

  /// Where the payload for `(subject_id, submission_id)` is stored.
  pub fn destination(&self, subject_id: &str, submission_id: &str) -> PathBuf {
    self.image_dir.join(format!("{subject_id}_{submission_id}.jpg"))
  }

  /// Message text for a terminal outcome.
  pub fn reply_text(&self, outcome: &Outcome) -> String {
    let window = self.policy.describe();
    match outcome {
      Outcome::Greeted => format!(
        "👋 Hi! I'm a bot that receives images. You can send me one image every {window}."
      ),
      Outcome::Accepted(_) => ACCEPTED_REPLY.to_owned(),
      Outcome::Blocked => BLOCKED_REPLY.to_owned(),
      Outcome::Cooldown { .. } => format!(
        "🕐 You must wait {window} from your last image before sending a new one."
      ),
    }
  }

  /// Answer a greeting command. Touches neither the blocklist nor the ledger.
  pub async fn greet(&self, subject_id: &str) -> Result<Outcome> {
    if let Err(e) = validate_id("subject_id", subject_id) {
      warn!(subject_id, error = %e, "rejected malformed greeting");
      self.deliver(subject_id, FAILURE_REPLY).await;
      return Err(e);
    }
    let outcome = Outcome::Greeted;
    self.deliver(subject_id, &self.reply_text(&outcome)).await;
    Ok(outcome)
  }

  /// Process a submission against the local clock. The cooldown is decided
  /// at arrival; the ledger row is stamped once the payload is stored.
  pub async fn handle(&self, event: &SubmissionEvent) -> Result<Outcome> {
    self
      .respond(event, Local::now().naive_local(), || Local::now().naive_local())
      .await
  }

  /// Process a submission as if it arrived, and was stored, at `now`.
  pub async fn handle_at(
    &self,
    event: &SubmissionEvent,
    now: NaiveDateTime,
  ) -> Result<Outcome> {
    self.respond(event, now, move || now).await
  }

  async fn respond(
    &self,
    event: &SubmissionEvent,
    now: NaiveDateTime,
    stamp: impl Fn() -> NaiveDateTime + Send + Sync,
  ) -> Result<Outcome> {
    let result = self.process(event, now, stamp).await;

    let text = match &result {
      Ok(outcome) => self.reply_text(outcome),
      Err(e) if e.is_storage_failure() => {
        error!(
          subject_id = %event.subject_id,
          submission_id = %event.submission_id,
          error = %e,
          "submission failed"
        );
        FAILURE_REPLY.to_owned()
      }
      Err(e) => {
        warn!(subject_id = %event.subject_id, error = %e, "rejected malformed submission");
        FAILURE_REPLY.to_owned()
      }
    };
    self.deliver(&event.subject_id, &text).await;

    result
  }

  async fn process(
    &self,
    event: &SubmissionEvent,
    now: NaiveDateTime,
    stamp: impl Fn() -> NaiveDateTime + Send + Sync,
  ) -> Result<Outcome> {
    let subject_id = event.subject_id.as_str();
    validate_id("subject_id", subject_id)?;
    validate_id("submission_id", &event.submission_id)?;

    if self.blocklist.is_blocked(subject_id) {
      warn!(subject_id, "blocked subject tried to send an image");
      return Ok(Outcome::Blocked);
    }

    let decision = self
      .admission
      .check(subject_id, now, &self.policy)
      .await
      .map_err(|e| Error::Ledger(Box::new(e)))?;

    if let Admission::Cooldown { last_at, retry_at } = decision {
      info!(subject_id, %last_at, %retry_at, "submission refused: cooldown active");
      return Ok(Outcome::Cooldown { last_at, retry_at });
    }

    let destination = self.destination(subject_id, &event.submission_id);
    self
      .acceptor
      .accept(&event.submission_id, &destination)
      .await
      .map_err(|e| Error::Accept(Box::new(e)))?;

    let record = SubmissionRecord::new(subject_id, event.submission_id.as_str(), stamp());
    self
      .admission
      .record(record.clone())
      .await
      .map_err(|e| Error::Ledger(Box::new(e)))?;

    info!(
      subject_id,
      submission_id = %record.submission_id,
      path = %destination.display(),
      "image received"
    );
    Ok(Outcome::Accepted(record))
  }

  /// Reply delivery is best effort; a failure is logged, never surfaced.
  async fn deliver(&self, subject_id: &str, text: &str) {
    if let Err(e) = self.replier.reply(subject_id, text).await {
      warn!(subject_id, error = %e, "failed to deliver reply");
    }
  }
}

#[cfg(test)]
mod tests {
  use std::{
    convert::Infallible,
    io,
    sync::Mutex,
  };

  use chrono::NaiveDate;

  use super::*;
  use crate::ledger::MemoryLedger;

  // ── Stubs ───────────────────────────────────────────────────────────────

  #[derive(Default)]
  struct StubAcceptor {
    fail:     bool,
    calls:    Mutex<Vec<(String, PathBuf)>>,
    finished: Mutex<Option<NaiveDateTime>>,
  }

  impl SubmissionAcceptor for StubAcceptor {
    type Error = io::Error;

    async fn accept(&self, submission_id: &str, destination: &Path) -> io::Result<()> {
      self
        .calls
        .lock()
        .unwrap()
        .push((submission_id.to_owned(), destination.to_path_buf()));
      *self.finished.lock().unwrap() = Some(Local::now().naive_local());
      if self.fail {
        return Err(io::Error::other("disk full"));
      }
      Ok(())
    }
  }

  #[derive(Default)]
  struct RecordingReplier {
    sent: Mutex<Vec<(String, String)>>,
  }

  impl RecordingReplier {
    fn messages(&self) -> Vec<String> {
      self.sent.lock().unwrap().iter().map(|(_, m)| m.clone()).collect()
    }
  }

  impl Replier for RecordingReplier {
    type Error = Infallible;

    async fn reply(&self, subject_id: &str, message: &str) -> Result<(), Infallible> {
      self
        .sent
        .lock()
        .unwrap()
        .push((subject_id.to_owned(), message.to_owned()));
      Ok(())
    }
  }

  struct UnreadableLedger;

  impl SubmissionLedger for UnreadableLedger {
    type Error = io::Error;

    async fn append(&self, _record: SubmissionRecord) -> io::Result<()> {
      Err(io::Error::other("read-only"))
    }

    async fn most_recent(&self, _subject_id: &str) -> io::Result<Option<NaiveDateTime>> {
      Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
    }

    async fn records(&self) -> io::Result<Vec<SubmissionRecord>> {
      Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
    }
  }

  // ── Fixtures ────────────────────────────────────────────────────────────

  type Handler = IntakeHandler<MemoryLedger, Arc<StubAcceptor>, Arc<RecordingReplier>>;

  struct Fixture {
    handler:  Handler,
    acceptor: Arc<StubAcceptor>,
    replier:  Arc<RecordingReplier>,
  }

  fn fixture(blocked: &[&str], fail_accept: bool) -> Fixture {
    let acceptor = Arc::new(StubAcceptor {
      fail: fail_accept,
      ..Default::default()
    });
    let replier = Arc::new(RecordingReplier::default());
    let handler = IntakeHandler::new(
      Arc::new(MemoryLedger::new()),
      blocked.iter().copied().collect(),
      CooldownPolicy::default(),
      Arc::clone(&acceptor),
      Arc::clone(&replier),
      "images",
    );
    Fixture {
      handler,
      acceptor,
      replier,
    }
  }

  fn event(subject: &str, submission: &str) -> SubmissionEvent {
    SubmissionEvent {
      subject_id:    subject.into(),
      submission_id: submission.into(),
    }
  }

  fn t(h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
      .unwrap()
      .and_hms_opt(h, m, s)
      .unwrap()
  }

  // ── Scenarios ───────────────────────────────────────────────────────────

  #[tokio::test]
  async fn first_submission_is_accepted_and_recorded() {
    let f = fixture(&[], false);

    let outcome = f.handler.handle_at(&event("42", "abc"), t(10, 0, 0)).await.unwrap();
    assert_eq!(outcome, Outcome::Accepted(SubmissionRecord::new("42", "abc", t(10, 0, 0))));

    let records = f.handler.ledger().records().await.unwrap();
    assert_eq!(records, vec![SubmissionRecord::new("42", "abc", t(10, 0, 0))]);

    let calls = f.acceptor.calls.lock().unwrap().clone();
    assert_eq!(calls, vec![("abc".to_owned(), PathBuf::from("images/42_abc.jpg"))]);
    assert_eq!(f.replier.messages(), vec![ACCEPTED_REPLY.to_owned()]);
  }

  #[tokio::test]
  async fn resubmission_within_window_is_refused() {
    let f = fixture(&[], false);
    f.handler.handle_at(&event("42", "one"), t(10, 0, 0)).await.unwrap();

    let outcome = f.handler.handle_at(&event("42", "two"), t(10, 30, 0)).await.unwrap();
    assert_eq!(
      outcome,
      Outcome::Cooldown {
        last_at:  t(10, 0, 0),
        retry_at: t(11, 0, 0),
      }
    );
    assert_eq!(f.handler.ledger().len(), 1);
    assert_eq!(f.acceptor.calls.lock().unwrap().len(), 1);

    let messages = f.replier.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages[1].contains("wait 1 hour"), "{}", messages[1]);
  }

  #[tokio::test]
  async fn resubmission_after_window_is_accepted() {
    let f = fixture(&[], false);
    f.handler.handle_at(&event("42", "one"), t(10, 0, 0)).await.unwrap();

    let outcome = f.handler.handle_at(&event("42", "two"), t(11, 0, 1)).await.unwrap();
    assert_eq!(outcome.kind(), "accepted");
    assert_eq!(f.handler.ledger().most_recent("42").await.unwrap(), Some(t(11, 0, 1)));
  }

  #[tokio::test]
  async fn blocked_subject_is_refused_before_anything_else() {
    let f = fixture(&["7"], false);

    let outcome = f.handler.handle_at(&event("7", "abc"), t(10, 0, 0)).await.unwrap();
    assert_eq!(outcome, Outcome::Blocked);
    assert!(f.handler.ledger().is_empty());
    assert!(f.acceptor.calls.lock().unwrap().is_empty());
    assert_eq!(f.replier.messages(), vec![BLOCKED_REPLY.to_owned()]);
  }

  #[tokio::test]
  async fn blocklist_check_does_not_consult_the_ledger() {
    let replier = Arc::new(RecordingReplier::default());
    let handler = IntakeHandler::new(
      Arc::new(UnreadableLedger),
      Blocklist::from_iter(["7"]),
      CooldownPolicy::default(),
      StubAcceptor::default(),
      Arc::clone(&replier),
      "images",
    );

    let outcome = handler.handle_at(&event("7", "abc"), t(10, 0, 0)).await.unwrap();
    assert_eq!(outcome, Outcome::Blocked);
  }

  #[tokio::test]
  async fn failed_store_leaves_ledger_untouched() {
    let f = fixture(&[], true);

    let err = f.handler.handle_at(&event("42", "abc"), t(10, 0, 0)).await.unwrap_err();
    assert!(matches!(err, Error::Accept(_)));
    assert!(f.handler.ledger().is_empty());
    assert_eq!(f.replier.messages(), vec![FAILURE_REPLY.to_owned()]);
  }

  #[tokio::test]
  async fn unreadable_ledger_is_not_treated_as_empty() {
    let acceptor = Arc::new(StubAcceptor::default());
    let replier = Arc::new(RecordingReplier::default());
    let handler = IntakeHandler::new(
      Arc::new(UnreadableLedger),
      Blocklist::empty(),
      CooldownPolicy::default(),
      Arc::clone(&acceptor),
      Arc::clone(&replier),
      "images",
    );

    let err = handler.handle_at(&event("42", "abc"), t(10, 0, 0)).await.unwrap_err();
    assert!(matches!(err, Error::Ledger(_)));
    assert!(acceptor.calls.lock().unwrap().is_empty());
    assert_eq!(replier.messages(), vec![FAILURE_REPLY.to_owned()]);
  }

  #[tokio::test]
  async fn path_traversal_is_rejected() {
    let f = fixture(&[], false);

    let err = f.handler.handle_at(&event("42", "../../etc/passwd"), t(10, 0, 0)).await.unwrap_err();
    assert!(matches!(err, Error::InvalidId { field: "submission_id", .. }));
    assert!(f.acceptor.calls.lock().unwrap().is_empty());
    assert_eq!(f.replier.messages().len(), 1);
  }

  #[tokio::test]
  async fn greeting_mentions_the_window() {
    let f = fixture(&["7"], false);

    let outcome = f.handler.greet("7").await.unwrap();
    assert_eq!(outcome, Outcome::Greeted);
    let messages = f.replier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("every 1 hour"));
    assert!(f.handler.ledger().is_empty());
  }

  #[tokio::test]
  async fn malformed_greeting_still_gets_one_reply() {
    let f = fixture(&[], false);

    let err = f.handler.greet("4\n2").await.unwrap_err();
    assert!(matches!(err, Error::InvalidId { field: "subject_id", .. }));
    assert_eq!(f.replier.messages(), vec![FAILURE_REPLY.to_owned()]);
  }

  #[tokio::test]
  async fn live_submission_is_stamped_after_the_payload_is_stored() {
    let f = fixture(&[], false);

    let outcome = f.handler.handle(&event("42", "abc")).await.unwrap();
    let Outcome::Accepted(record) = outcome else {
      panic!("expected acceptance, got {outcome:?}");
    };
    let stored_at = f.acceptor.finished.lock().unwrap().unwrap();
    assert!(record.received_at >= stored_at);
    assert_eq!(f.handler.ledger().most_recent("42").await.unwrap(), Some(record.received_at));
  }
}
