//! Handlers for the webhook endpoints.

use axum::{
  Json,
  extract::State,
  http::StatusCode,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use shutter_core::{
  intake::{Outcome, Replier, SubmissionAcceptor},
  ledger::SubmissionLedger,
  submission::SubmissionEvent,
};

use crate::{AppState, auth::Authenticated, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct StartBody {
  pub subject_id: String,
}

/// Body of every successful webhook response: the terminal outcome and the
/// reply that was sent for it.
#[derive(Debug, Serialize)]
pub struct IntakeResponse {
  pub outcome:  &'static str,
  pub message:  String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub retry_at: Option<NaiveDateTime>,
}

impl IntakeResponse {
  fn new<L, A, R>(state: &AppState<L, A, R>, outcome: &Outcome) -> Self
  where
    L: SubmissionLedger,
    A: SubmissionAcceptor,
    R: Replier,
  {
    let retry_at = match outcome {
      Outcome::Cooldown { retry_at, .. } => Some(*retry_at),
      _ => None,
    };
    Self {
      outcome: outcome.kind(),
      message: state.handler.reply_text(outcome),
      retry_at,
    }
  }
}

/// `GET /health`
pub async fn health() -> StatusCode { StatusCode::OK }

/// `POST /start` — body: `{"subject_id":"42"}`
pub async fn start<L, A, R>(
  _auth: Authenticated,
  State(state): State<AppState<L, A, R>>,
  Json(body): Json<StartBody>,
) -> Result<Json<IntakeResponse>, ApiError>
where
  L: SubmissionLedger,
  A: SubmissionAcceptor,
  R: Replier,
{
  let outcome = state.handler.greet(&body.subject_id).await?;
  Ok(Json(IntakeResponse::new(&state, &outcome)))
}

/// `POST /submissions` — body: `{"subject_id":"42","submission_id":"…"}`
pub async fn submit<L, A, R>(
  _auth: Authenticated,
  State(state): State<AppState<L, A, R>>,
  Json(event): Json<SubmissionEvent>,
) -> Result<Json<IntakeResponse>, ApiError>
where
  L: SubmissionLedger,
  A: SubmissionAcceptor,
  R: Replier,
{
  let outcome = state.handler.handle(&event).await?;
  Ok(Json(IntakeResponse::new(&state, &outcome)))
}
