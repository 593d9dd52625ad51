//! Webhook surface for the Shutter intake service.
//!
//! A transport bridge (e.g. a chat-bot poller) forwards greeting commands
//! and image submissions here; replies go back out through the configured
//! [`shutter_core::intake::Replier`].
//!
//! | Method | Path | Body |
//! |--------|------|------|
//! | `GET`  | `/health` | — |
//! | `POST` | `/start` | `{"subject_id":"42"}` |
//! | `POST` | `/submissions` | `{"subject_id":"42","submission_id":"AgAC…"}` |

pub mod auth;
pub mod error;
pub mod fetch;
pub mod handlers;
pub mod reply;

pub use error::ApiError;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, post},
};
use serde::Deserialize;
use shutter_core::{
  admission::CooldownPolicy,
  intake::{IntakeHandler, Replier, SubmissionAcceptor},
  ledger::SubmissionLedger,
};
use tower_http::trace::TraceLayer;

use auth::AuthConfig;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime configuration, deserialised from `shutter.toml` and `SHUTTER_*`
/// environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:               String,
  #[serde(default = "default_port")]
  pub port:               u16,
  #[serde(default = "default_image_dir")]
  pub image_dir:          PathBuf,
  #[serde(default = "default_ledger_path")]
  pub ledger_path:        PathBuf,
  #[serde(default = "default_blocklist_path")]
  pub blocklist_path:     PathBuf,
  #[serde(default = "default_cooldown_secs")]
  pub cooldown_secs:      u64,
  /// Payloads are fetched from `{payload_base_url}/{submission_id}`.
  pub payload_base_url:   String,
  /// Replies are POSTed here; when unset they are only logged.
  #[serde(default)]
  pub reply_url:          Option<String>,
  #[serde(default)]
  pub auth_username:      Option<String>,
  #[serde(default)]
  pub auth_password_hash: Option<String>,
  /// Keep an in-memory `subject → last submission` index.
  #[serde(default)]
  pub ledger_index:       bool,
  /// Append logs to this file instead of stderr.
  #[serde(default)]
  pub log_file:           Option<PathBuf>,
}

fn default_host() -> String { "127.0.0.1".to_string() }

fn default_port() -> u16 { 8080 }

fn default_image_dir() -> PathBuf { PathBuf::from("images") }

fn default_ledger_path() -> PathBuf { PathBuf::from("received_images.csv") }

fn default_blocklist_path() -> PathBuf { PathBuf::from("blacklist.txt") }

fn default_cooldown_secs() -> u64 { 3600 }

impl ServerConfig {
  pub fn policy(&self) -> CooldownPolicy { CooldownPolicy::from_secs(self.cooldown_secs) }

  /// Basic-auth credentials, if configured. Setting only one of the two
  /// fields is a configuration error.
  pub fn auth(&self) -> Result<Option<AuthConfig>, &'static str> {
    match (&self.auth_username, &self.auth_password_hash) {
      (Some(username), Some(hash)) => Ok(Some(AuthConfig {
        username:      username.clone(),
        password_hash: hash.clone(),
      })),
      (None, None) => Ok(None),
      _ => Err("auth_username and auth_password_hash must be set together"),
    }
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<L, A, R> {
  pub handler: Arc<IntakeHandler<L, A, R>>,
  pub auth:    Option<Arc<AuthConfig>>,
}

impl<L, A, R> Clone for AppState<L, A, R> {
  fn clone(&self) -> Self {
    Self {
      handler: Arc::clone(&self.handler),
      auth:    self.auth.clone(),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the webhook [`Router`].
pub fn router<L, A, R>(state: AppState<L, A, R>) -> Router
where
  L: SubmissionLedger + 'static,
  A: SubmissionAcceptor + 'static,
  R: Replier + 'static,
{
  Router::new()
    .route("/health", get(handlers::health))
    .route("/start", post(handlers::start::<L, A, R>))
    .route("/submissions", post(handlers::submit::<L, A, R>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
