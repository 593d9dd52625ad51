//! Outbound reply delivery.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use shutter_core::intake::Replier;
use tracing::info;

/// Where replies go: a webhook on the transport bridge, or the log when no
/// bridge is configured.
#[derive(Clone)]
pub enum OutboundReplier {
  Log,
  Webhook { client: Client, url: String },
}

#[derive(Serialize)]
struct OutboundMessage<'a> {
  subject_id: &'a str,
  text:       &'a str,
}

impl OutboundReplier {
  pub fn from_url(url: Option<String>) -> reqwest::Result<Self> {
    let Some(url) = url else {
      return Ok(Self::Log);
    };
    let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
    Ok(Self::Webhook { client, url })
  }
}

impl Replier for OutboundReplier {
  type Error = reqwest::Error;

  async fn reply(&self, subject_id: &str, message: &str) -> reqwest::Result<()> {
    match self {
      Self::Log => {
        info!(subject_id, reply = message, "reply");
        Ok(())
      }
      Self::Webhook { client, url } => {
        client
          .post(url)
          .json(&OutboundMessage {
            subject_id,
            text: message,
          })
          .send()
          .await?
          .error_for_status()?;
        Ok(())
      }
    }
  }
}
