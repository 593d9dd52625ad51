//! HTTP payload fetcher — the [`SubmissionAcceptor`] used in production.
//!
//! Downloads `{base_url}/{submission_id}` into a temporary sibling of the
//! destination and renames it into place once fully written and synced.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use reqwest::{Client, Response};
use shutter_core::intake::SubmissionAcceptor;
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt as _};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum FetchError {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("GET {url} returned {status}")]
  Status { url: String, status: u16 },

  #[error("i/o error on {path:?}: {source}")]
  Io {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Fetches submission payloads over HTTP.
///
/// Cheap to clone — the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct HttpFetcher {
  client:   Client,
  base_url: String,
}

impl HttpFetcher {
  pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
    let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
    Ok(Self {
      client,
      base_url: base_url.into(),
    })
  }

  fn url(&self, submission_id: &str) -> String {
    format!("{}/{}", self.base_url.trim_end_matches('/'), submission_id)
  }
}

impl SubmissionAcceptor for HttpFetcher {
  type Error = FetchError;

  async fn accept(&self, submission_id: &str, destination: &Path) -> Result<(), FetchError> {
    let url = self.url(submission_id);
    let resp = self.client.get(&url).send().await?;
    if !resp.status().is_success() {
      return Err(FetchError::Status {
        url,
        status: resp.status().as_u16(),
      });
    }

    let partial = destination.with_extension(format!("{}.part", Uuid::new_v4().simple()));
    if let Err(e) = download(resp, &partial, destination).await {
      let _ = fs::remove_file(&partial).await;
      return Err(e);
    }

    debug!(%url, path = %destination.display(), "payload stored");
    Ok(())
  }
}

async fn download(mut resp: Response, partial: &Path, destination: &Path) -> Result<(), FetchError> {
  let io = |path: &Path| {
    let path = path.to_path_buf();
    move |source| FetchError::Io { path, source }
  };

  let mut file = fs::File::create(partial).await.map_err(io(partial))?;
  while let Some(chunk) = resp.chunk().await? {
    file.write_all(&chunk).await.map_err(io(partial))?;
  }
  file.sync_all().await.map_err(io(partial))?;
  drop(file);

  fs::rename(partial, destination).await.map_err(io(destination))
}
