//! Static blocklist of subject ids.
//!
//! Built once at startup and passed into the intake handler. There is no
//! runtime mutation; changing the list requires a restart.

use std::{collections::HashSet, io, path::Path};

use crate::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct Blocklist {
  ids: HashSet<String>,
}

impl Blocklist {
  pub fn empty() -> Self { Self::default() }

  /// Load one subject id per line from `path`. A missing file yields an
  /// empty blocklist; any other read failure is an error.
  pub fn load(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    match std::fs::read_to_string(path) {
      Ok(text) => Ok(Self::parse(&text)),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::empty()),
      Err(source) => Err(Error::Blocklist {
        path: path.to_path_buf(),
        source,
      }),
    }
  }

  /// Parse newline-separated ids. Surrounding whitespace and blank lines are
  /// ignored.
  pub fn parse(text: &str) -> Self {
    text
      .lines()
      .map(str::trim)
      .filter(|line| !line.is_empty())
      .collect()
  }

  pub fn is_blocked(&self, subject_id: &str) -> bool {
    self.ids.contains(subject_id)
  }

  pub fn len(&self) -> usize { self.ids.len() }

  pub fn is_empty(&self) -> bool { self.ids.is_empty() }
}

impl<S: Into<String>> FromIterator<S> for Blocklist {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    Self {
      ids: iter.into_iter().map(Into::into).collect(),
    }
  }
}
