//! The output linker: named outputs exposed as one browsable tree.
//!
//! An [`OutputMapping`] maps normalized relative keys to artifacts. Keys are
//! unique after normalization and never nest, so every key owns exactly one
//! path in the linked tree.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::pathset::{PathSetError, display_rel, normalize};
use crate::platform::link::link_path;
use crate::store::HASH_EXCLUSIONS;

#[derive(Debug, Error)]
pub enum LinkError {
  #[error("output key must not be empty")]
  EmptyKey,

  #[error("invalid output key: {0}")]
  InvalidKey(#[from] PathSetError),

  #[error("duplicate output key '{0}'")]
  DuplicateKey(String),

  #[error("output key '{key}' is nested under output key '{parent}'")]
  NestedKey { key: String, parent: String },

  #[error("output key '{0}' collides with a name the store reserves inside entries")]
  ReservedKey(String),

  #[error("unknown output reference '{0}' (expected target:<name>, book, source:build, source:docs or source-diff)")]
  UnknownRef(String),

  #[error("artifact for output '{key}' does not exist at {path}")]
  MissingArtifact { key: String, path: PathBuf },

  #[error("failed to link output '{key}': {source}")]
  Io {
    key: String,
    #[source]
    source: std::io::Error,
  },
}

/// Normalize an output key: no `./`, no repeated or trailing separators.
pub fn normalize_key(raw: &str) -> Result<String, LinkError> {
  let key = display_rel(&normalize(raw)?);
  if key.is_empty() {
    return Err(LinkError::EmptyKey);
  }
  Ok(key)
}

fn is_nested(inner: &str, outer: &str) -> bool {
  inner.len() > outer.len() && inner.starts_with(outer) && inner.as_bytes()[outer.len()] == b'/'
}

/// Unique, non-overlapping output keys mapped to artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct OutputMapping<V> {
  entries: BTreeMap<String, V>,
}

impl<V> Default for OutputMapping<V> {
  fn default() -> Self {
    Self {
      entries: BTreeMap::new(),
    }
  }
}

impl<V> OutputMapping<V> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, raw: &str, value: V) -> Result<(), LinkError> {
    let key = normalize_key(raw)?;
    let first = key.split('/').next().unwrap_or_default();
    if HASH_EXCLUSIONS.contains(&first) {
      return Err(LinkError::ReservedKey(key));
    }
    if self.entries.contains_key(&key) {
      return Err(LinkError::DuplicateKey(key));
    }
    for existing in self.entries.keys() {
      if is_nested(&key, existing) {
        return Err(LinkError::NestedKey {
          key,
          parent: existing.clone(),
        });
      }
      if is_nested(existing, &key) {
        return Err(LinkError::NestedKey {
          key: existing.clone(),
          parent: key,
        });
      }
    }
    self.entries.insert(key, value);
    Ok(())
  }

  pub fn get(&self, key: &str) -> Option<&V> {
    self.entries.get(key)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &V)> {
    self.entries.iter()
  }

  pub fn values(&self) -> impl Iterator<Item = &V> {
    self.entries.values()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Map every value, keeping keys; the first error aborts.
  pub fn try_map<W, E>(&self, mut f: impl FnMut(&str, &V) -> Result<W, E>) -> Result<OutputMapping<W>, E> {
    let mut entries = BTreeMap::new();
    for (key, value) in &self.entries {
      entries.insert(key.clone(), f(key, value)?);
    }
    Ok(OutputMapping { entries })
  }
}

/// Create `dest` holding one link per output, pointing at the artifact.
///
/// Intermediate directories are created for nested keys (`bin/zebrad`).
pub fn link(mapping: &OutputMapping<PathBuf>, dest: &Path) -> Result<(), LinkError> {
  std::fs::create_dir_all(dest).map_err(|source| LinkError::Io {
    key: String::new(),
    source,
  })?;

  for (key, artifact) in mapping.iter() {
    if !artifact.exists() {
      return Err(LinkError::MissingArtifact {
        key: key.clone(),
        path: artifact.clone(),
      });
    }
    let target = dunce::canonicalize(artifact).map_err(|source| LinkError::Io {
      key: key.clone(),
      source,
    })?;

    let at = dest.join(key);
    if let Some(parent) = at.parent() {
      std::fs::create_dir_all(parent).map_err(|source| LinkError::Io {
        key: key.clone(),
        source,
      })?;
    }
    link_path(&target, &at).map_err(|source| LinkError::Io {
      key: key.clone(),
      source,
    })?;
    debug!(key = %key, target = %target.display(), "linked output");
  }
  Ok(())
}

/// What an output key refers to in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OutputRef {
  Target(String),
  Book,
  BuildSource,
  DocsSource,
  SourceDiff,
}

impl FromStr for OutputRef {
  type Err = LinkError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "book" => Ok(OutputRef::Book),
      "source:build" => Ok(OutputRef::BuildSource),
      "source:docs" => Ok(OutputRef::DocsSource),
      "source-diff" => Ok(OutputRef::SourceDiff),
      other => match other.strip_prefix("target:") {
        Some(name) if !name.is_empty() => Ok(OutputRef::Target(name.to_string())),
        _ => Err(LinkError::UnknownRef(other.to_string())),
      },
    }
  }
}

impl TryFrom<String> for OutputRef {
  type Error = LinkError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<OutputRef> for String {
  fn from(value: OutputRef) -> Self {
    value.to_string()
  }
}

impl fmt::Display for OutputRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      OutputRef::Target(name) => write!(f, "target:{}", name),
      OutputRef::Book => f.write_str("book"),
      OutputRef::BuildSource => f.write_str("source:build"),
      OutputRef::DocsSource => f.write_str("source:docs"),
      OutputRef::SourceDiff => f.write_str("source-diff"),
    }
  }
}
