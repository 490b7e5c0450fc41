//! The content-addressed store.
//!
//! Every stage output lives in its own entry, named by a hash of everything
//! that went into it. An entry is only trusted once it carries a completion
//! marker whose recorded output hash still matches its contents.
//!
//! # Layout
//!
//! ```text
//! store/
//! ├── .lock                   # StoreLock
//! ├── tmp/                    # staging directories for content-addressed entries
//! ├── source/<hash>-<name>/   # selected source trees
//! ├── diff/<hash>-<name>/     # selection regression diffs
//! ├── deps/<hash>-<name>/     # dependency artifact sets
//! ├── target/<hash>-<name>/   # compiled targets
//! ├── book/<hash>-<name>/     # rendered documentation
//! ├── check/<hash>-<name>/    # passed hygiene checks
//! └── result/<hash>-<name>/   # linked output trees
//! ```

mod marker;

use std::fmt;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, warn};

use crate::platform::paths::store_dir;
use crate::util::hash::{DirHashError, ObjectHash, hash_directory};

pub use marker::{COMPLETE_MARKER, EntryMarker, read_marker};

/// Entry contents excluded from output hashes.
pub const HASH_EXCLUSIONS: &[&str] = &[COMPLETE_MARKER, "tmp"];

const STAGING_DIR: &str = "tmp";

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("store i/o error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to hash store entry: {0}")]
  Hash(#[from] DirHashError),

  #[error("failed to encode completion marker: {0}")]
  Marker(#[from] serde_json::Error),
}

impl StoreError {
  pub(crate) fn io(path: &Path, source: io::Error) -> Self {
    StoreError::Io {
      path: path.to_path_buf(),
      source,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
  Source,
  Diff,
  Deps,
  Target,
  Book,
  Check,
  Result,
}

impl EntryKind {
  pub const ALL: [EntryKind; 7] = [
    EntryKind::Source,
    EntryKind::Diff,
    EntryKind::Deps,
    EntryKind::Target,
    EntryKind::Book,
    EntryKind::Check,
    EntryKind::Result,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      EntryKind::Source => "source",
      EntryKind::Diff => "diff",
      EntryKind::Deps => "deps",
      EntryKind::Target => "target",
      EntryKind::Book => "book",
      EntryKind::Check => "check",
      EntryKind::Result => "result",
    }
  }
}

impl fmt::Display for EntryKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A store entry that is complete and verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Realized {
  pub hash: ObjectHash,
  pub path: PathBuf,
  pub cache_hit: bool,
}

#[derive(Debug, Clone)]
pub struct Store {
  root: PathBuf,
}

impl Store {
  pub fn new(root: PathBuf) -> Self {
    Self { root }
  }

  /// The store at `ZBUILD_STORE` or the platform cache directory.
  pub fn default_store() -> Self {
    Self::new(store_dir())
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn kind_dir(&self, kind: EntryKind) -> PathBuf {
    self.root.join(kind.as_str())
  }

  pub fn entry_path(&self, kind: EntryKind, hash: &ObjectHash, name: &str) -> PathBuf {
    self.kind_dir(kind).join(format!("{}-{}", hash.0, name))
  }

  /// Parent of all staging directories.
  pub fn staging_root(&self) -> PathBuf {
    self.root.join(STAGING_DIR)
  }

  /// A fresh staging directory on the same filesystem as the entries.
  pub fn staging_dir(&self) -> Result<TempDir, StoreError> {
    let staging_root = self.staging_root();
    std::fs::create_dir_all(&staging_root).map_err(|e| StoreError::io(&staging_root, e))?;
    tempfile::Builder::new()
      .prefix(".stage-")
      .tempdir_in(&staging_root)
      .map_err(|e| StoreError::io(&staging_root, e))
  }

  /// Return the entry if it is complete and intact.
  ///
  /// Incomplete or corrupted entries are removed so the caller rebuilds them.
  pub fn lookup(&self, kind: EntryKind, hash: &ObjectHash, name: &str) -> Result<Option<PathBuf>, StoreError> {
    let path = self.entry_path(kind, hash, name);
    if !path.exists() {
      return Ok(None);
    }

    let valid = match read_marker(&path) {
      Ok(Some(marker)) => marker.verify(&path),
      Ok(None) => {
        debug!(path = %path.display(), "incomplete entry found, removing");
        false
      }
      Err(e) => {
        debug!(path = %path.display(), error = %e, "invalid marker, removing");
        false
      }
    };

    if valid {
      debug!(path = %path.display(), "store entry present (cache hit)");
      return Ok(Some(path));
    }

    std::fs::remove_dir_all(&path).map_err(|e| StoreError::io(&path, e))?;
    Ok(None)
  }

  /// Move a populated staging directory into place, named by its content hash.
  ///
  /// When an identical entry already exists the staging copy is discarded.
  pub fn commit_staged(&self, kind: EntryKind, name: &str, staging: TempDir) -> Result<Realized, StoreError> {
    let content = hash_directory(staging.path(), HASH_EXCLUSIONS)?;
    let hash = ObjectHash::from_content(&content);

    if let Some(path) = self.lookup(kind, &hash, name)? {
      return Ok(Realized {
        hash,
        path,
        cache_hit: true,
      });
    }

    marker::write_marker(staging.path(), &content)?;

    let path = self.entry_path(kind, &hash, name);
    let parent = self.kind_dir(kind);
    std::fs::create_dir_all(&parent).map_err(|e| StoreError::io(&parent, e))?;
    std::fs::rename(staging.path(), &path).map_err(|e| StoreError::io(&path, e))?;

    Ok(Realized {
      hash,
      path,
      cache_hit: false,
    })
  }

  /// Realize an entry keyed by its inputs.
  ///
  /// On a cache miss `build` runs with the (fresh, empty) entry directory;
  /// its `tmp/` subdirectory is removed afterwards and the marker written.
  /// A failed build leaves the entry without a marker, so the next lookup
  /// discards it.
  pub async fn realize<F, Fut, E>(&self, kind: EntryKind, hash: &ObjectHash, name: &str, build: F) -> Result<Realized, E>
  where
    F: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: From<StoreError>,
  {
    if let Some(path) = self.lookup(kind, hash, name)? {
      return Ok(Realized {
        hash: hash.clone(),
        path,
        cache_hit: true,
      });
    }

    let path = self.entry_path(kind, hash, name);
    std::fs::create_dir_all(&path).map_err(|e| StoreError::io(&path, e))?;

    build(path.clone()).await?;

    let tmp = path.join("tmp");
    if tmp.exists() {
      // Leftovers in tmp/ are excluded from the hash; a failed cleanup is not fatal.
      if let Err(e) = std::fs::remove_dir_all(&tmp) {
        warn!(path = %tmp.display(), error = %e, "failed to remove build temp directory");
      }
    }

    let content = hash_directory(&path, HASH_EXCLUSIONS).map_err(StoreError::from)?;
    marker::write_marker(&path, &content)?;

    Ok(Realized {
      hash: hash.clone(),
      path,
      cache_hit: false,
    })
  }

  /// Every entry directory currently in the store.
  pub fn entries(&self) -> Result<Vec<(EntryKind, PathBuf)>, StoreError> {
    let mut out = Vec::new();
    for kind in EntryKind::ALL {
      let dir = self.kind_dir(kind);
      let read = match std::fs::read_dir(&dir) {
        Ok(read) => read,
        Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
        Err(e) => return Err(StoreError::io(&dir, e)),
      };
      for entry in read.flatten() {
        out.push((kind, entry.path()));
      }
    }
    out.sort();
    Ok(out)
  }
}
