//! Source selection: turning declared paths into materialized source trees.
//!
//! A [`SourceTree`] is a store entry holding exactly the selected files,
//! symlinks resolved into plain copies so downstream tools never have to
//! follow indirection. Its name in the store is the hash of its contents,
//! which makes it usable as a cache key for every stage built from it.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::classify::{Classifier, is_noise};
use crate::pathset::{PathSet, display_rel};
use crate::store::{EntryKind, Store, StoreError};
use crate::util::fs::copy_file;
use crate::util::hash::ObjectHash;

#[derive(Debug, Error)]
pub enum SelectError {
  #[error("workspace root {0} does not exist or is not a directory")]
  MissingRoot(PathBuf),

  #[error("declared path '{path}' does not exist under {root}")]
  MissingPath { root: PathBuf, path: String },

  #[error("failed to walk {path}: {message}")]
  Walk { path: PathBuf, message: String },

  #[error("failed to copy {path}: {source}")]
  Copy {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Store(#[from] StoreError),
}

/// A selected, materialized source tree in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceTree {
  pub name: String,
  pub hash: ObjectHash,
  pub path: PathBuf,
  /// Selected files, root-relative, sorted.
  pub files: Vec<PathBuf>,
  pub cache_hit: bool,
}

/// Select every declared path (directories recursively) under `root`.
///
/// Every declared path must exist; there is no best-effort mode.
pub fn select(store: &Store, root: &Path, name: &str, set: &PathSet) -> Result<SourceTree, SelectError> {
  check_declared(root, set)?;

  let mut files = Vec::new();
  for entry in set.iter() {
    collect_declared(root, entry, &mut files)?;
  }
  files.sort();
  files.dedup();

  materialize(store, root, name, files)
}

/// Select the files `classifier` keeps from a full walk of `root`.
pub fn select_filtered(
  store: &Store,
  root: &Path,
  name: &str,
  classifier: &dyn Classifier,
) -> Result<SourceTree, SelectError> {
  let files = collect_selected(root, classifier)?;
  materialize(store, root, name, files)
}

/// Walk `root` and list the files `classifier` selects, sorted.
///
/// Noise (VCS metadata, editor backups, root build products) is dropped
/// before classification, pruned directories are not entered, and
/// directory symlinks are not followed.
pub fn collect_selected(root: &Path, classifier: &dyn Classifier) -> Result<Vec<PathBuf>, SelectError> {
  check_root(root)?;

  let walker = WalkDir::new(root).sort_by_file_name().into_iter().filter_entry(|e| {
    if e.depth() == 0 {
      return true;
    }
    let Ok(rel) = e.path().strip_prefix(root) else {
      return false;
    };
    let is_dir = e.file_type().is_dir();
    !is_noise(rel, is_dir) && (!is_dir || classifier.enters_dir(rel))
  });

  let mut files = Vec::new();
  for entry in walker {
    let entry = entry.map_err(|e| SelectError::Walk {
      path: root.to_path_buf(),
      message: e.to_string(),
    })?;
    if entry.depth() == 0 {
      continue;
    }

    let is_file = if entry.file_type().is_symlink() {
      std::fs::metadata(entry.path()).map(|m| m.is_file()).unwrap_or(false)
    } else {
      entry.file_type().is_file()
    };
    if !is_file {
      continue;
    }

    let rel = entry.path().strip_prefix(root).unwrap_or(entry.path()).to_path_buf();
    if classifier.selects_file(&rel) {
      files.push(rel);
    }
  }

  debug!(
    strategy = %classifier.strategy(),
    count = files.len(),
    "collected selected files"
  );
  Ok(files)
}

/// Fail on the first declared path missing under `root`.
pub fn check_declared(root: &Path, set: &PathSet) -> Result<(), SelectError> {
  check_root(root)?;
  for entry in set.iter() {
    // `metadata` follows symlinks, so a dangling link counts as missing.
    if std::fs::metadata(root.join(entry)).is_err() {
      return Err(SelectError::MissingPath {
        root: root.to_path_buf(),
        path: display_rel(entry),
      });
    }
  }
  Ok(())
}

fn check_root(root: &Path) -> Result<(), SelectError> {
  if root.is_dir() {
    Ok(())
  } else {
    Err(SelectError::MissingRoot(root.to_path_buf()))
  }
}

fn collect_declared(root: &Path, entry: &Path, files: &mut Vec<PathBuf>) -> Result<(), SelectError> {
  let abs = root.join(entry);
  if abs.is_file() {
    files.push(entry.to_path_buf());
    return Ok(());
  }

  let walker = WalkDir::new(&abs).follow_links(true).sort_by_file_name().into_iter();
  for item in walker.filter_entry(|e| {
    e.depth() == 0
      || e
        .path()
        .strip_prefix(root)
        .map(|rel| !is_noise(rel, e.file_type().is_dir()))
        .unwrap_or(false)
  }) {
    let item = item.map_err(|e| SelectError::Walk {
      path: abs.clone(),
      message: e.to_string(),
    })?;
    if item.file_type().is_file() {
      let rel = item.path().strip_prefix(root).unwrap_or(item.path()).to_path_buf();
      files.push(rel);
    }
  }
  Ok(())
}

fn materialize(store: &Store, root: &Path, name: &str, files: Vec<PathBuf>) -> Result<SourceTree, SelectError> {
  let staging = store.staging_dir()?;

  for rel in &files {
    let src = root.join(rel);
    copy_file(&src, &staging.path().join(rel)).map_err(|source| SelectError::Copy { path: src, source })?;
  }

  let realized = store.commit_staged(EntryKind::Source, name, staging)?;

  info!(
    name,
    files = files.len(),
    hash = %realized.hash,
    cached = realized.cache_hit,
    "source tree selected"
  );

  Ok(SourceTree {
    name: name.to_string(),
    hash: realized.hash,
    path: realized.path,
    files,
    cache_hit: realized.cache_hit,
  })
}
