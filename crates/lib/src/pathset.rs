//! Declarative sets of root-relative paths.
//!
//! A `PathSet` is what the configuration declares for documentation sources
//! and for classifier rules. Entries are normalized on insertion and an entry
//! that lives under another entry is absorbed by it, so unions are idempotent.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathSetError {
  #[error("path '{0}' is absolute; declared paths must be relative to the workspace root")]
  Absolute(String),

  #[error("path '{0}' escapes the workspace root")]
  ParentComponent(String),
}

/// Normalize a declared path: forward or back slashes, no `.` components,
/// no trailing separator. `""` and `"."` both name the root itself.
pub fn normalize(raw: &str) -> Result<PathBuf, PathSetError> {
  let unified = raw.replace('\\', "/");
  if unified.starts_with('/') || Path::new(raw).is_absolute() {
    return Err(PathSetError::Absolute(raw.to_string()));
  }

  let mut out = PathBuf::new();
  for part in unified.split('/') {
    match part {
      "" | "." => {}
      ".." => return Err(PathSetError::ParentComponent(raw.to_string())),
      other => out.push(other),
    }
  }
  Ok(out)
}

/// Render a relative path with forward slashes, the form used in diffs and listings.
pub fn display_rel(path: &Path) -> String {
  path
    .components()
    .filter_map(|c| match c {
      Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
      _ => None,
    })
    .collect::<Vec<_>>()
    .join("/")
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PathSet {
  entries: BTreeSet<PathBuf>,
}

impl PathSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Build a set from declared strings, failing on the first invalid entry.
  pub fn from_declared<I, S>(declared: I) -> Result<Self, PathSetError>
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let mut set = Self::new();
    for raw in declared {
      set.insert(normalize(raw.as_ref())?);
    }
    Ok(set)
  }

  /// Insert an already-normalized path.
  ///
  /// Returns `false` when the set already covered it.
  pub fn insert(&mut self, path: PathBuf) -> bool {
    if self.contains(&path) {
      return false;
    }
    self.entries.retain(|existing| !existing.starts_with(&path));
    self.entries.insert(path);
    true
  }

  /// Union another set into this one.
  pub fn extend(&mut self, other: &PathSet) {
    for entry in &other.entries {
      self.insert(entry.clone());
    }
  }

  /// True when `rel` equals an entry or lives beneath one.
  pub fn contains(&self, rel: &Path) -> bool {
    self.entries.iter().any(|entry| rel.starts_with(entry))
  }

  /// Final path component of every entry, used by name-based matching.
  pub fn base_names(&self) -> BTreeSet<String> {
    self
      .entries
      .iter()
      .filter_map(|e| e.file_name())
      .map(|n| n.to_string_lossy().into_owned())
      .collect()
  }

  pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
    self.entries.iter()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

impl<'de> Deserialize<'de> for PathSet {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let declared = Vec::<String>::deserialize(deserializer)?;
    PathSet::from_declared(declared).map_err(serde::de::Error::custom)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalize_strips_dots_and_trailing_separators() {
    assert_eq!(normalize("./book/").unwrap(), PathBuf::from("book"));
    assert_eq!(normalize("a//b/./c").unwrap(), PathBuf::from("a/b/c"));
    assert_eq!(normalize("a\\b").unwrap(), PathBuf::from("a/b"));
    assert_eq!(normalize(".").unwrap(), PathBuf::new());
  }

  #[test]
  fn normalize_rejects_escapes() {
    assert_eq!(normalize("/etc").unwrap_err(), PathSetError::Absolute("/etc".into()));
    assert_eq!(
      normalize("a/../../b").unwrap_err(),
      PathSetError::ParentComponent("a/../../b".into())
    );
  }

  #[test]
  fn duplicate_and_nested_entries_collapse() {
    let set = PathSet::from_declared(["book", "book/", "./book/src", "README.md"]).unwrap();
    let entries: Vec<_> = set.iter().cloned().collect();
    assert_eq!(entries, vec![PathBuf::from("README.md"), PathBuf::from("book")]);
  }

  #[test]
  fn broader_entry_absorbs_existing_children() {
    let mut set = PathSet::from_declared(["book/src", "book/theme"]).unwrap();
    assert!(set.insert(PathBuf::from("book")));
    assert_eq!(set.len(), 1);
    assert!(!set.insert(PathBuf::from("book/src/SUMMARY.md")));
  }

  #[test]
  fn contains_is_component_wise() {
    let set = PathSet::from_declared(["docker"]).unwrap();
    assert!(set.contains(Path::new("docker")));
    assert!(set.contains(Path::new("docker/Dockerfile")));
    assert!(!set.contains(Path::new("dockerfiles/x")));
  }

  #[test]
  fn union_is_idempotent() {
    let a = PathSet::from_declared(["book", "README.md"]).unwrap();
    let mut b = a.clone();
    b.extend(&a);
    assert_eq!(a, b);
  }

  #[test]
  fn base_names_take_last_component() {
    let set = PathSet::from_declared(["zebra-crosslink/data", "docker"]).unwrap();
    let names: Vec<_> = set.base_names().into_iter().collect();
    assert_eq!(names, vec!["data".to_string(), "docker".to_string()]);
  }

  #[test]
  fn display_rel_uses_forward_slashes() {
    assert_eq!(display_rel(Path::new("a").join("b").join("c.rs").as_path()), "a/b/c.rs");
  }
}
