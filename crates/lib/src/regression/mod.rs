//! Shadow validation of the source classifiers.
//!
//! The legacy ancestor walk and the fileset union run over the same tree;
//! any file one selects and the other does not is a regression. The diff is
//! always written to the store, empty or not, so a passing run still leaves
//! evidence behind.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::classify::{Rules, Strategy};
use crate::pathset::display_rel;
use crate::select::{SelectError, collect_selected};
use crate::store::{EntryKind, Realized, Store, StoreError};

/// File name of the diff inside its store entry.
pub const DIFF_FILE: &str = "source-selection.diff";

#[derive(Debug, Error)]
pub enum ClassifyError {
  #[error("failed to walk sources for classification: {0}")]
  Select(#[from] SelectError),

  #[error("failed to write selection diff: {0}")]
  Store(#[from] StoreError),
}

/// Files selected by exactly one of the two strategies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectionDiff {
  pub only_legacy: Vec<PathBuf>,
  pub only_fileset: Vec<PathBuf>,
}

impl SelectionDiff {
  pub fn is_empty(&self) -> bool {
    self.only_legacy.is_empty() && self.only_fileset.is_empty()
  }

  pub fn len(&self) -> usize {
    self.only_legacy.len() + self.only_fileset.len()
  }

  /// `- path` for legacy-only files, `+ path` for fileset-only files, in
  /// path order.
  pub fn render(&self) -> String {
    let mut lines: Vec<(&PathBuf, char)> = self
      .only_legacy
      .iter()
      .map(|p| (p, '-'))
      .chain(self.only_fileset.iter().map(|p| (p, '+')))
      .collect();
    lines.sort();

    let mut out = String::new();
    for (path, sign) in lines {
      let _ = writeln!(out, "{} {}", sign, display_rel(path));
    }
    out
  }
}

/// Run both strategies over `root` and diff their selections.
pub fn compare(root: &Path, rules: &Rules) -> Result<SelectionDiff, ClassifyError> {
  let legacy: BTreeSet<PathBuf> = collect_selected(root, Strategy::Legacy.classifier(rules).as_ref())?
    .into_iter()
    .collect();
  let fileset: BTreeSet<PathBuf> = collect_selected(root, Strategy::Fileset.classifier(rules).as_ref())?
    .into_iter()
    .collect();

  let diff = SelectionDiff {
    only_legacy: legacy.difference(&fileset).cloned().collect(),
    only_fileset: fileset.difference(&legacy).cloned().collect(),
  };

  if diff.is_empty() {
    info!(files = legacy.len(), "classifier strategies agree");
  } else {
    warn!(
      only_legacy = diff.only_legacy.len(),
      only_fileset = diff.only_fileset.len(),
      "classifier strategies diverge"
    );
  }
  Ok(diff)
}

/// Store the rendered diff as its own entry.
pub fn write_diff(store: &Store, diff: &SelectionDiff) -> Result<Realized, ClassifyError> {
  let staging = store.staging_dir()?;
  let path = staging.path().join(DIFF_FILE);
  std::fs::write(&path, diff.render()).map_err(|e| StoreError::io(&path, e))?;
  Ok(store.commit_staged(EntryKind::Diff, "source-selection", staging)?)
}
