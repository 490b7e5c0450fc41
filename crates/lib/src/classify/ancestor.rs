//! Legacy name-based classification.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use super::{Classifier, Region, Rules, Strategy};

/// Classify `path` by walking its ancestors up to `root`.
///
/// Any ancestor (the path included) whose base name is pruned wins
/// immediately; otherwise any included base name wins; otherwise the path
/// falls to the default predicate. The root's own name never matches.
pub fn classify(path: &Path, root: &Path, included: &BTreeSet<String>, pruned: &BTreeSet<String>) -> Region {
  let mut found_included = false;
  let mut current = Some(path);

  while let Some(p) = current {
    if p == root || p.as_os_str().is_empty() {
      break;
    }

    if let Some(name) = p.file_name().map(|n| n.to_string_lossy()) {
      if pruned.contains(name.as_ref()) {
        return Region::Pruned;
      }
      if included.contains(name.as_ref()) {
        found_included = true;
      }
    }

    current = p.parent();
  }

  if found_included { Region::Included } else { Region::Default }
}

/// The ancestor walk over a fixed root and name sets.
#[derive(Debug, Clone)]
pub struct AncestorWalk {
  root: PathBuf,
  included: BTreeSet<String>,
  pruned: BTreeSet<String>,
}

impl AncestorWalk {
  /// Declared entries are reduced to their base names.
  pub fn new(rules: &Rules) -> Self {
    Self {
      root: PathBuf::new(),
      included: rules.include.base_names(),
      pruned: rules.prune.base_names(),
    }
  }
}

impl Classifier for AncestorWalk {
  fn strategy(&self) -> Strategy {
    Strategy::Legacy
  }

  fn classify(&self, rel: &Path) -> Region {
    classify(&self.root.join(rel), &self.root, &self.included, &self.pruned)
  }
}
