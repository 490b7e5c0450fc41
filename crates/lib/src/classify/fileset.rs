//! Prefix-based classification: the union of declared filesets.

use std::path::Path;

use crate::pathset::PathSet;

use super::{Classifier, Region, Rules, Strategy};

/// Selected = (included filesets ∪ default Cargo sources) ∖ pruned filesets,
/// all rules interpreted as root-relative prefixes.
#[derive(Debug, Clone)]
pub struct FilesetUnion {
  included: PathSet,
  pruned: PathSet,
}

impl FilesetUnion {
  pub fn new(rules: &Rules) -> Self {
    Self {
      included: rules.include.clone(),
      pruned: rules.prune.clone(),
    }
  }
}

impl Classifier for FilesetUnion {
  fn strategy(&self) -> Strategy {
    Strategy::Fileset
  }

  fn classify(&self, rel: &Path) -> Region {
    if self.pruned.contains(rel) {
      Region::Pruned
    } else if self.included.contains(rel) {
      Region::Included
    } else {
      Region::Default
    }
  }
}
