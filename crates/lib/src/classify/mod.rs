//! Path classification: which files of the workspace are buildable sources.
//!
//! Every candidate path falls into exactly one [`Region`]. Two strategies
//! implement [`Classifier`]:
//!
//! - [`AncestorWalk`]: the legacy strategy, matching base names of every
//!   ancestor directory.
//! - [`FilesetUnion`]: root-relative prefixes, unioned with the default Cargo
//!   sources. This is the intended behavior.
//!
//! Both are kept alive side by side; [`crate::regression`] diffs their
//! selections over a real tree before the legacy one can be retired.

pub mod ancestor;
pub mod cargo;
pub mod fileset;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::pathset::PathSet;

pub use ancestor::{AncestorWalk, classify};
pub use cargo::{is_cargo_source, is_noise};
pub use fileset::FilesetUnion;

/// Outcome of testing a path against the declared rules.
///
/// Precedence is fixed: `Pruned` beats `Included` beats `Default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
  Pruned,
  Included,
  Default,
}

impl Region {
  pub fn as_str(&self) -> &'static str {
    match self {
      Region::Pruned => "pruned",
      Region::Included => "included",
      Region::Default => "default",
    }
  }
}

impl fmt::Display for Region {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// The declared include and prune rules for the buildable sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rules {
  #[serde(default)]
  pub include: PathSet,
  #[serde(default)]
  pub prune: PathSet,
}

/// Which classifier drives source selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
  #[default]
  Fileset,
  Legacy,
}

impl Strategy {
  pub fn as_str(&self) -> &'static str {
    match self {
      Strategy::Fileset => "fileset",
      Strategy::Legacy => "legacy",
    }
  }

  pub fn classifier(&self, rules: &Rules) -> Box<dyn Classifier> {
    match self {
      Strategy::Fileset => Box::new(FilesetUnion::new(rules)),
      Strategy::Legacy => Box::new(AncestorWalk::new(rules)),
    }
  }
}

impl fmt::Display for Strategy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A strategy deciding the region of a root-relative path.
///
/// Implementations must be pure functions of the path and their rules:
/// they are called once per file in a full tree walk.
pub trait Classifier: Send + Sync {
  fn strategy(&self) -> Strategy;

  fn classify(&self, rel: &Path) -> Region;

  /// Whether a regular file ends up in the buildable source tree.
  fn selects_file(&self, rel: &Path) -> bool {
    match self.classify(rel) {
      Region::Pruned => false,
      Region::Included => true,
      Region::Default => is_cargo_source(rel),
    }
  }

  /// Whether a tree walk should descend into a directory.
  fn enters_dir(&self, rel: &Path) -> bool {
    self.classify(rel) != Region::Pruned
  }
}
