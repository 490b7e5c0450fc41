//! Types for stage execution.
//!
//! This module defines the stages of a build, their outputs, the errors a
//! stage can fail with, and the result of running a whole stage DAG.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::link::LinkError;
use crate::project::CheckKind;
use crate::regression::ClassifyError;
use crate::select::{SelectError, SourceTree};
use crate::store::{Realized, StoreError};
use crate::toolchain::{Toolchain, ToolchainError};
use crate::util::hash::{DirHashError, HashError, Hashable, ObjectHash};

/// Which declared path set a source tree is selected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceSet {
  /// Classifier-filtered Rust sources.
  Build,
  /// The documentation path set.
  Docs,
}

impl SourceSet {
  pub fn as_str(&self) -> &'static str {
    match self {
      SourceSet::Build => "build",
      SourceSet::Docs => "docs",
    }
  }
}

/// One node of the build DAG.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(into = "String")]
pub enum Stage {
  Source(SourceSet),
  Toolchain,
  Deps,
  Target(String),
  Book,
  SourceDiff,
  Check(CheckKind),
  Link,
}

impl Stage {
  /// Stages that only read the workspace and host, never run build commands.
  ///
  /// `plan` realizes these to compute every other stage's key.
  pub fn is_evaluation(&self) -> bool {
    matches!(self, Stage::Source(_) | Stage::Toolchain | Stage::SourceDiff)
  }
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Stage::Source(set) => write!(f, "source:{}", set.as_str()),
      Stage::Toolchain => f.write_str("toolchain"),
      Stage::Deps => f.write_str("deps"),
      Stage::Target(name) => write!(f, "target:{}", name),
      Stage::Book => f.write_str("book"),
      Stage::SourceDiff => f.write_str("source-diff"),
      Stage::Check(kind) => write!(f, "check:{}", kind),
      Stage::Link => f.write_str("link"),
    }
  }
}

impl From<Stage> for String {
  fn from(stage: Stage) -> Self {
    stage.to_string()
  }
}

/// Errors a stage can fail with.
#[derive(Debug, Error)]
pub enum StageError {
  /// Command exited unsuccessfully.
  #[error("command failed with exit code {code:?}: {cmd}\n{stderr}")]
  CmdFailed {
    cmd: String,
    code: Option<i32>,
    /// The last lines of stderr.
    stderr: String,
  },

  /// The book renderer reported warnings or errors.
  #[error("book rendered with diagnostics:\n{0}")]
  BookDiagnostics(String),

  /// The two classifier strategies selected different files.
  #[error("classifier strategies diverge (diff at {entry}):\n{diff}")]
  SelectionDiverged { entry: PathBuf, diff: String },

  /// The command succeeded but did not produce what the stage promises.
  #[error("{stage} did not produce {path}")]
  MissingArtifact { stage: Stage, path: PathBuf },

  /// A stage ran before an input it needs was realized.
  #[error("input {0} was not realized")]
  MissingInput(Stage),

  /// Cycle detected in the stage graph.
  #[error("dependency cycle detected")]
  CycleDetected,

  /// Stage task panicked or was cancelled.
  #[error("stage task aborted: {0}")]
  Aborted(String),

  #[error("toolchain error: {0}")]
  Toolchain(#[from] ToolchainError),

  #[error("source selection error: {0}")]
  Select(#[from] SelectError),

  #[error("classification error: {0}")]
  Classify(#[from] ClassifyError),

  #[error("link error: {0}")]
  Link(#[from] LinkError),

  #[error("store error: {0}")]
  Store(#[from] StoreError),

  #[error("failed to hash stage key: {0}")]
  Key(#[from] HashError),

  #[error("failed to hash directory: {0}")]
  DirHash(#[from] DirHashError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// What a realized stage produced.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StageOutput {
  Source(SourceTree),
  Toolchain(Toolchain),
  Entry(Realized),
}

impl StageOutput {
  /// The store path, for stages that occupy one.
  pub fn path(&self) -> Option<&Path> {
    match self {
      StageOutput::Source(tree) => Some(&tree.path),
      StageOutput::Toolchain(_) => None,
      StageOutput::Entry(realized) => Some(&realized.path),
    }
  }

  pub fn cache_hit(&self) -> bool {
    match self {
      StageOutput::Source(tree) => tree.cache_hit,
      StageOutput::Toolchain(_) => false,
      StageOutput::Entry(realized) => realized.cache_hit,
    }
  }

  /// The identity downstream stage keys are derived from.
  pub fn hash(&self) -> Result<ObjectHash, HashError> {
    match self {
      StageOutput::Source(tree) => Ok(tree.hash.clone()),
      StageOutput::Toolchain(toolchain) => toolchain.compute_hash(),
      StageOutput::Entry(realized) => Ok(realized.hash.clone()),
    }
  }
}

/// Result of running a stage DAG.
#[derive(Debug, Default)]
pub struct RunResult {
  /// Successfully realized stages.
  pub realized: BTreeMap<Stage, StageOutput>,

  /// Stages that failed while running.
  pub failed: BTreeMap<Stage, StageError>,

  /// Stages skipped because a dependency failed.
  /// Maps skipped stage -> the failed stage that caused it.
  pub skipped: BTreeMap<Stage, Stage>,
}

impl RunResult {
  /// Returns true if every stage was realized.
  pub fn is_success(&self) -> bool {
    self.failed.is_empty() && self.skipped.is_empty()
  }

  pub fn total(&self) -> usize {
    self.realized.len() + self.failed.len() + self.skipped.len()
  }

  /// Store paths of every realized stage.
  pub fn store_paths(&self) -> Vec<PathBuf> {
    self.realized.values().filter_map(|o| o.path().map(Path::to_path_buf)).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn stage_names_are_stable() {
    assert_eq!(Stage::Source(SourceSet::Build).to_string(), "source:build");
    assert_eq!(Stage::Target("zebrad".into()).to_string(), "target:zebrad");
    assert_eq!(Stage::Check(CheckKind::Clippy).to_string(), "check:clippy");
    assert_eq!(Stage::SourceDiff.to_string(), "source-diff");
  }

  #[test]
  fn evaluation_stages() {
    assert!(Stage::Toolchain.is_evaluation());
    assert!(Stage::Source(SourceSet::Docs).is_evaluation());
    assert!(!Stage::Deps.is_evaluation());
    assert!(!Stage::Check(CheckKind::Selection).is_evaluation());
  }

  #[test]
  fn empty_result_is_success() {
    let result = RunResult::default();
    assert!(result.is_success());
    assert_eq!(result.total(), 0);
  }
}
