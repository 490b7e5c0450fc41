//! The workspace builder: toolchain, dependency artifact set, targets,
//! book and hygiene checks.
//!
//! A [`BuildContext`] knows how to realize every [`Stage`] of a project.
//! Command stages live in store entries keyed by a hash of their inputs, so
//! their identity is known before they run: the dependency artifact set is
//! keyed by the build source tree, the resolved toolchain and the declared
//! build inputs, and every consumer key includes the artifact set's key.

mod env;
mod stages;

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use tracing::debug;

use crate::classify::Strategy;
use crate::execute::dag::producer;
use crate::execute::types::{SourceSet, Stage, StageError, StageOutput};
use crate::project::{CheckKind, Project};
use crate::select::check_declared;
use crate::store::{EntryKind, Store};
use crate::toolchain::ToolchainSpec;
use crate::util::hash::{Hashable, ObjectHash};

pub use env::{HostEnv, command_env};
pub use stages::{CHECK_LOG, book_diagnostics};

/// Store identity of an input-keyed stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageId {
  pub kind: EntryKind,
  pub hash: ObjectHash,
  pub name: String,
}

#[derive(Serialize)]
struct DepsKey<'a> {
  source: &'a ObjectHash,
  toolchain: &'a ObjectHash,
  env: &'a BTreeMap<String, String>,
  native: &'a [PathBuf],
  tools: &'a [PathBuf],
  command: &'a str,
}

impl Hashable for DepsKey<'_> {}

/// Key of every stage consuming the artifact set or the docs tree.
#[derive(Serialize)]
struct ConsumerKey<'a> {
  stage: String,
  input: &'a ObjectHash,
  command: &'a str,
}

impl Hashable for ConsumerKey<'_> {}

#[derive(Serialize)]
struct LinkKey<'a> {
  name: &'a str,
  outputs: BTreeMap<&'a str, (String, ObjectHash)>,
}

impl Hashable for LinkKey<'_> {}

/// Everything needed to realize a project's stages.
#[derive(Debug, Clone)]
pub struct BuildContext {
  pub project: Project,
  pub store: Store,
  /// Loaded when any stage needs a toolchain.
  pub toolchain: Option<ToolchainSpec>,
  pub host: HostEnv,
  /// Shell override for build commands.
  pub shell: Option<String>,
}

impl BuildContext {
  /// Resolve everything that must fail before any stage runs: the pinned
  /// toolchain file and the declared paths.
  ///
  /// Fileset rules name root-relative paths, so they must exist; legacy
  /// rules name directories at any depth and are not checked.
  pub fn new(project: Project, store: Store) -> Result<Self, StageError> {
    let toolchain = if project.needs_toolchain() {
      Some(ToolchainSpec::load(&project.toolchain_file)?)
    } else {
      None
    };
    check_declared(&project.root, &project.docs)?;
    if project.strategy == Strategy::Fileset {
      check_declared(&project.root, &project.rules.include)?;
      check_declared(&project.root, &project.rules.prune)?;
    }

    Ok(Self {
      project,
      store,
      toolchain,
      host: HostEnv::capture(),
      shell: None,
    })
  }

  /// Environment for commands; `channel` pins rustup.
  pub fn env(&self, channel: Option<&str>) -> BTreeMap<String, String> {
    command_env(&self.project, &self.host, channel)
  }

  fn entry_name(&self, suffix: &str) -> String {
    format!("{}-{}", self.project.name, suffix)
  }

  /// The store identity of an input-keyed stage, from the identities of
  /// the stages it depends on.
  ///
  /// Returns `None` for evaluation stages and the selection check, which
  /// are not keyed by inputs.
  pub fn stage_id(&self, stage: &Stage, hashes: &BTreeMap<Stage, ObjectHash>) -> Result<Option<StageId>, StageError> {
    let input = |dep: &Stage| hashes.get(dep).ok_or_else(|| StageError::MissingInput(dep.clone()));
    let commands = &self.project.commands;

    let id = match stage {
      Stage::Source(_) | Stage::Toolchain | Stage::SourceDiff | Stage::Check(CheckKind::Selection) => return Ok(None),
      Stage::Deps => StageId {
        kind: EntryKind::Deps,
        hash: DepsKey {
          source: input(&Stage::Source(SourceSet::Build))?,
          toolchain: input(&Stage::Toolchain)?,
          env: &self.project.build_inputs.env,
          native: &self.project.build_inputs.native,
          tools: &self.project.tools,
          command: &commands.deps,
        }
        .compute_hash()?,
        name: self.entry_name("deps"),
      },
      Stage::Target(name) => StageId {
        kind: EntryKind::Target,
        hash: ConsumerKey {
          stage: stage.to_string(),
          input: input(&Stage::Deps)?,
          command: &commands.target,
        }
        .compute_hash()?,
        name: name.clone(),
      },
      Stage::Check(kind) => StageId {
        kind: EntryKind::Check,
        hash: ConsumerKey {
          stage: stage.to_string(),
          input: input(&Stage::Deps)?,
          command: commands.check(*kind).unwrap_or_default(),
        }
        .compute_hash()?,
        name: self.entry_name(kind.as_str()),
      },
      Stage::Book => StageId {
        kind: EntryKind::Book,
        hash: ConsumerKey {
          stage: stage.to_string(),
          input: input(&Stage::Source(SourceSet::Docs))?,
          command: &commands.book,
        }
        .compute_hash()?,
        name: self.entry_name("book"),
      },
      Stage::Link => {
        let mut outputs = BTreeMap::new();
        for (key, output) in self.project.outputs.iter() {
          let producer = producer(output);
          let hash = input(&producer)?.clone();
          outputs.insert(key.as_str(), (output.to_string(), hash));
        }
        StageId {
          kind: EntryKind::Result,
          hash: LinkKey {
            name: &self.project.name,
            outputs,
          }
          .compute_hash()?,
          name: self.project.name.clone(),
        }
      }
    };

    debug!(stage = %stage, hash = %id.hash, "computed stage key");
    Ok(Some(id))
  }
}

/// Identities of realized stages, for computing downstream keys.
pub fn output_hashes(outputs: &BTreeMap<Stage, StageOutput>) -> Result<BTreeMap<Stage, ObjectHash>, StageError> {
  outputs
    .iter()
    .map(|(stage, output)| Ok((stage.clone(), output.hash()?)))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::project::{BuildSourcesDecl, ProjectDecl, SourcesDecl};
  use crate::select::SelectError;
  use crate::util::testutil::crosslink_workspace;
  use std::path::Path;

  fn context(env: &[(&str, &str)]) -> BuildContext {
    let mut decl = ProjectDecl {
      name: Some("zebra".to_string()),
      targets: vec!["zebrad".to_string()],
      ..Default::default()
    };
    for (k, v) in env {
      decl.build_inputs.env.insert(k.to_string(), v.to_string());
    }
    BuildContext {
      project: decl.validate(Path::new("/ws/build.lua")).unwrap(),
      store: Store::new(PathBuf::from("/store")),
      toolchain: None,
      host: HostEnv {
        path: Vec::new(),
        home: PathBuf::from("/home/dev"),
        cargo_home: PathBuf::from("/home/dev/.cargo"),
        rustup_home: PathBuf::from("/home/dev/.rustup"),
      },
      shell: None,
    }
  }

  fn hashes(source: &str, toolchain: &str) -> BTreeMap<Stage, ObjectHash> {
    BTreeMap::from([
      (Stage::Source(SourceSet::Build), ObjectHash(source.to_string())),
      (Stage::Toolchain, ObjectHash(toolchain.to_string())),
    ])
  }

  fn deps_hash(ctx: &BuildContext, hashes: &BTreeMap<Stage, ObjectHash>) -> ObjectHash {
    ctx.stage_id(&Stage::Deps, hashes).unwrap().unwrap().hash
  }

  #[test]
  fn deps_key_is_stable() {
    let ctx = context(&[]);
    assert_eq!(deps_hash(&ctx, &hashes("src1", "tc1")), deps_hash(&ctx, &hashes("src1", "tc1")));
  }

  #[test]
  fn deps_key_changes_with_every_input() {
    let ctx = context(&[]);
    let base = deps_hash(&ctx, &hashes("src1", "tc1"));

    assert_ne!(base, deps_hash(&ctx, &hashes("src2", "tc1")));
    assert_ne!(base, deps_hash(&ctx, &hashes("src1", "tc2")));

    let with_env = context(&[("LIBCLANG_PATH", "/opt/llvm/lib")]);
    assert_ne!(base, deps_hash(&with_env, &hashes("src1", "tc1")));
  }

  #[test]
  fn consumers_follow_the_artifact_set() {
    let ctx = context(&[]);
    let mut first = hashes("src1", "tc1");
    first.insert(Stage::Deps, deps_hash(&ctx, &first));
    let mut second = hashes("src2", "tc1");
    second.insert(Stage::Deps, deps_hash(&ctx, &second));

    let target = Stage::Target("zebrad".into());
    let a = ctx.stage_id(&target, &first).unwrap().unwrap();
    let b = ctx.stage_id(&target, &second).unwrap().unwrap();
    assert_ne!(a.hash, b.hash);
    assert_eq!(a.kind, EntryKind::Target);
    assert_eq!(a.name, "zebrad");
  }

  #[test]
  fn checks_and_targets_have_distinct_keys() {
    let ctx = context(&[]);
    let mut h = hashes("src1", "tc1");
    h.insert(Stage::Deps, deps_hash(&ctx, &h));

    let fmt = ctx.stage_id(&Stage::Check(CheckKind::Fmt), &h).unwrap().unwrap();
    let clippy = ctx.stage_id(&Stage::Check(CheckKind::Clippy), &h).unwrap().unwrap();
    assert_ne!(fmt.hash, clippy.hash);
    assert_eq!(fmt.name, "zebra-fmt");
  }

  #[test]
  fn evaluation_stages_have_no_key() {
    let ctx = context(&[]);
    let h = BTreeMap::new();
    assert!(ctx.stage_id(&Stage::Toolchain, &h).unwrap().is_none());
    assert!(ctx.stage_id(&Stage::Check(CheckKind::Selection), &h).unwrap().is_none());
  }

  #[test]
  fn missing_input_is_reported() {
    let ctx = context(&[]);
    let err = ctx.stage_id(&Stage::Deps, &BTreeMap::new()).unwrap_err();
    assert!(matches!(err, StageError::MissingInput(Stage::Source(SourceSet::Build))));
  }

  fn declared_context(include: &str, strategy: Strategy) -> Result<BuildContext, StageError> {
    let temp = tempfile::TempDir::new().unwrap();
    crosslink_workspace(temp.path());
    let decl = ProjectDecl {
      name: Some("zebra".to_string()),
      sources: SourcesDecl {
        build: BuildSourcesDecl {
          include: vec![include.to_string()],
          prune: vec!["docker".to_string()],
          strategy,
        },
        ..Default::default()
      },
      checks: Some(vec!["selection".to_string()]),
      ..Default::default()
    };
    let project = decl.validate(&temp.path().join("build.lua")).unwrap();
    BuildContext::new(project, Store::new(temp.path().join("store")))
  }

  #[test]
  fn misspelled_fileset_include_is_fatal() {
    let err = declared_context("crosslink-test-dta", Strategy::Fileset).unwrap_err();
    assert!(
      matches!(err, StageError::Select(SelectError::MissingPath { ref path, .. }) if path == "crosslink-test-dta"),
      "unexpected error: {err}"
    );
    assert!(declared_context("crosslink-test-data", Strategy::Fileset).is_ok());
  }

  #[test]
  fn legacy_names_are_not_checked() {
    assert!(declared_context("crosslink-test-dta", Strategy::Legacy).is_ok());
  }
}
