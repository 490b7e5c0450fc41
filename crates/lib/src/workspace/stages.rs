//! Realization of each stage.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{BuildContext, StageId, output_hashes};
use crate::execute::cmd::execute_cmd;
use crate::execute::types::{SourceSet, Stage, StageError, StageOutput};
use crate::link::{OutputRef, link};
use crate::project::CheckKind;
use crate::regression::{DIFF_FILE, compare, write_diff};
use crate::select::{SourceTree, select, select_filtered};
use crate::store::{COMPLETE_MARKER, Realized};
use crate::toolchain::{Toolchain, resolve};
use crate::util::fs::copy_tree;

/// Log file a passed check leaves in its entry.
pub const CHECK_LOG: &str = "check.log";

/// Markers the book renderer uses for problems it otherwise tolerates.
const BOOK_DIAGNOSTIC_MARKERS: &[&str] = &["[WARN]", "[ERROR]"];

fn source<'a>(completed: &'a BTreeMap<Stage, StageOutput>, set: SourceSet) -> Result<&'a SourceTree, StageError> {
  match completed.get(&Stage::Source(set)) {
    Some(StageOutput::Source(tree)) => Ok(tree),
    _ => Err(StageError::MissingInput(Stage::Source(set))),
  }
}

fn toolchain(completed: &BTreeMap<Stage, StageOutput>) -> Result<&Toolchain, StageError> {
  match completed.get(&Stage::Toolchain) {
    Some(StageOutput::Toolchain(toolchain)) => Ok(toolchain),
    _ => Err(StageError::MissingInput(Stage::Toolchain)),
  }
}

fn entry<'a>(completed: &'a BTreeMap<Stage, StageOutput>, stage: &Stage) -> Result<&'a Realized, StageError> {
  match completed.get(stage) {
    Some(StageOutput::Entry(realized)) => Ok(realized),
    _ => Err(StageError::MissingInput(stage.clone())),
  }
}

/// Lines of renderer output that fail the book in strict mode.
pub fn book_diagnostics(stderr: &str) -> Option<String> {
  let lines: Vec<&str> = stderr
    .lines()
    .filter(|line| BOOK_DIAGNOSTIC_MARKERS.iter().any(|m| line.contains(m)))
    .collect();
  if lines.is_empty() { None } else { Some(lines.join("\n")) }
}

impl BuildContext {
  /// Realize one stage from the outputs of the stages it depends on.
  pub async fn realize(&self, stage: &Stage, completed: &BTreeMap<Stage, StageOutput>) -> Result<StageOutput, StageError> {
    match stage {
      Stage::Source(SourceSet::Build) => {
        let classifier = self.project.strategy.classifier(&self.project.rules);
        let tree = select_filtered(&self.store, &self.project.root, &self.entry_name("src"), classifier.as_ref())?;
        Ok(StageOutput::Source(tree))
      }
      Stage::Source(SourceSet::Docs) => {
        let tree = select(&self.store, &self.project.root, &self.entry_name("doc-src"), &self.project.docs)?;
        Ok(StageOutput::Source(tree))
      }
      Stage::Toolchain => Ok(StageOutput::Toolchain(self.resolve_toolchain().await?)),
      Stage::SourceDiff => {
        let diff = compare(&self.project.root, &self.project.rules)?;
        Ok(StageOutput::Entry(write_diff(&self.store, &diff)?))
      }
      Stage::Check(CheckKind::Selection) => {
        let diff = entry(completed, &Stage::SourceDiff)?;
        let file = diff.path.join(DIFF_FILE);
        let content = std::fs::read_to_string(&file)?;
        if !content.is_empty() {
          return Err(StageError::SelectionDiverged { entry: file, diff: content });
        }
        Ok(StageOutput::Entry(diff.clone()))
      }
      _ => {
        let hashes = output_hashes(completed)?;
        let id = self
          .stage_id(stage, &hashes)?
          .ok_or_else(|| StageError::MissingInput(stage.clone()))?;
        self.realize_keyed(stage, &id, completed).await.map(StageOutput::Entry)
      }
    }
  }

  /// Run the probe against the pinned channel and confirm its version.
  pub async fn resolve_toolchain(&self) -> Result<Toolchain, StageError> {
    let spec = self.toolchain.as_ref().ok_or(StageError::MissingInput(Stage::Toolchain))?;
    let scratch = tempfile::TempDir::new()?;
    let env = self.env(Some(&spec.channel));
    let output = execute_cmd(
      &self.project.commands.probe,
      &env,
      None,
      scratch.path(),
      self.shell.as_deref(),
    )
    .await?;
    let toolchain = resolve(spec, &output.stdout)?;
    info!(channel = %toolchain.channel, version = %toolchain.version, "toolchain resolved");
    Ok(toolchain)
  }

  async fn realize_keyed(
    &self,
    stage: &Stage,
    id: &StageId,
    completed: &BTreeMap<Stage, StageOutput>,
  ) -> Result<Realized, StageError> {
    let realized = match stage {
      Stage::Deps => {
        let src = source(completed, SourceSet::Build)?;
        let channel = toolchain(completed)?.channel.clone();
        self
          .store
          .realize(id.kind, &id.hash, &id.name, |out| async move {
            let mut env = self.env(Some(&channel));
            let work = self.prepare_source(&out, &src.path, &mut env)?;
            env.insert("CARGO_TARGET_DIR".to_string(), display(&out.join("target")));
            self.run(&self.project.commands.deps, &env, &work, &out).await?;
            Ok::<_, StageError>(())
          })
          .await?
      }
      Stage::Target(name) => {
        let deps = entry(completed, &Stage::Deps)?.path.clone();
        let src = source(completed, SourceSet::Build)?;
        let channel = toolchain(completed)?.channel.clone();
        self
          .store
          .realize(id.kind, &id.hash, &id.name, |out| async move {
            let mut env = self.env(Some(&channel));
            let work = self.prepare_source(&out, &src.path, &mut env)?;
            self.prepare_target_dir(&out, &deps, &mut env)?;
            env.insert("ZBUILD_TARGET".to_string(), name.clone());
            self.run(&self.project.commands.target, &env, &work, &out).await?;

            let binary = out.join("bin").join(name);
            if !binary.exists() && !binary.with_extension("exe").exists() {
              return Err(StageError::MissingArtifact {
                stage: stage.clone(),
                path: binary,
              });
            }
            Ok(())
          })
          .await?
      }
      Stage::Check(kind) => {
        let command = self.project.commands.check(*kind).unwrap_or_default().to_string();
        let deps = entry(completed, &Stage::Deps)?.path.clone();
        let src = source(completed, SourceSet::Build)?;
        let channel = toolchain(completed)?.channel.clone();
        self
          .store
          .realize(id.kind, &id.hash, &id.name, |out| async move {
            let mut env = self.env(Some(&channel));
            let work = self.prepare_source(&out, &src.path, &mut env)?;
            self.prepare_target_dir(&out, &deps, &mut env)?;
            let output = self.run(&command, &env, &work, &out).await?;
            let log = out.join(CHECK_LOG);
            std::fs::write(&log, format!("{}\n{}", output.stdout, output.stderr))?;
            Ok::<_, StageError>(())
          })
          .await?
      }
      Stage::Book => {
        let docs = source(completed, SourceSet::Docs)?;
        self
          .store
          .realize(id.kind, &id.hash, &id.name, |out| async move {
            let mut env = self.env(None);
            let work = self.prepare_source(&out, &docs.path, &mut env)?;
            let output = self.run(&self.project.commands.book, &env, &work, &out).await?;
            if let Some(diagnostics) = book_diagnostics(&output.stderr) {
              return Err(StageError::BookDiagnostics(diagnostics));
            }
            Ok(())
          })
          .await?
      }
      Stage::Link => {
        let mapping = self
          .project
          .outputs
          .try_map(|_, output| self.artifact(output, completed))?;
        self
          .store
          .realize(id.kind, &id.hash, &id.name, |out| async move {
            link(&mapping, &out)?;
            Ok::<_, StageError>(())
          })
          .await?
      }
      _ => return Err(StageError::MissingInput(stage.clone())),
    };

    if realized.cache_hit {
      debug!(stage = %stage, path = %realized.path.display(), "stage cached");
    }
    Ok(realized)
  }

  /// Where the artifact behind an output reference lives.
  fn artifact(&self, output: &OutputRef, completed: &BTreeMap<Stage, StageOutput>) -> Result<PathBuf, StageError> {
    Ok(match output {
      OutputRef::Target(name) => {
        let target = entry(completed, &Stage::Target(name.clone()))?;
        let binary = target.path.join("bin").join(name);
        if binary.exists() { binary } else { binary.with_extension("exe") }
      }
      OutputRef::Book => entry(completed, &Stage::Book)?.path.clone(),
      OutputRef::BuildSource => source(completed, SourceSet::Build)?.path.clone(),
      OutputRef::DocsSource => source(completed, SourceSet::Docs)?.path.clone(),
      OutputRef::SourceDiff => entry(completed, &Stage::SourceDiff)?.path.join(DIFF_FILE),
    })
  }

  /// Give the stage a private, writable copy of its source tree.
  fn prepare_source(&self, out: &Path, tree: &Path, env: &mut BTreeMap<String, String>) -> Result<PathBuf, StageError> {
    let work = out.join("tmp").join("src");
    copy_tree(tree, &work, &[COMPLETE_MARKER])?;
    env.insert("src".to_string(), display(&work));
    Ok(work)
  }

  /// Give the stage a private copy of the dependency artifact set; the
  /// shared one is never written to.
  fn prepare_target_dir(&self, out: &Path, deps: &Path, env: &mut BTreeMap<String, String>) -> Result<(), StageError> {
    let target_dir = out.join("tmp").join("target");
    let shared = deps.join("target");
    if shared.exists() {
      copy_tree(&shared, &target_dir, &[])?;
    } else {
      std::fs::create_dir_all(&target_dir)?;
    }
    env.insert("CARGO_TARGET_DIR".to_string(), display(&target_dir));
    Ok(())
  }

  async fn run(
    &self,
    cmd: &str,
    env: &BTreeMap<String, String>,
    work: &Path,
    out: &Path,
  ) -> Result<crate::execute::cmd::CmdOutput, StageError> {
    execute_cmd(cmd, env, Some(work), out, self.shell.as_deref()).await
  }
}

fn display(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}
