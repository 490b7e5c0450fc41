mod build;
mod check;
mod classify;
mod diff_sources;
mod gc;
mod info;
mod plan;
mod shell;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;

use zbuild_lib::execute::{RunResult, Stage};
use zbuild_lib::project::Project;
use zbuild_lib::store::Store;
use zbuild_lib::workspace::BuildContext;

use crate::output::{Mark, stage_line, status};

pub use build::cmd_build;
pub use check::cmd_check;
pub use classify::cmd_classify;
pub use diff_sources::cmd_diff_sources;
pub use gc::cmd_gc;
pub use info::cmd_info;
pub use plan::cmd_plan;
pub use shell::cmd_shell;

fn load_project(file: &Path) -> Result<Project> {
  Project::load(file).with_context(|| format!("Failed to load project: {}", file.display()))
}

/// Load the project and resolve everything that must fail before any stage runs.
fn load_context(file: &Path) -> Result<BuildContext> {
  let project = load_project(file)?;
  BuildContext::new(project, Store::default_store()).context("Failed to resolve build inputs")
}

fn runtime() -> Result<tokio::runtime::Runtime> {
  tokio::runtime::Runtime::new().context("Failed to create async runtime")
}

#[derive(Debug, Serialize)]
struct RealizedStage {
  stage: Stage,
  path: Option<PathBuf>,
  cached: bool,
}

#[derive(Debug, Serialize)]
struct FailedStage {
  stage: Stage,
  error: String,
}

#[derive(Debug, Serialize)]
struct SkippedStage {
  stage: Stage,
  cause: Stage,
}

/// Serializable view of a [`RunResult`].
#[derive(Debug, Serialize)]
struct RunReport {
  success: bool,
  realized: Vec<RealizedStage>,
  failed: Vec<FailedStage>,
  skipped: Vec<SkippedStage>,
}

impl From<&RunResult> for RunReport {
  fn from(result: &RunResult) -> Self {
    Self {
      success: result.is_success(),
      realized: result
        .realized
        .iter()
        .map(|(stage, out)| RealizedStage {
          stage: stage.clone(),
          path: out.path().map(Path::to_path_buf),
          cached: out.cache_hit(),
        })
        .collect(),
      failed: result
        .failed
        .iter()
        .map(|(stage, e)| FailedStage {
          stage: stage.clone(),
          error: e.to_string(),
        })
        .collect(),
      skipped: result
        .skipped
        .iter()
        .map(|(stage, cause)| SkippedStage {
          stage: stage.clone(),
          cause: cause.clone(),
        })
        .collect(),
    }
  }
}

/// Print one line per stage, then the diagnostics of failed stages.
fn print_run(result: &RunResult) {
  for (stage, out) in &result.realized {
    if out.cache_hit() {
      stage_line(Mark::Cached, stage, "cached");
    } else {
      stage_line(Mark::Ok, stage, "built");
    }
  }
  for (stage, cause) in &result.skipped {
    stage_line(Mark::Skipped, stage, &format!("skipped, {} failed", cause));
  }
  for (stage, e) in &result.failed {
    status(Mark::Fail, &format!("{} failed: {}", stage, e));
  }
  if !result.skipped.is_empty() {
    status(Mark::Warn, &format!("{} stage(s) skipped", result.skipped.len()));
  }
}

/// Turn a run with failed stages into an error naming them.
fn ensure_success(result: &RunResult) -> Result<()> {
  if result.failed.is_empty() && result.skipped.is_empty() {
    return Ok(());
  }
  let failed: Vec<String> = result.failed.keys().map(Stage::to_string).collect();
  bail!(
    "{} stage(s) failed ({}), {} skipped",
    result.failed.len(),
    failed.join(", "),
    result.skipped.len()
  )
}
