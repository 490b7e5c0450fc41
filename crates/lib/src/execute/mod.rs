//! Stage execution.
//!
//! This module provides the entry points for running a project's stage DAG:
//! - DAG-based dependency ordering
//! - Parallel execution of independent stages within a wave
//! - Failure propagation and skip tracking
//! - Planning (stage keys and cache status without running commands)

pub mod cmd;
pub mod dag;
pub mod types;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::workspace::{BuildContext, output_hashes};

pub use dag::StageDag;
pub use types::{RunResult, SourceSet, Stage, StageError, StageOutput};

/// Run every stage of `dag`.
///
/// Waves run in order; the ready stages of a wave run concurrently, at most
/// `project.parallelism` at a time. A failed stage makes every stage that
/// depends on it, directly or not, skipped. Independent stages still run.
pub async fn run(ctx: Arc<BuildContext>, dag: &StageDag) -> Result<RunResult, StageError> {
  let waves = dag.waves()?;
  info!(stages = dag.len(), waves = waves.len(), "starting stage execution");

  let mut result = RunResult::default();
  let semaphore = Arc::new(Semaphore::new(ctx.project.parallelism));

  for (wave_idx, wave) in waves.iter().enumerate() {
    debug!(wave = wave_idx, stages = wave.len(), "executing wave");

    let mut ready = Vec::new();
    for stage in wave {
      match find_failed_dependency(stage, dag, &result) {
        Some(cause) => {
          warn!(stage = %stage, failed_dep = %cause, "skipping stage due to failed dependency");
          result.skipped.insert(stage.clone(), cause);
        }
        None => ready.push(stage.clone()),
      }
    }

    if ready.is_empty() {
      continue;
    }

    for (stage, outcome) in execute_wave(&ready, &ctx, &result.realized, semaphore.clone()).await {
      match outcome {
        Ok(output) => {
          info!(stage = %stage, cached = output.cache_hit(), "stage realized");
          result.realized.insert(stage, output);
        }
        Err(e) => {
          error!(stage = %stage, error = %e, "stage failed");
          result.failed.insert(stage, e);
        }
      }
    }
  }

  info!(
    realized = result.realized.len(),
    failed = result.failed.len(),
    skipped = result.skipped.len(),
    "stage execution complete"
  );

  Ok(result)
}

/// The failed stage behind a stage's skip, if any of its dependencies failed
/// or was itself skipped.
fn find_failed_dependency(stage: &Stage, dag: &StageDag, result: &RunResult) -> Option<Stage> {
  for dep in dag.dependencies(stage) {
    if result.failed.contains_key(&dep) {
      return Some(dep);
    }
    if let Some(cause) = result.skipped.get(&dep) {
      return Some(cause.clone());
    }
  }
  None
}

/// Execute a wave of stages in parallel.
async fn execute_wave(
  stages: &[Stage],
  ctx: &Arc<BuildContext>,
  completed: &BTreeMap<Stage, StageOutput>,
  semaphore: Arc<Semaphore>,
) -> Vec<(Stage, Result<StageOutput, StageError>)> {
  let completed = Arc::new(completed.clone());
  let mut join_set = JoinSet::new();

  for stage in stages {
    let stage = stage.clone();
    let ctx = ctx.clone();
    let completed = completed.clone();
    let semaphore = semaphore.clone();

    join_set.spawn(async move {
      let outcome = match semaphore.acquire_owned().await {
        Ok(_permit) => ctx.realize(&stage, &completed).await,
        Err(e) => Err(StageError::Aborted(e.to_string())),
      };
      (stage, outcome)
    });
  }

  let mut results = Vec::new();
  while let Some(joined) = join_set.join_next().await {
    match joined {
      Ok(result) => results.push(result),
      Err(e) => {
        // The stage is unknown once its task panicked; the run still reports it as failed below.
        error!(error = %e, "stage task panicked");
      }
    }
  }

  for stage in stages {
    if !results.iter().any(|(s, _)| s == stage) {
      results.push((stage.clone(), Err(StageError::Aborted("task panicked".to_string()))));
    }
  }

  results
}

/// Cache status of a stage in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
  /// Realized from the workspace while planning.
  Evaluated,
  /// A complete entry already exists.
  Cached,
  /// Will run.
  Build,
  /// Cannot be planned because an evaluation stage failed.
  Blocked,
}

/// One stage of a plan.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedStage {
  pub stage: Stage,
  pub wave: usize,
  pub status: PlanStatus,
  pub dependencies: Vec<Stage>,
  /// Store path, when known.
  pub path: Option<std::path::PathBuf>,
}

/// Compute every stage's key and cache status without running build commands.
///
/// Evaluation stages (source selection, toolchain probe, selection diff) are
/// realized, since every other key is derived from them.
pub async fn plan(ctx: &BuildContext, dag: &StageDag) -> Result<Vec<PlannedStage>, StageError> {
  let waves = dag.waves()?;
  let mut evaluated = BTreeMap::new();
  let mut blocked: BTreeSet<Stage> = BTreeSet::new();

  for stage in waves.iter().flatten().filter(|s| s.is_evaluation()) {
    match ctx.realize(stage, &evaluated).await {
      Ok(output) => {
        evaluated.insert(stage.clone(), output);
      }
      Err(e) => {
        warn!(stage = %stage, error = %e, "evaluation stage failed while planning");
        blocked.insert(stage.clone());
      }
    }
  }

  let mut hashes = output_hashes(&evaluated)?;
  let mut planned = Vec::new();

  for (wave_idx, wave) in waves.iter().enumerate() {
    for stage in wave {
      let dependencies = dag.dependencies(stage);
      let (status, path) = if let Some(output) = evaluated.get(stage) {
        (PlanStatus::Evaluated, output.path().map(|p| p.to_path_buf()))
      } else if blocked.contains(stage) || dependencies.iter().any(|d| blocked.contains(d)) {
        blocked.insert(stage.clone());
        (PlanStatus::Blocked, None)
      } else {
        match ctx.stage_id(stage, &hashes)? {
          Some(id) => {
            let path = ctx.store.entry_path(id.kind, &id.hash, &id.name);
            let cached = ctx.store.lookup(id.kind, &id.hash, &id.name)?.is_some();
            hashes.insert(stage.clone(), id.hash);
            (if cached { PlanStatus::Cached } else { PlanStatus::Build }, Some(path))
          }
          None => (PlanStatus::Build, None),
        }
      };

      planned.push(PlannedStage {
        stage: stage.clone(),
        wave: wave_idx,
        status,
        dependencies,
        path,
      });
    }
  }

  Ok(planned)
}
