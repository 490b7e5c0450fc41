//! Implementation of the `zbuild build` command.
//!
//! Runs the stages the output mapping needs, links the output tree, points
//! the out-link at it and records the store paths used.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use zbuild_lib::execute::{self, Stage, StageDag};
use zbuild_lib::platform::link::replace_link;
use zbuild_lib::records::{BuildRecord, RecordStore};
use zbuild_lib::store_lock::{LockMode, StoreLock};

use super::{RunReport, ensure_success, load_context, print_run, runtime};
use crate::output::{Mark, OutputFormat, format_duration, print_json, print_stat, status};

#[derive(Debug, Serialize)]
struct BuildReport {
  result: PathBuf,
  out_link: Option<PathBuf>,
  record: String,
  run: RunReport,
}

pub fn cmd_build(file: &Path, out_link: Option<&Path>, output: OutputFormat) -> Result<()> {
  let start = Instant::now();
  let ctx = load_context(file)?;

  let _lock = StoreLock::acquire(&ctx.store, LockMode::Shared, "build").context("Failed to acquire store lock")?;

  let dag = StageDag::from_project(&ctx.project)
    .context("Failed to build stage graph")?
    .restrict_to(&Stage::Link);
  let ctx = Arc::new(ctx);

  let rt = runtime()?;
  let result = rt.block_on(execute::run(ctx.clone(), &dag)).context("Build failed")?;

  if !output.is_json() {
    print_run(&result);
  }
  if !result.is_success() {
    if output.is_json() {
      print_json(&RunReport::from(&result))?;
    }
    return ensure_success(&result);
  }

  let linked = result
    .realized
    .get(&Stage::Link)
    .and_then(|out| out.path())
    .context("link stage produced no output tree")?
    .to_path_buf();

  let out_link = match out_link {
    Some(link) => {
      let link = std::path::absolute(link).with_context(|| format!("Invalid out-link: {}", link.display()))?;
      if let Some(parent) = link.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
      }
      replace_link(&linked, &link).with_context(|| format!("Failed to create out-link: {}", link.display()))?;
      info!(link = %link.display(), target = %linked.display(), "out-link updated");
      Some(link)
    }
    None => None,
  };

  let record = BuildRecord::new(
    &ctx.project.name,
    &ctx.project.config_path,
    out_link.as_deref(),
    linked.clone(),
    result.store_paths(),
  );
  RecordStore::default_store()
    .save(&record)
    .context("Failed to save build record")?;

  if output.is_json() {
    print_json(&BuildReport {
      result: linked,
      out_link,
      record: record.id,
      run: RunReport::from(&result),
    })?;
  } else {
    println!();
    status(Mark::Ok, "Build complete!");
    match &out_link {
      Some(link) => print_stat("Result", &format!("{} {} {}", link.display(), "→", linked.display())),
      None => print_stat("Result", &linked.display().to_string()),
    }
    print_stat("Stages", &result.total().to_string());
    print_stat("Duration", &format_duration(start.elapsed()));
  }

  Ok(())
}
