//! Implementation of the `zbuild check` command.
//!
//! Runs every stage, hygiene checks included. A failing check fails the
//! command but outputs that do not depend on it are still built.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};

use zbuild_lib::execute::{self, StageDag};
use zbuild_lib::store_lock::{LockMode, StoreLock};

use super::{RunReport, ensure_success, load_context, print_run, runtime};
use crate::output::{Mark, OutputFormat, format_duration, print_json, print_stat, status};

pub fn cmd_check(file: &Path, output: OutputFormat) -> Result<()> {
  let start = Instant::now();
  let ctx = load_context(file)?;

  let _lock = StoreLock::acquire(&ctx.store, LockMode::Shared, "check").context("Failed to acquire store lock")?;

  let dag = StageDag::from_project(&ctx.project).context("Failed to build stage graph")?;
  let ctx = Arc::new(ctx);

  let rt = runtime()?;
  let result = rt.block_on(execute::run(ctx, &dag)).context("Check failed")?;

  if output.is_json() {
    print_json(&RunReport::from(&result))?;
  } else {
    print_run(&result);
  }
  ensure_success(&result)?;

  if !output.is_json() {
    println!();
    status(Mark::Ok, "All checks passed!");
    print_stat("Stages", &result.total().to_string());
    print_stat("Duration", &format_duration(start.elapsed()));
  }

  Ok(())
}
