//! Implementation of the `zbuild plan` command.
//!
//! Realizes the evaluation stages (source selection, toolchain probe,
//! selection diff) and derives every other stage's key from them, so the
//! cache status of the whole graph is known without running a build command.

use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};

use zbuild_lib::execute::{PlanStatus, StageDag, plan};
use zbuild_lib::store_lock::{LockMode, StoreLock};

use super::{load_context, runtime};
use crate::output::{Mark, OutputFormat, print_json, print_stat, short_entry};

pub fn cmd_plan(file: &Path, output: OutputFormat) -> Result<()> {
  let ctx = load_context(file)?;
  let _lock = StoreLock::acquire(&ctx.store, LockMode::Shared, "plan").context("Failed to acquire store lock")?;

  let dag = StageDag::from_project(&ctx.project).context("Failed to build stage graph")?;
  let rt = runtime()?;
  let stages = rt.block_on(plan(&ctx, &dag)).context("Failed to plan stages")?;

  if output.is_json() {
    return print_json(&stages);
  }

  let mut current_wave = None;
  for planned in &stages {
    if current_wave != Some(planned.wave) {
      println!("Wave {}:", planned.wave);
      current_wave = Some(planned.wave);
    }

    let mark = match planned.status {
      PlanStatus::Evaluated => Mark::Note,
      PlanStatus::Cached => Mark::Cached,
      PlanStatus::Build => Mark::Build,
      PlanStatus::Blocked => Mark::Fail,
    };
    let entry = planned
      .path
      .as_ref()
      .and_then(|p| p.file_name())
      .map(|name| short_entry(&name.to_string_lossy()).to_string())
      .unwrap_or_default();

    println!(
      "  {} {} {} {}",
      mark,
      planned.stage,
      format!("{:?}", planned.status)
        .to_lowercase()
        .if_supports_color(Stream::Stdout, |s| s.dimmed()),
      entry.if_supports_color(Stream::Stdout, |s| s.dimmed())
    );
  }

  let count = |status: PlanStatus| stages.iter().filter(|s| s.status == status).count();
  println!();
  print_stat("Stages", &stages.len().to_string());
  print_stat("Cached", &count(PlanStatus::Cached).to_string());
  print_stat("To build", &count(PlanStatus::Build).to_string());
  if count(PlanStatus::Blocked) > 0 {
    print_stat("Blocked", &count(PlanStatus::Blocked).to_string());
  }

  Ok(())
}
