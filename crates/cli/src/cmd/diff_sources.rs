//! Implementation of the `zbuild diff-sources` command.
//!
//! Runs the classifier regression check alone: both strategies over the
//! live tree, the diff written to the store and printed.

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Serialize;

use zbuild_lib::regression::{DIFF_FILE, SelectionDiff, compare, write_diff};
use zbuild_lib::store::Store;
use zbuild_lib::store_lock::{LockMode, StoreLock};

use super::load_project;
use crate::output::{Mark, OutputFormat, print_json, print_stat, status};

#[derive(Debug, Serialize)]
struct DiffReport<'a> {
  path: std::path::PathBuf,
  diff: &'a SelectionDiff,
}

pub fn cmd_diff_sources(file: &Path, output: OutputFormat) -> Result<()> {
  let project = load_project(file)?;
  let store = Store::default_store();
  let _lock = StoreLock::acquire(&store, LockMode::Shared, "diff-sources").context("Failed to acquire store lock")?;

  let diff = compare(&project.root, &project.rules).context("Failed to classify sources")?;
  let entry = write_diff(&store, &diff).context("Failed to write selection diff")?;
  let path = entry.path.join(DIFF_FILE);

  if output.is_json() {
    print_json(&DiffReport { path, diff: &diff })?;
  } else {
    print!("{}", diff.render());
    print_stat("Diff", &path.display().to_string());
  }

  if !diff.is_empty() {
    bail!("classifier strategies diverge on {} file(s)", diff.len());
  }
  if !output.is_json() {
    status(Mark::Ok, "Classifier strategies agree");
  }
  Ok(())
}
