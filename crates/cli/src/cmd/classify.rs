//! Implementation of the `zbuild classify` command.
//!
//! Prints the region of each path under both classifier strategies and
//! whether each would select it as a build source.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use serde::Serialize;

use zbuild_lib::classify::{Classifier, Region, Strategy, is_noise};
use zbuild_lib::pathset::{display_rel, normalize};

use super::load_project;
use crate::output::{Mark, OutputFormat, print_json};

#[derive(Debug, Serialize)]
struct Verdict {
  region: Region,
  selected: bool,
}

#[derive(Debug, Serialize)]
struct PathReport {
  path: String,
  legacy: Verdict,
  fileset: Verdict,
}

impl PathReport {
  fn agrees(&self) -> bool {
    self.legacy.selected == self.fileset.selected
  }
}

/// A tree walk never reaches a path under a noise directory.
fn is_filtered(rel: &Path) -> bool {
  rel.ancestors().any(|a| is_noise(a, a != rel))
}

fn verdict(classifier: &dyn Classifier, rel: &Path) -> Verdict {
  Verdict {
    region: classifier.classify(rel),
    selected: !is_filtered(rel) && classifier.selects_file(rel),
  }
}

/// Root-relative form of `path`; absolute paths must lie under `root`.
fn relative_to(root: &Path, path: &Path) -> Result<PathBuf> {
  if path.is_absolute() {
    let path = dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    return match path.strip_prefix(root) {
      Ok(rel) => Ok(rel.to_path_buf()),
      Err(_) => bail!("{} is outside the workspace root {}", path.display(), root.display()),
    };
  }
  Ok(normalize(&path.to_string_lossy())?)
}

pub fn cmd_classify(file: &Path, paths: &[PathBuf], output: OutputFormat) -> Result<()> {
  let project = load_project(file)?;
  let legacy = Strategy::Legacy.classifier(&project.rules);
  let fileset = Strategy::Fileset.classifier(&project.rules);

  let mut reports = Vec::with_capacity(paths.len());
  for path in paths {
    let rel = relative_to(&project.root, path)?;
    reports.push(PathReport {
      path: display_rel(&rel),
      legacy: verdict(legacy.as_ref(), &rel),
      fileset: verdict(fileset.as_ref(), &rel),
    });
  }

  if output.is_json() {
    return print_json(&reports);
  }

  for report in &reports {
    let marker = if report.agrees() { Mark::Ok } else { Mark::Warn };
    println!(
      "{} {}  legacy={}{}  fileset={}{}",
      marker,
      report.path,
      report.legacy.region,
      if report.legacy.selected { "*" } else { "" },
      report.fileset.region,
      if report.fileset.selected { "*" } else { "" },
    );
  }

  Ok(())
}
