//! Store garbage collection.
//!
//! Build records are the roots: every store path referenced by a live record
//! survives, everything else (including incomplete entries and abandoned
//! staging directories) is removed.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::records::{RecordError, RecordStore};
use crate::store::{Store, StoreError, read_marker};

#[derive(Debug, Error)]
pub enum GcError {
  #[error("failed to read build records: {0}")]
  Records(#[from] RecordError),

  #[error("failed to read store: {0}")]
  Store(#[from] StoreError),
}

#[derive(Debug, Default, Serialize)]
pub struct GcStats {
  pub records_scanned: usize,
  pub records_pruned: usize,
  pub entries_scanned: usize,
  pub entries_deleted: usize,
  pub incomplete_deleted: usize,
  pub staging_deleted: usize,
  pub bytes_freed: u64,
}

impl GcStats {
  pub fn total_deleted(&self) -> usize {
    self.entries_deleted + self.staging_deleted
  }
}

#[derive(Debug, Serialize)]
pub struct GcResult {
  pub stats: GcStats,
  pub deleted_paths: Vec<PathBuf>,
}

fn dir_size(path: &Path) -> u64 {
  WalkDir::new(path)
    .into_iter()
    .filter_map(|e| e.ok())
    .filter(|e| e.file_type().is_file())
    .filter_map(|e| e.metadata().ok())
    .map(|m| m.len())
    .sum()
}

/// Store paths referenced by live records. Stale records are pruned unless `dry_run`.
fn collect_live_paths(records: &RecordStore, dry_run: bool, stats: &mut GcStats) -> Result<HashSet<PathBuf>, GcError> {
  let mut live = HashSet::new();

  for meta in records.list()? {
    stats.records_scanned += 1;
    let record = match records.load(&meta.id) {
      Ok(record) => record,
      Err(e) => {
        warn!(id = %meta.id, error = %e, "skipping unreadable build record");
        continue;
      }
    };

    if record.is_stale() {
      debug!(id = %record.id, "pruning stale build record");
      stats.records_pruned += 1;
      if !dry_run {
        records.delete(&record.id)?;
      }
      continue;
    }

    live.extend(record.store_paths);
    live.insert(record.result);
  }

  debug!(count = live.len(), "collected live store paths from records");
  Ok(live)
}

fn remove(path: &Path, dry_run: bool) -> Option<u64> {
  let size = dir_size(path);
  if dry_run {
    return Some(size);
  }
  match fs::remove_dir_all(path) {
    Ok(()) => Some(size),
    Err(e) => {
      warn!(path = %path.display(), error = %e, "failed to delete store path");
      None
    }
  }
}

/// Remove every store entry no live build record references.
///
/// The caller holds the exclusive store lock.
pub fn collect_garbage(store: &Store, records: &RecordStore, dry_run: bool) -> Result<GcResult, GcError> {
  let mut stats = GcStats::default();
  let mut deleted_paths = Vec::new();

  let live = collect_live_paths(records, dry_run, &mut stats)?;

  for (kind, path) in store.entries()? {
    stats.entries_scanned += 1;

    let complete = matches!(read_marker(&path), Ok(Some(_)));
    if complete && live.contains(&path) {
      continue;
    }

    if complete {
      debug!(kind = %kind, path = %path.display(), "removing unreferenced entry");
    } else {
      debug!(kind = %kind, path = %path.display(), "removing incomplete entry");
    }

    if let Some(size) = remove(&path, dry_run) {
      stats.entries_deleted += 1;
      if !complete {
        stats.incomplete_deleted += 1;
      }
      stats.bytes_freed += size;
      deleted_paths.push(path);
    }
  }

  let staging = store.staging_root();
  if let Ok(read) = fs::read_dir(&staging) {
    for entry in read.flatten() {
      let path = entry.path();
      debug!(path = %path.display(), "removing abandoned staging directory");
      if let Some(size) = remove(&path, dry_run) {
        stats.staging_deleted += 1;
        stats.bytes_freed += size;
        deleted_paths.push(path);
      }
    }
  }

  info!(
    entries_deleted = stats.entries_deleted,
    records_pruned = stats.records_pruned,
    bytes_freed = stats.bytes_freed,
    dry_run,
    "garbage collection complete"
  );

  Ok(GcResult { stats, deleted_paths })
}
