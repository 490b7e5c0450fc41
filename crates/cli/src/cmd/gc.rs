use std::time::Instant;

use anyhow::{Context, Result};

use zbuild_lib::gc::collect_garbage;
use zbuild_lib::records::RecordStore;
use zbuild_lib::store::Store;
use zbuild_lib::store_lock::{LockMode, StoreLock};

use crate::output::{Mark, OutputFormat, format_bytes, format_duration, print_json, print_stat, status};

pub fn cmd_gc(dry_run: bool, output: OutputFormat) -> Result<()> {
  let start = Instant::now();
  let store = Store::default_store();

  let _lock = StoreLock::acquire(&store, LockMode::Exclusive, "gc").context("Failed to acquire store lock")?;

  let result = collect_garbage(&store, &RecordStore::default_store(), dry_run)?;

  if output.is_json() {
    print_json(&result)?;
  } else {
    println!();
    if dry_run {
      status(Mark::Note, "Dry run - no changes made");
    } else {
      status(Mark::Ok, "Garbage collection complete!");
    }
    print_stat("Entries removed", &result.stats.entries_deleted.to_string());
    print_stat("Incomplete", &result.stats.incomplete_deleted.to_string());
    print_stat("Staging removed", &result.stats.staging_deleted.to_string());
    print_stat("Records pruned", &result.stats.records_pruned.to_string());
    print_stat("Space freed", &format_bytes(result.stats.bytes_freed));
    print_stat("Duration", &format_duration(start.elapsed()));
  }

  Ok(())
}
