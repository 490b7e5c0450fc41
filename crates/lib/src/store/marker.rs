use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{HASH_EXCLUSIONS, StoreError};
use crate::util::hash::{ContentHash, hash_directory};

/// Marker file name indicating an entry completed successfully.
pub const COMPLETE_MARKER: &str = ".zbuild-complete";

const MARKER_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMarker {
  pub version: u32,
  /// Always "complete" for markers that were written.
  pub status: String,
  /// Full SHA-256 of the entry contents, excluding the marker and `tmp/`.
  pub output_hash: String,
}

impl EntryMarker {
  /// Check the entry still hashes to the recorded value.
  pub fn verify(&self, entry: &Path) -> bool {
    match hash_directory(entry, HASH_EXCLUSIONS) {
      Ok(current) if current.0 == self.output_hash => true,
      Ok(current) => {
        warn!(
          path = %entry.display(),
          expected = %self.output_hash,
          actual = %current.0,
          "store entry corrupted, will rebuild"
        );
        false
      }
      Err(e) => {
        warn!(path = %entry.display(), error = %e, "failed to hash store entry, will rebuild");
        false
      }
    }
  }
}

pub(super) fn write_marker(entry: &Path, content: &ContentHash) -> Result<(), StoreError> {
  let marker = EntryMarker {
    version: MARKER_VERSION,
    status: "complete".to_string(),
    output_hash: content.0.clone(),
  };
  let json = serde_json::to_string(&marker)?;
  let path = entry.join(COMPLETE_MARKER);
  std::fs::write(&path, format!("{}\n", json)).map_err(|e| StoreError::io(&path, e))
}

/// Read an entry's completion marker; `None` when the entry never completed.
pub fn read_marker(entry: &Path) -> Result<Option<EntryMarker>, StoreError> {
  let path = entry.join(COMPLETE_MARKER);
  if !path.exists() {
    return Ok(None);
  }
  let content = std::fs::read_to_string(&path).map_err(|e| StoreError::io(&path, e))?;
  let marker: EntryMarker = serde_json::from_str(&content)?;
  Ok(Some(marker))
}
