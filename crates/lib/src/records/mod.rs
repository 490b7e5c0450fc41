//! Build records: the garbage collection roots.
//!
//! Every successful `build` records the store paths it used. A record is
//! identified by its root (the out-link, or the config file for `--no-link`
//! builds), so rebuilding in the same place replaces the previous record and
//! lets its entries become garbage.
//!
//! # Storage Layout
//!
//! ```text
//! {data_dir}/records/
//! ├── index.json          # RecordIndex: list of record metadata
//! └── <id>.json           # Individual BuildRecord files
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::platform::paths::records_dir;
use crate::util::hash::hash_bytes;

const INDEX_FILENAME: &str = "index.json";

pub const RECORD_INDEX_VERSION: u32 = 1;

const RECORD_ID_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum RecordError {
  #[error("failed to create records directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("failed to read record: {0}")]
  Read(#[source] io::Error),

  #[error("failed to write record: {0}")]
  Write(#[source] io::Error),

  #[error("failed to parse record: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("failed to serialize record: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("record not found: {0}")]
  NotFound(String),

  #[error("unsupported record index version {0}")]
  UnsupportedVersion(u32),
}

/// The store paths one build used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
  pub id: String,
  pub created_at: u64,
  pub project: String,
  pub config: PathBuf,
  /// The out-link pointing at `result`, when the build made one.
  pub out_link: Option<PathBuf>,
  /// The linked output tree.
  pub result: PathBuf,
  pub store_paths: Vec<PathBuf>,
}

impl BuildRecord {
  pub fn new(project: &str, config: &Path, out_link: Option<&Path>, result: PathBuf, store_paths: Vec<PathBuf>) -> Self {
    let root = out_link.unwrap_or(config);
    Self {
      id: record_id(root),
      created_at: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs(),
      project: project.to_string(),
      config: config.to_path_buf(),
      out_link: out_link.map(Path::to_path_buf),
      result,
      store_paths,
    }
  }

  /// A record is stale once its out-link was removed or repointed.
  pub fn is_stale(&self) -> bool {
    match &self.out_link {
      Some(link) => match fs::read_link(link) {
        Ok(target) => target != self.result,
        Err(_) => true,
      },
      None => false,
    }
  }

  pub fn to_metadata(&self) -> RecordMetadata {
    RecordMetadata {
      id: self.id.clone(),
      created_at: self.created_at,
      project: self.project.clone(),
      paths: self.store_paths.len(),
    }
  }
}

/// The id of the record rooted at `root`.
pub fn record_id(root: &Path) -> String {
  hash_bytes(root.to_string_lossy().as_bytes()).0[..RECORD_ID_LEN].to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
  pub id: String,
  pub created_at: u64,
  pub project: String,
  pub paths: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordIndex {
  pub version: u32,
  pub records: Vec<RecordMetadata>,
}

impl Default for RecordIndex {
  fn default() -> Self {
    Self {
      version: RECORD_INDEX_VERSION,
      records: Vec::new(),
    }
  }
}

impl RecordIndex {
  /// Insert or replace the entry with the same id.
  fn upsert(&mut self, meta: RecordMetadata) {
    self.records.retain(|r| r.id != meta.id);
    self.records.push(meta);
  }

  fn remove(&mut self, id: &str) {
    self.records.retain(|r| r.id != id);
  }
}

/// Manages build records on disk.
///
/// Uses atomic write operations to prevent corruption.
#[derive(Debug, Clone)]
pub struct RecordStore {
  base_path: PathBuf,
}

impl RecordStore {
  pub fn new(base_path: PathBuf) -> Self {
    Self { base_path }
  }

  /// Records under the platform data directory (or `ZBUILD_DATA`).
  pub fn default_store() -> Self {
    Self::new(records_dir())
  }

  pub fn base_path(&self) -> &Path {
    &self.base_path
  }

  fn index_path(&self) -> PathBuf {
    self.base_path.join(INDEX_FILENAME)
  }

  fn record_path(&self, id: &str) -> PathBuf {
    self.base_path.join(format!("{}.json", id))
  }

  fn ensure_dir(&self) -> Result<(), RecordError> {
    fs::create_dir_all(&self.base_path).map_err(RecordError::CreateDir)
  }

  /// Load the index; empty when it does not exist yet.
  pub fn load_index(&self) -> Result<RecordIndex, RecordError> {
    let content = match fs::read_to_string(self.index_path()) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(RecordIndex::default()),
      Err(e) => return Err(RecordError::Read(e)),
    };

    let index: RecordIndex = serde_json::from_str(&content).map_err(RecordError::Parse)?;
    if index.version != RECORD_INDEX_VERSION {
      return Err(RecordError::UnsupportedVersion(index.version));
    }
    Ok(index)
  }

  fn write_atomic(&self, path: &Path, content: &str) -> Result<(), RecordError> {
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, content).map_err(RecordError::Write)?;
    fs::rename(&temp_path, path).map_err(RecordError::Write)
  }

  fn save_index(&self, index: &RecordIndex) -> Result<(), RecordError> {
    self.ensure_dir()?;
    let content = serde_json::to_string_pretty(index).map_err(RecordError::Serialize)?;
    self.write_atomic(&self.index_path(), &content)
  }

  /// Save a record, replacing any record with the same root.
  pub fn save(&self, record: &BuildRecord) -> Result<(), RecordError> {
    self.ensure_dir()?;
    let content = serde_json::to_string_pretty(record).map_err(RecordError::Serialize)?;
    self.write_atomic(&self.record_path(&record.id), &content)?;

    let mut index = self.load_index()?;
    index.upsert(record.to_metadata());
    self.save_index(&index)?;

    debug!(id = %record.id, paths = record.store_paths.len(), "build record saved");
    Ok(())
  }

  pub fn load(&self, id: &str) -> Result<BuildRecord, RecordError> {
    let content = fs::read_to_string(self.record_path(id)).map_err(|e| {
      if e.kind() == io::ErrorKind::NotFound {
        RecordError::NotFound(id.to_string())
      } else {
        RecordError::Read(e)
      }
    })?;
    serde_json::from_str(&content).map_err(RecordError::Parse)
  }

  /// Record metadata, oldest first.
  pub fn list(&self) -> Result<Vec<RecordMetadata>, RecordError> {
    let mut records = self.load_index()?.records;
    records.sort_by_key(|r| r.created_at);
    Ok(records)
  }

  pub fn delete(&self, id: &str) -> Result<(), RecordError> {
    match fs::remove_file(self.record_path(id)) {
      Ok(()) => {}
      Err(e) if e.kind() == io::ErrorKind::NotFound => {}
      Err(e) => return Err(RecordError::Write(e)),
    }

    let mut index = self.load_index()?;
    index.remove(id);
    self.save_index(&index)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn temp_store() -> (TempDir, RecordStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = RecordStore::new(temp_dir.path().join("records"));
    (temp_dir, store)
  }

  fn record(root: &str, paths: &[&str]) -> BuildRecord {
    BuildRecord::new(
      "zebra",
      Path::new("/ws/build.lua"),
      Some(Path::new(root)),
      PathBuf::from("/store/result/abc-zebra"),
      paths.iter().map(PathBuf::from).collect(),
    )
  }

  #[test]
  fn load_index_empty_when_not_exists() {
    let (_temp, store) = temp_store();
    assert!(store.load_index().unwrap().records.is_empty());
  }

  #[test]
  fn save_then_load() {
    let (_temp, store) = temp_store();
    let rec = record("/ws/result", &["/store/deps/a-deps"]);

    store.save(&rec).unwrap();

    assert_eq!(store.load(&rec.id).unwrap(), rec);
    assert_eq!(store.list().unwrap().len(), 1);
  }

  #[test]
  fn same_root_replaces_record() {
    let (_temp, store) = temp_store();
    store.save(&record("/ws/result", &["/store/deps/a-deps"])).unwrap();
    store.save(&record("/ws/result", &["/store/deps/b-deps"])).unwrap();
    store.save(&record("/other/result", &["/store/deps/c-deps"])).unwrap();

    let list = store.list().unwrap();
    assert_eq!(list.len(), 2);
    let replaced = store.load(&record_id(Path::new("/ws/result"))).unwrap();
    assert_eq!(replaced.store_paths, vec![PathBuf::from("/store/deps/b-deps")]);
  }

  #[test]
  fn load_missing_record() {
    let (_temp, store) = temp_store();
    assert!(matches!(store.load("nope"), Err(RecordError::NotFound(_))));
  }

  #[test]
  fn delete_removes_record_and_index_entry() {
    let (_temp, store) = temp_store();
    let rec = record("/ws/result", &[]);
    store.save(&rec).unwrap();

    store.delete(&rec.id).unwrap();

    assert!(store.list().unwrap().is_empty());
    assert!(matches!(store.load(&rec.id), Err(RecordError::NotFound(_))));
  }

  #[cfg(unix)]
  #[test]
  fn record_goes_stale_when_out_link_moves() {
    let temp = TempDir::new().unwrap();
    let result = temp.path().join("store/result/abc-zebra");
    std::fs::create_dir_all(&result).unwrap();
    let link = temp.path().join("result");
    std::os::unix::fs::symlink(&result, &link).unwrap();

    let rec = BuildRecord::new("zebra", Path::new("/ws/build.lua"), Some(&link), result, Vec::new());
    assert!(!rec.is_stale());

    std::fs::remove_file(&link).unwrap();
    assert!(rec.is_stale());
  }

  #[test]
  fn unlinked_record_never_goes_stale() {
    let rec = BuildRecord::new("zebra", Path::new("/ws/build.lua"), None, PathBuf::from("/x"), Vec::new());
    assert!(!rec.is_stale());
    assert_eq!(rec.id, record_id(Path::new("/ws/build.lua")));
  }
}
