use std::path::PathBuf;

use crate::consts::{APP_NAME, DATA_ENV, STORE_ENV};

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> PathBuf {
  let userprofile = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
  PathBuf::from(userprofile)
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> PathBuf {
  let home = std::env::var("HOME").unwrap_or_else(|_| "/".to_string());
  PathBuf::from(home)
}

/// Returns the directory for data files (build records)
#[cfg(windows)]
pub fn data_dir() -> PathBuf {
  if let Ok(dir) = std::env::var(DATA_ENV) {
    return PathBuf::from(dir);
  }
  let appdata = std::env::var("APPDATA").map(PathBuf::from).unwrap_or_else(|_| home_dir());
  appdata.join(APP_NAME)
}

/// Returns the directory for data files (build records)
#[cfg(not(windows))]
pub fn data_dir() -> PathBuf {
  if let Ok(dir) = std::env::var(DATA_ENV) {
    return PathBuf::from(dir);
  }
  let data_home = std::env::var("XDG_DATA_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".local").join("share"));
  data_home.join(APP_NAME)
}

/// Returns the directory for cache files
#[cfg(windows)]
pub fn cache_dir() -> PathBuf {
  let local_appdata = std::env::var("LOCALAPPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir());
  local_appdata.join(APP_NAME).join("Cache")
}

/// Returns the directory for cache files
#[cfg(not(windows))]
pub fn cache_dir() -> PathBuf {
  let cache_home = std::env::var("XDG_CACHE_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".cache"));
  cache_home.join(APP_NAME)
}

/// Returns the root of the content-addressed store.
///
/// `ZBUILD_STORE` wins; otherwise the store lives under the cache directory.
pub fn store_dir() -> PathBuf {
  match std::env::var(STORE_ENV) {
    Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
    _ => cache_dir().join("store"),
  }
}

/// Directory holding build records (garbage collection roots).
pub fn records_dir() -> PathBuf {
  data_dir().join("records")
}
