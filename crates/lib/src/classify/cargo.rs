//! The default fallback predicate: what Cargo needs to build a workspace.

use std::ffi::OsStr;
use std::path::Path;

/// Version-control metadata directories, dropped at any depth.
const VCS_DIRS: &[&str] = &[".git", ".hg", ".svn", ".jj"];

/// Root-level build products that never belong in a source tree.
const ROOT_PRODUCTS: &[&str] = &["target", "result"];

/// True for files Cargo reads when building: Rust sources, TOML manifests
/// and configuration, `Cargo.lock`, and a legacy `.cargo/config`.
pub fn is_cargo_source(rel: &Path) -> bool {
  let Some(name) = rel.file_name().and_then(OsStr::to_str) else {
    return false;
  };

  if name == "Cargo.lock" {
    return true;
  }

  if name == "config" {
    return rel
      .parent()
      .and_then(Path::file_name)
      .map(|parent| parent == ".cargo")
      .unwrap_or(false);
  }

  matches!(rel.extension().and_then(OsStr::to_str), Some("rs") | Some("toml"))
}

/// True for entries the clean-source pass drops before any classifier sees
/// them: VCS metadata at any depth, editor backups, and `target`/`result*`
/// at the workspace root.
pub fn is_noise(rel: &Path, is_dir: bool) -> bool {
  let Some(name) = rel.file_name().and_then(OsStr::to_str) else {
    return false;
  };

  if is_dir && VCS_DIRS.contains(&name) {
    return true;
  }

  if name.ends_with('~') || name.starts_with(".#") || name.ends_with(".swp") {
    return true;
  }

  let at_root = rel.components().count() == 1;
  at_root && (ROOT_PRODUCTS.contains(&name) || name.starts_with("result-"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rust_and_manifest_files_are_sources() {
    for path in [
      "zebrad/src/main.rs",
      "Cargo.toml",
      "Cargo.lock",
      "rust-toolchain.toml",
      ".cargo/config.toml",
      ".cargo/config",
    ] {
      assert!(is_cargo_source(Path::new(path)), "{path} should be a cargo source");
    }
  }

  #[test]
  fn other_files_are_not_sources() {
    for path in ["README.md", "docker/Dockerfile", "crosslink-test-data/seed.bin", "config", "src/config"] {
      assert!(!is_cargo_source(Path::new(path)), "{path} should not be a cargo source");
    }
  }

  #[test]
  fn noise_is_detected() {
    assert!(is_noise(Path::new(".git"), true));
    assert!(is_noise(Path::new("zebrad/.git"), true));
    assert!(is_noise(Path::new(".jj"), true));
    assert!(is_noise(Path::new("target"), true));
    assert!(is_noise(Path::new("result"), false));
    assert!(is_noise(Path::new("result-doc"), false));
    assert!(is_noise(Path::new("zebrad/src/lib.rs~"), false));
    assert!(is_noise(Path::new("zebrad/src/.lib.rs.swp"), false));
  }

  #[test]
  fn nested_target_and_plain_files_are_kept() {
    assert!(!is_noise(Path::new("zebrad/target"), true));
    assert!(!is_noise(Path::new(".git"), false));
    assert!(!is_noise(Path::new(".direnv"), true));
    assert!(!is_noise(Path::new("zebrad/src/lib.rs"), false));
  }
}
