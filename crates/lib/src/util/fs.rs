//! Copy helpers shared by source selection and stage working directories.

use std::fs;
use std::io;
use std::path::Path;

use walkdir::WalkDir;

/// Copy one file, following symlinks, and normalize its mode.
///
/// The copy gets `0644`, or `0755` when the source had any execute bit, so
/// copies of the same content are byte- and mode-identical everywhere.
pub fn copy_file(src: &Path, dst: &Path) -> io::Result<()> {
  if let Some(parent) = dst.parent() {
    fs::create_dir_all(parent)?;
  }
  fs::copy(src, dst)?;
  normalize_mode(src, dst)
}

#[cfg(unix)]
fn normalize_mode(src: &Path, dst: &Path) -> io::Result<()> {
  use std::os::unix::fs::PermissionsExt;

  let executable = fs::metadata(src)?.permissions().mode() & 0o111 != 0;
  let mode = if executable { 0o755 } else { 0o644 };
  fs::set_permissions(dst, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn normalize_mode(_src: &Path, dst: &Path) -> io::Result<()> {
  let mut perms = fs::metadata(dst)?.permissions();
  perms.set_readonly(false);
  fs::set_permissions(dst, perms)
}

/// Recursively copy `src` into `dst`, dereferencing symlinks.
///
/// Top-level entries named in `skip` are left out.
pub fn copy_tree(src: &Path, dst: &Path, skip: &[&str]) -> io::Result<()> {
  fs::create_dir_all(dst)?;

  let walker = WalkDir::new(src)
    .follow_links(true)
    .sort_by_file_name()
    .into_iter()
    .filter_entry(|e| {
      e.depth() != 1
        || e
          .file_name()
          .to_str()
          .map(|name| !skip.contains(&name))
          .unwrap_or(true)
    });

  for entry in walker {
    let entry = entry.map_err(io::Error::other)?;
    let rel = entry.path().strip_prefix(src).map_err(io::Error::other)?;
    if rel.as_os_str().is_empty() {
      continue;
    }
    let target = dst.join(rel);
    if entry.file_type().is_dir() {
      fs::create_dir_all(&target)?;
    } else {
      copy_file(entry.path(), &target)?;
    }
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn copy_tree_skips_top_level_names_only() {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("src");
    fs::create_dir_all(src.join("nested/tmp")).unwrap();
    fs::create_dir_all(src.join("tmp")).unwrap();
    fs::write(src.join("tmp/scratch"), "x").unwrap();
    fs::write(src.join("nested/tmp/keep.rs"), "y").unwrap();
    fs::write(src.join(".zbuild-complete"), "{}").unwrap();

    let dst = temp.path().join("dst");
    copy_tree(&src, &dst, &["tmp", ".zbuild-complete"]).unwrap();

    assert!(!dst.join("tmp").exists());
    assert!(!dst.join(".zbuild-complete").exists());
    assert_eq!(fs::read_to_string(dst.join("nested/tmp/keep.rs")).unwrap(), "y");
  }

  #[cfg(unix)]
  #[test]
  fn copy_file_normalizes_mode() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    let src = temp.path().join("tool.sh");
    fs::write(&src, "#!/bin/sh\n").unwrap();
    fs::set_permissions(&src, fs::Permissions::from_mode(0o700)).unwrap();

    let dst = temp.path().join("out/tool.sh");
    copy_file(&src, &dst).unwrap();

    let mode = fs::metadata(&dst).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o755);
  }

  #[cfg(unix)]
  #[test]
  fn copy_file_dereferences_symlinks() {
    let temp = TempDir::new().unwrap();
    let real = temp.path().join("real.txt");
    fs::write(&real, "content").unwrap();
    let link = temp.path().join("link.txt");
    std::os::unix::fs::symlink(&real, &link).unwrap();

    let dst = temp.path().join("copy.txt");
    copy_file(&link, &dst).unwrap();

    assert!(!fs::symlink_metadata(&dst).unwrap().file_type().is_symlink());
    assert_eq!(fs::read_to_string(&dst).unwrap(), "content");
  }
}
