//! Symlink creation for the output linker and out-links.

use std::io;
use std::path::Path;

/// Create a link at `link` pointing to the directory or file at `target`.
///
/// On Windows directories get a junction, files a file symlink.
#[cfg(unix)]
pub fn link_path(target: &Path, link: &Path) -> io::Result<()> {
  std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
pub fn link_path(target: &Path, link: &Path) -> io::Result<()> {
  if target.is_dir() {
    junction::create(target, link)
  } else {
    std::os::windows::fs::symlink_file(target, link)
  }
}

/// Replace whatever sits at `link` with a fresh link to `target`.
///
/// Refuses to remove a real directory; only links and files are replaced.
pub fn replace_link(target: &Path, link: &Path) -> io::Result<()> {
  match std::fs::symlink_metadata(link) {
    Ok(meta) if meta.file_type().is_symlink() || meta.is_file() => {
      remove_link(link)?;
    }
    Ok(_) => {
      return Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("{} exists and is not a link", link.display()),
      ));
    }
    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
    Err(e) => return Err(e),
  }
  link_path(target, link)
}

#[cfg(unix)]
fn remove_link(link: &Path) -> io::Result<()> {
  std::fs::remove_file(link)
}

#[cfg(windows)]
fn remove_link(link: &Path) -> io::Result<()> {
  // Junctions and directory symlinks are removed as directories on Windows.
  std::fs::remove_file(link).or_else(|_| std::fs::remove_dir(link))
}
