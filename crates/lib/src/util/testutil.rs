//! Test helpers: fixture workspaces and portable shell snippets.

use std::path::Path;

/// Write `(relative path, content)` pairs under `root`, creating directories.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
  for (rel, content) in files {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
  }
}

/// A miniature node workspace with one file of every interesting kind:
/// default-selected Rust sources, a pruned docker directory, included test
/// data with a non-source extension, docs, and VCS noise.
pub fn crosslink_workspace(root: &Path) {
  write_tree(
    root,
    &[
      ("Cargo.toml", "[workspace]\nmembers = [\"zebra-crosslink\"]\n"),
      ("Cargo.lock", "version = 3\n"),
      ("README.md", "# zebra-crosslink\n"),
      ("zebra-crosslink/Cargo.toml", "[package]\nname = \"zebra-crosslink\"\n"),
      ("zebra-crosslink/foo.rs", "pub fn foo() {}\n"),
      ("docker/Dockerfile", "FROM rust\n"),
      ("crosslink-test-data/seed.bin", "\u{1}\u{2}\u{3}"),
      ("book/book.toml", "[book]\ntitle = \"Crosslink\"\n"),
      ("book/src/SUMMARY.md", "# Summary\n"),
      (".git/HEAD", "ref: refs/heads/main\n"),
    ],
  );
}

/// Shell snippet that fails with exit code 1.
#[cfg(unix)]
pub fn fail_cmd() -> &'static str {
  "exit 1"
}

#[cfg(windows)]
pub fn fail_cmd() -> &'static str {
  "exit 1"
}

/// Shell snippet writing `content` to `$out/<file>`.
#[cfg(unix)]
pub fn write_out_cmd(file: &str, content: &str) -> String {
  format!("mkdir -p \"$(dirname \"$out/{file}\")\" && printf '%s' '{content}' > \"$out/{file}\"")
}

#[cfg(windows)]
pub fn write_out_cmd(file: &str, content: &str) -> String {
  format!("New-Item -ItemType File -Force -Path \"$env:out/{file}\" -Value '{content}' | Out-Null")
}
