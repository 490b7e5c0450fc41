//! Shared test helpers for CLI integration tests.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// A project wired to shell stand-ins for the real tools.
pub const PROJECT: &str = r#"
return {
  name = "zebra",
  targets = { "zebrad" },
  sources = {
    build = { include = { "crosslink-test-data" }, prune = { "docker" } },
    docs = { "book" },
  },
  build_inputs = { env = { LIBCLANG_PATH = zb.dir .. "/clang" } },
  commands = {
    probe = "echo 'rustc 1.85.0 (4d91de4e4 2025-02-17)'",
    deps = [[mkdir -p "$CARGO_TARGET_DIR/release" && echo dep > "$CARGO_TARGET_DIR/release/libdep.rlib"]],
    target = [[test -f "$CARGO_TARGET_DIR/release/libdep.rlib" && mkdir -p "$out/bin" && printf elf > "$out/bin/$ZBUILD_TARGET"]],
    book = [[test -f "$src/book/book.toml" && printf '<html>' > "$out/index.html"]],
    fmt = "exit 0",
    clippy = CLIPPY or "echo clean",
    doc = "exit 0",
    test = "exit 0",
  },
}
"#;

/// Isolated test environment.
///
/// Each test gets its own workspace, store and data directory.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  /// A Crosslink-shaped workspace with [`PROJECT`] as its `build.lua`.
  pub fn crosslink() -> Self {
    Self::with_project(PROJECT)
  }

  /// The same workspace with `CLIPPY` bound to `clippy` before the project table.
  pub fn with_clippy(clippy: &str) -> Self {
    Self::with_project(&format!("local CLIPPY = [[{}]]\n{}", clippy, PROJECT))
  }

  fn with_project(project: &str) -> Self {
    let env = Self { temp: TempDir::new().unwrap() };
    for (path, content) in [
      ("Cargo.toml", "[workspace]\nmembers = [\"zebra-crosslink\"]\n"),
      ("Cargo.lock", "version = 4\n"),
      ("README.md", "# zebra\n"),
      ("rust-toolchain.toml", "[toolchain]\nchannel = \"1.85.0\"\n"),
      ("zebra-crosslink/Cargo.toml", "[package]\nname = \"zebra-crosslink\"\n"),
      ("zebra-crosslink/src/lib.rs", "pub fn crosslink() {}\n"),
      ("docker/Dockerfile", "FROM scratch\n"),
      ("crosslink-test-data/seed.bin", "seed"),
      ("book/book.toml", "[book]\n"),
      ("book/src/SUMMARY.md", "# Summary\n"),
    ] {
      env.write_file(path, content);
    }
    env.write_file("build.lua", project);
    env
  }

  pub fn root(&self) -> PathBuf {
    dunce::canonicalize(self.temp.path().join("ws")).unwrap()
  }

  /// Write a file relative to the workspace root.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join("ws").join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  pub fn store_path(&self) -> PathBuf {
    self.temp.path().join("store")
  }

  pub fn data_path(&self) -> PathBuf {
    self.temp.path().join("data")
  }

  /// Store entries of one kind, e.g. `target`.
  pub fn entries(&self, kind: &str) -> Vec<PathBuf> {
    let dir = self.store_path().join(kind);
    let Ok(read) = std::fs::read_dir(&dir) else {
      return Vec::new();
    };
    let mut entries: Vec<PathBuf> = read.flatten().map(|e| e.path()).collect();
    entries.sort();
    entries
  }

  /// A Command for the zbuild binary, run from the workspace root.
  ///
  /// `ZBUILD_STORE` and `ZBUILD_DATA` point into the temp directory.
  pub fn zbuild_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("zbuild");
    cmd.env("ZBUILD_STORE", self.store_path());
    cmd.env("ZBUILD_DATA", self.data_path());
    cmd.env_remove("RUST_LOG");
    cmd.current_dir(self.temp.path().join("ws"));
    cmd
  }
}

/// Read the JSON a command printed on stdout.
pub fn json_stdout(cmd: &mut Command) -> serde_json::Value {
  let output = cmd.output().unwrap();
  assert!(
    output.status.success(),
    "command failed: {}",
    String::from_utf8_lossy(&output.stderr)
  );
  serde_json::from_slice(&output.stdout).unwrap()
}

pub fn is_link_to(link: &Path, target: &Path) -> bool {
  std::fs::read_link(link).map(|t| t == target).unwrap_or(false)
}
