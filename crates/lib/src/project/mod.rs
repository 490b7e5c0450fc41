//! Project configuration: `build.lua` evaluated into a typed [`Project`].
//!
//! The Lua file returns a plain table. It is deserialized into
//! [`ProjectDecl`], which mirrors the table shape with every field optional,
//! and then validated into a [`Project`] with absolute paths, normalized path
//! sets and a checked output mapping.

mod lua;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::classify::{Rules, Strategy};
use crate::consts::{DEFAULT_PARALLELISM, DEFAULT_TOOLCHAIN_FILE};
use crate::link::{LinkError, OutputMapping, OutputRef};
use crate::pathset::{PathSet, PathSetError};

pub use lua::{create_runtime, load_file};

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("lua error: {0}")]
  Lua(#[from] mlua::Error),

  #[error("failed to read config file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("config file {0} must return a table")]
  NotATable(PathBuf),

  #[error("invalid path in {field}: {source}")]
  Path {
    field: &'static str,
    #[source]
    source: PathSetError,
  },

  #[error("invalid output: {0}")]
  Output(#[from] LinkError),

  #[error("unknown check '{0}' (expected fmt, clippy, doc, test or selection)")]
  UnknownCheck(String),

  #[error("output '{key}' refers to undeclared target '{target}'")]
  UnknownTarget { key: String, target: String },

  #[error("output '{0}' refers to the book, but sources.docs is empty")]
  NoDocs(String),

  #[error("target name '{0}' must be a plain file name")]
  InvalidTarget(String),

  #[error("target '{0}' is declared twice")]
  DuplicateTarget(String),

  #[error("parallelism must be at least 1")]
  ZeroParallelism,
}

/// A hygiene check run against the dependency artifact set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
  Fmt,
  Clippy,
  Doc,
  Test,
  /// The classifier regression diff; needs no toolchain.
  Selection,
}

impl CheckKind {
  pub const ALL: [CheckKind; 5] = [
    CheckKind::Fmt,
    CheckKind::Clippy,
    CheckKind::Doc,
    CheckKind::Test,
    CheckKind::Selection,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      CheckKind::Fmt => "fmt",
      CheckKind::Clippy => "clippy",
      CheckKind::Doc => "doc",
      CheckKind::Test => "test",
      CheckKind::Selection => "selection",
    }
  }
}

impl fmt::Display for CheckKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for CheckKind {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    CheckKind::ALL
      .into_iter()
      .find(|c| c.as_str() == s)
      .ok_or_else(|| ConfigError::UnknownCheck(s.to_string()))
  }
}

/// Shell commands for each kind of stage.
///
/// Commands run with `$src` (a private copy of the source tree, also the
/// working directory), `$out` and `$CARGO_TARGET_DIR` set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Commands {
  pub probe: String,
  pub deps: String,
  /// Runs once per target with `$ZBUILD_TARGET` set; must leave `$out/bin/$ZBUILD_TARGET`.
  pub target: String,
  pub book: String,
  pub fmt: String,
  pub clippy: String,
  pub doc: String,
  pub test: String,
}

impl Default for Commands {
  fn default() -> Self {
    Self {
      probe: "rustc --version".to_string(),
      deps: "cargo build --release --locked --workspace".to_string(),
      target: concat!(
        "cargo build --release --locked --bin \"$ZBUILD_TARGET\" && ",
        "mkdir -p \"$out/bin\" && ",
        "cp \"$CARGO_TARGET_DIR/release/$ZBUILD_TARGET\" \"$out/bin/\""
      )
      .to_string(),
      book: "mdbook build \"$src/book\" --dest-dir \"$out\"".to_string(),
      fmt: "cargo fmt --all -- --check".to_string(),
      clippy: "cargo clippy --locked --workspace --all-targets -- --deny warnings".to_string(),
      doc: "cargo doc --locked --workspace --no-deps".to_string(),
      test: "cargo test --locked --workspace".to_string(),
    }
  }
}

impl Commands {
  pub fn check(&self, kind: CheckKind) -> Option<&str> {
    match kind {
      CheckKind::Fmt => Some(&self.fmt),
      CheckKind::Clippy => Some(&self.clippy),
      CheckKind::Doc => Some(&self.doc),
      CheckKind::Test => Some(&self.test),
      CheckKind::Selection => None,
    }
  }
}

/// Inputs the build needs beyond the source tree and toolchain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildInputs {
  /// Extra environment for every command, e.g. `LIBCLANG_PATH`.
  pub env: BTreeMap<String, String>,
  /// Install prefixes of native dependencies (`bin/`, `lib/pkgconfig`).
  pub native: Vec<PathBuf>,
}

// Declaration structs: the table shape `build.lua` returns.

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProjectDecl {
  pub name: Option<String>,
  pub root: Option<String>,
  pub toolchain: Option<String>,
  pub sources: SourcesDecl,
  pub targets: Vec<String>,
  pub build_inputs: BuildInputsDecl,
  pub tools: Vec<String>,
  pub commands: Commands,
  pub checks: Option<Vec<String>>,
  pub outputs: Option<BTreeMap<String, String>>,
  pub parallelism: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SourcesDecl {
  pub build: BuildSourcesDecl,
  pub docs: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BuildSourcesDecl {
  pub include: Vec<String>,
  pub prune: Vec<String>,
  pub strategy: Strategy,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BuildInputsDecl {
  pub env: BTreeMap<String, String>,
  pub native: Vec<String>,
}

/// A validated project.
#[derive(Debug, Clone, Serialize)]
pub struct Project {
  pub name: String,
  pub config_path: PathBuf,
  pub root: PathBuf,
  pub toolchain_file: PathBuf,
  pub rules: Rules,
  pub strategy: Strategy,
  pub docs: PathSet,
  pub targets: Vec<String>,
  pub build_inputs: BuildInputs,
  pub tools: Vec<PathBuf>,
  pub commands: Commands,
  pub checks: Vec<CheckKind>,
  pub outputs: OutputMapping<OutputRef>,
  pub parallelism: usize,
}

impl Project {
  /// Evaluate a `build.lua` and validate the table it returns.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    info!(path = %path.display(), "evaluating project config");
    let config_path = dunce::canonicalize(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let config_dir = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();

    let lua = create_runtime(&config_dir)?;
    let value = load_file(&lua, &config_path)?;
    if !value.is_table() {
      return Err(ConfigError::NotATable(config_path));
    }

    let decl: ProjectDecl = mlua::LuaSerdeExt::from_value(&lua, value)?;
    let project = decl.validate(&config_path)?;

    debug!(
      name = %project.name,
      root = %project.root.display(),
      targets = project.targets.len(),
      outputs = project.outputs.len(),
      "project loaded"
    );
    Ok(project)
  }

  /// Whether any stage needs the toolchain and dependency artifact set.
  pub fn needs_toolchain(&self) -> bool {
    !self.targets.is_empty() || self.checks.iter().any(|kind| *kind != CheckKind::Selection)
  }

  /// Whether documentation sources were declared; the book stage exists only then.
  pub fn has_docs(&self) -> bool {
    !self.docs.is_empty()
  }
}

fn path_set(field: &'static str, declared: &[String]) -> Result<PathSet, ConfigError> {
  PathSet::from_declared(declared).map_err(|source| ConfigError::Path { field, source })
}

impl ProjectDecl {
  pub fn validate(self, config_path: &Path) -> Result<Project, ConfigError> {
    let config_dir = config_path.parent().unwrap_or(Path::new("."));
    let root = config_dir.join(self.root.as_deref().unwrap_or("."));
    let root = dunce::canonicalize(&root).unwrap_or(root);

    let name = match self.name {
      Some(name) => name,
      None => config_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string()),
    };

    let rules = Rules {
      include: path_set("sources.build.include", &self.sources.build.include)?,
      prune: path_set("sources.build.prune", &self.sources.build.prune)?,
    };
    let docs = path_set("sources.docs", &self.sources.docs)?;

    let mut targets = Vec::with_capacity(self.targets.len());
    for target in self.targets {
      if target.is_empty() || target == "." || target == ".." || target.contains(['/', '\\']) {
        return Err(ConfigError::InvalidTarget(target));
      }
      if targets.contains(&target) {
        return Err(ConfigError::DuplicateTarget(target));
      }
      targets.push(target);
    }

    let checks = match self.checks {
      Some(declared) => {
        let mut checks = declared.iter().map(|c| c.parse()).collect::<Result<Vec<CheckKind>, _>>()?;
        checks.sort();
        checks.dedup();
        checks
      }
      None => CheckKind::ALL.to_vec(),
    };

    let declared_outputs = match self.outputs {
      Some(outputs) => outputs,
      None => default_outputs(&targets, !docs.is_empty()),
    };
    let mut outputs = OutputMapping::new();
    for (key, raw) in declared_outputs {
      let output: OutputRef = raw.parse()?;
      match &output {
        OutputRef::Target(target) if !targets.contains(target) => {
          return Err(ConfigError::UnknownTarget {
            key,
            target: target.clone(),
          });
        }
        OutputRef::Book | OutputRef::DocsSource if docs.is_empty() => {
          return Err(ConfigError::NoDocs(key));
        }
        _ => {}
      }
      outputs.insert(&key, output)?;
    }

    let parallelism = self.parallelism.unwrap_or(DEFAULT_PARALLELISM);
    if parallelism == 0 {
      return Err(ConfigError::ZeroParallelism);
    }

    Ok(Project {
      name,
      config_path: config_path.to_path_buf(),
      toolchain_file: root.join(self.toolchain.as_deref().unwrap_or(DEFAULT_TOOLCHAIN_FILE)),
      root,
      rules,
      strategy: self.sources.build.strategy,
      docs,
      targets,
      build_inputs: BuildInputs {
        env: self.build_inputs.env,
        native: self.build_inputs.native.iter().map(|p| config_dir.join(p)).collect(),
      },
      tools: self.tools.iter().map(|p| config_dir.join(p)).collect(),
      commands: self.commands,
      checks,
      outputs,
      parallelism,
    })
  }
}

/// `bin/<target>` per target, `book` when docs exist, and the selection diff.
fn default_outputs(targets: &[String], has_docs: bool) -> BTreeMap<String, String> {
  let mut outputs: BTreeMap<String, String> = targets
    .iter()
    .map(|t| (format!("bin/{}", t), format!("target:{}", t)))
    .collect();
  if has_docs {
    outputs.insert("book".to_string(), "book".to_string());
  }
  outputs.insert("source-diff".to_string(), "source-diff".to_string());
  outputs
}
