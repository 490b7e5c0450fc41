//! Pinned toolchain resolution.
//!
//! The workspace declares its compiler in `rust-toolchain.toml` (or the
//! legacy one-line `rust-toolchain`). Only pinned channels are accepted:
//! an exact release (`1.85.0`) or a dated channel (`nightly-2025-01-15`).
//! Anything that can move under our feet (`stable`, `nightly`, `1.85`) is
//! rejected before a single command runs.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::util::hash::Hashable;

#[derive(Debug, Error)]
pub enum ToolchainError {
  #[error("failed to read toolchain file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse toolchain file {path}: {message}")]
  Parse { path: PathBuf, message: String },

  #[error("toolchain file {0} declares no channel")]
  MissingChannel(PathBuf),

  #[error("toolchain channel '{0}' is not pinned; use an exact version like 1.85.0 or a dated channel like nightly-2025-01-15")]
  Floating(String),

  #[error("toolchain channel '{0}' is malformed")]
  Malformed(String),

  #[error("could not read a version from toolchain probe output '{0}'")]
  UnrecognizedProbe(String),

  #[error("toolchain {channel} reported version {reported}")]
  VersionMismatch { channel: String, reported: String },
}

/// A validated, pinned channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Channel {
  /// `1.85.0`
  Exact(String),
  /// `nightly-2025-01-15`
  Dated { base: String, date: String },
}

impl Channel {
  pub fn parse(raw: &str) -> Result<Self, ToolchainError> {
    let raw = raw.trim();
    if matches!(raw, "stable" | "beta" | "nightly") {
      return Err(ToolchainError::Floating(raw.to_string()));
    }

    if let Some((base, date)) = raw.split_once('-') {
      if !matches!(base, "stable" | "beta" | "nightly") || !is_date(date) {
        return Err(ToolchainError::Malformed(raw.to_string()));
      }
      return Ok(Channel::Dated {
        base: base.to_string(),
        date: date.to_string(),
      });
    }

    let parts: Vec<&str> = raw.split('.').collect();
    if parts.iter().any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit())) {
      return Err(ToolchainError::Malformed(raw.to_string()));
    }
    match parts.len() {
      3 => Ok(Channel::Exact(raw.to_string())),
      1 | 2 => Err(ToolchainError::Floating(raw.to_string())),
      _ => Err(ToolchainError::Malformed(raw.to_string())),
    }
  }
}

impl fmt::Display for Channel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Channel::Exact(version) => f.write_str(version),
      Channel::Dated { base, date } => write!(f, "{}-{}", base, date),
    }
  }
}

fn is_date(s: &str) -> bool {
  let parts: Vec<&str> = s.split('-').collect();
  parts.len() == 3
    && [4usize, 2, 2].iter().zip(&parts).all(|(len, p)| p.len() == *len && p.bytes().all(|b| b.is_ascii_digit()))
}

/// What the toolchain file declares.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainSpec {
  pub channel: String,
  #[serde(default)]
  pub components: Vec<String>,
  #[serde(default)]
  pub targets: Vec<String>,
  #[serde(default)]
  pub profile: Option<String>,
}

#[derive(Deserialize)]
struct ToolchainFile {
  toolchain: ToolchainSection,
}

#[derive(Deserialize)]
struct ToolchainSection {
  channel: Option<String>,
  #[serde(default)]
  components: Vec<String>,
  #[serde(default)]
  targets: Vec<String>,
  profile: Option<String>,
}

impl ToolchainSpec {
  /// Load and validate a toolchain file.
  ///
  /// A `.toml` file, or any file starting with a table header, is parsed as
  /// TOML; anything else is the legacy single-line channel format.
  pub fn load(path: &Path) -> Result<Self, ToolchainError> {
    let content = std::fs::read_to_string(path).map_err(|source| ToolchainError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let spec = Self::parse(path, &content)?;
    Channel::parse(&spec.channel)?;
    Ok(spec)
  }

  pub fn parse(path: &Path, content: &str) -> Result<Self, ToolchainError> {
    let is_toml = path.extension().is_some_and(|e| e == "toml") || content.trim_start().starts_with('[');
    if is_toml {
      let file: ToolchainFile = toml::from_str(content).map_err(|e| ToolchainError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
      })?;
      let channel = file
        .toolchain
        .channel
        .ok_or_else(|| ToolchainError::MissingChannel(path.to_path_buf()))?;
      return Ok(ToolchainSpec {
        channel,
        components: file.toolchain.components,
        targets: file.toolchain.targets,
        profile: file.toolchain.profile,
      });
    }

    let mut lines = content.lines().map(str::trim).filter(|l| !l.is_empty());
    let channel = lines.next().ok_or_else(|| ToolchainError::MissingChannel(path.to_path_buf()))?;
    if lines.next().is_some() {
      return Err(ToolchainError::Parse {
        path: path.to_path_buf(),
        message: "legacy toolchain file must hold a single channel line".to_string(),
      });
    }
    Ok(ToolchainSpec {
      channel: channel.to_string(),
      ..Default::default()
    })
  }

  pub fn channel(&self) -> Result<Channel, ToolchainError> {
    Channel::parse(&self.channel)
  }
}

/// A toolchain whose version was confirmed by running it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toolchain {
  pub channel: String,
  /// As reported by the probe, e.g. `1.85.0` or `1.86.0-nightly`.
  pub version: String,
  pub components: Vec<String>,
  pub targets: Vec<String>,
  pub profile: Option<String>,
}

impl Hashable for Toolchain {}

/// Combine a spec with the probe's output (`rustc 1.85.0 (4d91de4e4 2025-02-17)`).
///
/// Exact channels must report exactly their own version.
pub fn resolve(spec: &ToolchainSpec, probe_output: &str) -> Result<Toolchain, ToolchainError> {
  let channel = spec.channel()?;
  let version = probe_output
    .lines()
    .next()
    .and_then(|line| line.split_whitespace().nth(1))
    .filter(|v| v.starts_with(|c: char| c.is_ascii_digit()))
    .ok_or_else(|| ToolchainError::UnrecognizedProbe(probe_output.trim().to_string()))?;

  if let Channel::Exact(expected) = &channel
    && version != expected
  {
    return Err(ToolchainError::VersionMismatch {
      channel: expected.clone(),
      reported: version.to_string(),
    });
  }

  debug!(channel = %channel, version, "toolchain resolved");

  Ok(Toolchain {
    channel: channel.to_string(),
    version: version.to_string(),
    components: spec.components.clone(),
    targets: spec.targets.clone(),
    profile: spec.profile.clone(),
  })
}
