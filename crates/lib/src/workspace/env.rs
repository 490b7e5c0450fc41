//! The environment build commands see.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::platform::paths::home_dir;
use crate::project::Project;

/// The few host settings that leak into the isolated environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEnv {
  pub path: Vec<PathBuf>,
  pub home: PathBuf,
  pub cargo_home: PathBuf,
  pub rustup_home: PathBuf,
}

impl HostEnv {
  /// Read the host's `PATH`, home and rustup/cargo homes.
  pub fn capture() -> Self {
    let home = home_dir();
    let path = std::env::var_os("PATH")
      .map(|p| std::env::split_paths(&p).collect())
      .unwrap_or_default();
    let cargo_home = std::env::var_os("CARGO_HOME")
      .map(PathBuf::from)
      .unwrap_or_else(|| home.join(".cargo"));
    let rustup_home = std::env::var_os("RUSTUP_HOME")
      .map(PathBuf::from)
      .unwrap_or_else(|| home.join(".rustup"));
    Self {
      path,
      home,
      cargo_home,
      rustup_home,
    }
  }
}

fn join(entries: impl IntoIterator<Item = PathBuf>, var: &str) -> Option<String> {
  let entries: Vec<PathBuf> = entries.into_iter().collect();
  if entries.is_empty() {
    return None;
  }
  match std::env::join_paths(&entries) {
    Ok(joined) => Some(joined.to_string_lossy().into_owned()),
    Err(e) => {
      warn!(var, error = %e, "dropping unjoinable search path entries");
      let valid = entries.into_iter().filter(|p| std::env::join_paths([p]).is_ok());
      std::env::join_paths(valid).ok().map(|j| j.to_string_lossy().into_owned())
    }
  }
}

/// Environment for a build command of `project`.
///
/// `PATH` is the declared tool directories, then each native input's `bin/`,
/// then the host `PATH`. `channel` pins rustup to the resolved toolchain.
/// The declared build-input environment is applied last.
pub fn command_env(project: &Project, host: &HostEnv, channel: Option<&str>) -> BTreeMap<String, String> {
  let mut env = BTreeMap::new();

  let path = project
    .tools
    .iter()
    .cloned()
    .chain(project.build_inputs.native.iter().map(|p| p.join("bin")))
    .chain(host.path.iter().cloned());
  if let Some(path) = join(path, "PATH") {
    env.insert("PATH".to_string(), path);
  }

  let pkg_config = project
    .build_inputs
    .native
    .iter()
    .map(|p| p.join("lib").join("pkgconfig"));
  if let Some(pkg_config) = join(pkg_config, "PKG_CONFIG_PATH") {
    env.insert("PKG_CONFIG_PATH".to_string(), pkg_config);
  }

  env.insert("HOME".to_string(), display(&host.home));
  env.insert("CARGO_HOME".to_string(), display(&host.cargo_home));
  env.insert("RUSTUP_HOME".to_string(), display(&host.rustup_home));
  if let Some(channel) = channel {
    env.insert("RUSTUP_TOOLCHAIN".to_string(), channel.to_string());
  }

  for (key, value) in &project.build_inputs.env {
    env.insert(key.clone(), value.clone());
  }
  env
}

fn display(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::project::ProjectDecl;

  fn host() -> HostEnv {
    HostEnv {
      path: vec![PathBuf::from("/usr/bin"), PathBuf::from("/bin")],
      home: PathBuf::from("/home/dev"),
      cargo_home: PathBuf::from("/home/dev/.cargo"),
      rustup_home: PathBuf::from("/home/dev/.rustup"),
    }
  }

  fn project() -> Project {
    let mut decl = ProjectDecl {
      tools: vec!["tools/bin".to_string()],
      ..Default::default()
    };
    decl.build_inputs.native = vec!["/opt/clang".to_string()];
    decl.build_inputs.env.insert("LIBCLANG_PATH".to_string(), "/opt/clang/lib".to_string());
    decl.validate(Path::new("/ws/build.lua")).unwrap()
  }

  #[cfg(unix)]
  #[test]
  fn path_puts_tools_and_native_before_host() {
    let env = command_env(&project(), &host(), Some("1.85.0"));

    assert_eq!(env["PATH"], "/ws/tools/bin:/opt/clang/bin:/usr/bin:/bin");
    assert_eq!(env["PKG_CONFIG_PATH"], "/opt/clang/lib/pkgconfig");
    assert_eq!(env["RUSTUP_TOOLCHAIN"], "1.85.0");
    assert_eq!(env["LIBCLANG_PATH"], "/opt/clang/lib");
    assert_eq!(env["HOME"], "/home/dev");
  }

  #[test]
  fn channel_is_optional() {
    let env = command_env(&project(), &host(), None);
    assert!(!env.contains_key("RUSTUP_TOOLCHAIN"));
    assert!(env.contains_key("CARGO_HOME"));
  }

  #[test]
  fn declared_env_wins() {
    let mut project = project();
    project.build_inputs.env.insert("HOME".to_string(), "/build-home".to_string());

    let env = command_env(&project, &host(), None);
    assert_eq!(env["HOME"], "/build-home");
  }
}
