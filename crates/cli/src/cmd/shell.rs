//! Implementation of the `zbuild shell` command.

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use tracing::debug;

use zbuild_lib::execute::cmd::get_shell;

use super::load_context;

/// Host variables an interactive shell needs to draw itself.
const PASSTHROUGH: &[&str] = &["TERM", "COLORTERM", "DISPLAY"];

/// Spawn `command` (or an interactive shell) in the workspace root with the
/// environment build commands see, minus the per-stage variables.
///
/// Exits with the child's status.
pub fn cmd_shell(file: &Path, command: &[String]) -> Result<()> {
  let ctx = load_context(file)?;
  let channel = ctx.toolchain.as_ref().map(|t| t.channel.as_str());
  let env = ctx.env(channel);

  let (program, args) = match command.split_first() {
    Some((program, args)) => (program.clone(), args.to_vec()),
    None => {
      let shell = std::env::var("SHELL").unwrap_or_else(|_| get_shell(None).0);
      (shell, Vec::new())
    }
  };
  debug!(program = %program, root = %ctx.project.root.display(), "spawning shell");

  let mut cmd = Command::new(&program);
  cmd.args(&args).current_dir(&ctx.project.root).env_clear().envs(&env);
  for var in PASSTHROUGH {
    if let Some(value) = std::env::var_os(var) {
      cmd.env(var, value);
    }
  }

  let status = cmd.status().with_context(|| format!("Failed to run {}", program))?;
  std::process::exit(status.code().unwrap_or(1));
}
