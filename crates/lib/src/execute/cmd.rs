//! Isolated command execution.
//!
//! Every build command runs through a plain system shell with a cleared
//! environment; only what the caller hands in (plus a fixed reproducibility
//! baseline) is visible to it.

use std::collections::BTreeMap;
use std::path::Path;

use tokio::process::Command;
use tracing::{debug, info};

use crate::consts::SOURCE_DATE_EPOCH;
use crate::execute::types::StageError;

/// Lines of stderr kept in a failure diagnostic.
const STDERR_TAIL_LINES: usize = 20;

/// Captured output of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdOutput {
  /// Trimmed stdout.
  pub stdout: String,
  pub stderr: String,
}

/// Execute a command in an isolated environment.
///
/// - Clears all environment variables
/// - Sets PATH to /path-not-set unless `env` provides one
/// - Sets TMPDIR/TMP/TEMP/TEMPDIR to `tmp/` within `out_dir`
/// - Sets `out` to the output directory
/// - Sets LANG/LC_ALL to C and SOURCE_DATE_EPOCH to 1980-01-01
/// - Merges `env` on top
///
/// `cwd` defaults to `out_dir`.
pub async fn execute_cmd(
  cmd: &str,
  env: &BTreeMap<String, String>,
  cwd: Option<&Path>,
  out_dir: &Path,
  shell: Option<&str>,
) -> Result<CmdOutput, StageError> {
  info!(cmd = %cmd, "executing command");

  let tmp_dir = out_dir.join("tmp");
  tokio::fs::create_dir_all(&tmp_dir).await?;

  let (shell_cmd, shell_args) = get_shell(shell);
  let working_dir = cwd.unwrap_or(out_dir);

  let mut command = Command::new(&shell_cmd);
  command
    .args(&shell_args)
    .arg(cmd)
    .current_dir(working_dir)
    .env_clear()
    .env("PATH", "/path-not-set")
    .env("TMPDIR", &tmp_dir)
    .env("TMP", &tmp_dir)
    .env("TEMP", &tmp_dir)
    .env("TEMPDIR", &tmp_dir)
    .env("out", out_dir)
    .env("LANG", "C")
    .env("LC_ALL", "C")
    .env("SOURCE_DATE_EPOCH", SOURCE_DATE_EPOCH)
    .envs(env);

  debug!(shell = %shell_cmd, working_dir = ?working_dir, "spawning process");

  let output = command.output().await?;
  let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
  let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

  if !output.status.success() {
    if !stdout.is_empty() {
      debug!(stdout = %stdout, "command stdout");
    }
    return Err(StageError::CmdFailed {
      cmd: cmd.to_string(),
      code: output.status.code(),
      stderr: tail(&stderr, STDERR_TAIL_LINES),
    });
  }

  if !stdout.is_empty() {
    debug!(stdout = %stdout, "command output");
  }

  Ok(CmdOutput { stdout, stderr })
}

fn tail(text: &str, lines: usize) -> String {
  let all: Vec<&str> = text.lines().collect();
  all[all.len().saturating_sub(lines)..].join("\n")
}

/// The shell command and its arguments for the current platform.
///
/// Builds always use `/bin/sh` (Unix) or PowerShell (Windows) rather than
/// `$SHELL`: interactive shells source profiles that would leak into the
/// isolated environment.
pub fn get_shell(override_shell: Option<&str>) -> (String, Vec<String>) {
  if let Some(shell) = override_shell {
    let args = if shell.contains("powershell") || shell.contains("pwsh") {
      vec![
        "-NoProfile".to_string(),
        "-ExecutionPolicy".to_string(),
        "Bypass".to_string(),
        "-Command".to_string(),
      ]
    } else if shell.contains("cmd") {
      vec!["/C".to_string()]
    } else {
      vec!["-c".to_string()]
    };
    return (shell.to_string(), args);
  }

  #[cfg(unix)]
  {
    ("/bin/sh".to_string(), vec!["-c".to_string()])
  }

  #[cfg(windows)]
  {
    (
      "powershell.exe".to_string(),
      vec![
        "-NoProfile".to_string(),
        "-ExecutionPolicy".to_string(),
        "Bypass".to_string(),
        "-Command".to_string(),
      ],
    )
  }
}
