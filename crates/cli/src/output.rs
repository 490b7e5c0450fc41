//! Terminal and JSON rendering for zbuild commands.
//!
//! Every status line starts with a [`Mark`]; `--output json` bypasses all of
//! it and prints the command's report with `serde_json`.

use std::fmt;
use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

/// Leading symbol of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
  Ok,
  Fail,
  Warn,
  Note,
  /// Stage output reused from the store.
  Cached,
  /// Stage that will run.
  Build,
  /// Stage skipped behind a failed dependency.
  Skipped,
}

impl Mark {
  pub fn symbol(self) -> &'static str {
    match self {
      Mark::Ok => "✓",
      Mark::Fail => "✗",
      Mark::Warn => "⚠",
      Mark::Note => "•",
      Mark::Cached => "=",
      Mark::Build => "+",
      Mark::Skipped => "-",
    }
  }

  /// Failures and warnings go to stderr.
  fn stream(self) -> Stream {
    match self {
      Mark::Fail | Mark::Warn => Stream::Stderr,
      _ => Stream::Stdout,
    }
  }

  /// The symbol, colored when `stream` is a terminal.
  pub fn paint(self, stream: Stream) -> String {
    let symbol = self.symbol();
    match self {
      Mark::Ok | Mark::Cached => symbol.if_supports_color(stream, |s| s.green()).to_string(),
      Mark::Fail => symbol.if_supports_color(stream, |s| s.red()).to_string(),
      Mark::Warn | Mark::Build | Mark::Skipped => symbol.if_supports_color(stream, |s| s.yellow()).to_string(),
      Mark::Note => symbol.if_supports_color(stream, |s| s.blue()).to_string(),
    }
  }
}

impl fmt::Display for Mark {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.paint(Stream::Stdout))
  }
}

/// One status line; failures and warnings also color the message.
pub fn status(mark: Mark, message: &str) {
  let stream = mark.stream();
  match mark {
    Mark::Fail => eprintln!("{} {}", mark.paint(stream), message.if_supports_color(stream, |s| s.red())),
    Mark::Warn => eprintln!("{} {}", mark.paint(stream), message.if_supports_color(stream, |s| s.yellow())),
    _ => println!("{} {}", mark.paint(stream), message),
  }
}

/// Indented stage line: `  <mark> <stage> (<note>)`.
pub fn stage_line(mark: Mark, stage: impl fmt::Display, note: &str) {
  println!(
    "  {} {} {}",
    mark,
    stage,
    format!("({})", note).if_supports_color(Stream::Stdout, |s| s.dimmed())
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!("  {}: {}", label.if_supports_color(Stream::Stdout, |s| s.dimmed()), value);
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

/// The hash prefix of a store entry name, cut to 12 characters.
pub fn short_entry(name: &str) -> &str {
  name.get(..12).unwrap_or(name)
}

pub fn format_bytes(bytes: u64) -> String {
  const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

  if bytes < 1024 {
    return format!("{} B", bytes);
  }
  let mut value = bytes as f64 / 1024.0;
  let mut unit = 0;
  while value >= 1024.0 && unit + 1 < UNITS.len() {
    value /= 1024.0;
    unit += 1;
  }
  format!("{:.1} {}", value, UNITS[unit])
}

pub fn format_duration(duration: Duration) -> String {
  match duration.as_secs() {
    0 => format!("{}ms", duration.as_millis()),
    secs @ 1..60 => format!("{}.{:02}s", secs, duration.subsec_millis() / 10),
    secs => format!("{}m {}s", secs / 60, secs % 60),
  }
}
