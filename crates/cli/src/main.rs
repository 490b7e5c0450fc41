mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use output::{Mark, OutputFormat, status};
use zbuild_lib::consts::DEFAULT_CONFIG_FILE;

/// zbuild - reproducible builds for the Crosslink workspace
#[derive(Parser)]
#[command(name = "zbuild")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build every declared output and link the result
  Build {
    /// Path to the project file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    file: PathBuf,

    /// Where to point the result link
    #[arg(long, default_value = "result", conflicts_with = "no_link")]
    out_link: PathBuf,

    /// Do not create a result link
    #[arg(long)]
    no_link: bool,
  },

  /// Run every stage, hygiene checks included
  Check {
    /// Path to the project file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    file: PathBuf,
  },

  /// Enter a shell (or run a command) with the build environment
  Shell {
    /// Path to the project file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    file: PathBuf,

    /// Command to run instead of an interactive shell
    #[arg(last = true)]
    command: Vec<String>,
  },

  /// Show how both classifier strategies see the given paths
  Classify {
    /// Path to the project file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    file: PathBuf,

    /// Paths relative to the workspace root
    #[arg(required = true)]
    paths: Vec<PathBuf>,
  },

  /// Compare the two classifier strategies on the workspace
  DiffSources {
    /// Path to the project file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    file: PathBuf,
  },

  /// List stages in execution order with their cache status
  Plan {
    /// Path to the project file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    file: PathBuf,
  },

  /// Remove store entries no build record references
  Gc {
    /// Show what would be removed without deleting anything
    #[arg(long)]
    dry_run: bool,
  },

  /// Show platform and storage locations
  Info,
}

fn main() {
  let cli = Cli::parse();

  let filter = EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "warn" }));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  if let Err(e) = run(cli) {
    status(Mark::Fail, &format!("{:#}", e));
    std::process::exit(1);
  }
}

fn run(cli: Cli) -> Result<()> {
  let output = cli.output;
  match cli.command {
    Commands::Build {
      file,
      out_link,
      no_link,
    } => cmd::cmd_build(&file, (!no_link).then_some(out_link.as_path()), output),
    Commands::Check { file } => cmd::cmd_check(&file, output),
    Commands::Shell { file, command } => cmd::cmd_shell(&file, &command),
    Commands::Classify { file, paths } => cmd::cmd_classify(&file, &paths, output),
    Commands::DiffSources { file } => cmd::cmd_diff_sources(&file, output),
    Commands::Plan { file } => cmd::cmd_plan(&file, output),
    Commands::Gc { dry_run } => cmd::cmd_gc(dry_run, output),
    Commands::Info => cmd::cmd_info(output),
  }
}
