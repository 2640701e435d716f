mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use bake_lib::consts::BAKEFILE_NAME;
use bake_lib::driver::{EXIT_USAGE, MakeError, Options};
use bake_lib::execute::{StalenessPolicy, default_jobs};
use bake_lib::flags::ResolvePolicy;
use bake_lib::manifest::{self, ManifestError};

use cmd::{cmd_build, cmd_clean, cmd_list, cmd_plan};
use output::{OutputFormat, print_error};

/// bake - incremental builds for C and C++ projects
#[derive(Parser)]
#[command(name = "bake")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Build description to load
  #[arg(short, long, default_value = BAKEFILE_NAME)]
  file: PathBuf,

  /// Maximum number of tools to run at once (default: available parallelism)
  #[arg(short, long)]
  jobs: Option<usize>,

  /// Build artifact root (default: from the build description, else `build`)
  #[arg(short, long)]
  output_dir: Option<PathBuf>,

  /// Echo every tool command line, package queries included, before running it
  #[arg(short, long)]
  verbose: bool,

  /// How to decide that an output is out of date
  #[arg(long, value_enum, default_value_t = PolicyArg::Mtime)]
  policy: PolicyArg,

  /// Continue with no flags when a package cannot be resolved
  #[arg(long)]
  optional_packages: bool,

  /// Show what would be rebuilt and why, without running anything
  #[arg(short = 'n', long)]
  dry_run: bool,

  /// Remove the output directory
  #[arg(long, conflicts_with_all = ["dry_run", "list"])]
  clean: bool,

  /// List declared targets
  #[arg(long, conflicts_with = "dry_run")]
  list: bool,

  /// Output format
  #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
  format: OutputFormat,

  /// Targets to build (default: all)
  targets: Vec<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
  Mtime,
  Content,
}

impl From<PolicyArg> for StalenessPolicy {
  fn from(arg: PolicyArg) -> Self {
    match arg {
      PolicyArg::Mtime => StalenessPolicy::Mtime,
      PolicyArg::Content => StalenessPolicy::Content,
    }
  }
}

fn main() -> ExitCode {
  // Initialize logging
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let cli = Cli::parse();

  match run(cli) {
    Ok(code) => ExitCode::from(code),
    Err(err) => {
      print_error(&format!("{:#}", err));
      ExitCode::from(exit_code(&err))
    }
  }
}

fn run(cli: Cli) -> Result<u8> {
  let project = manifest::load(&cli.file).with_context(|| format!("Failed to load {}", cli.file.display()))?;

  let output_dir = match cli.output_dir {
    // Relative to where bake was invoked, not to the project root.
    Some(dir) if dir.is_relative() => std::env::current_dir()
      .context("Failed to determine current directory")?
      .join(dir),
    Some(dir) => dir,
    None => project.output_dir.clone(),
  };

  let options = Options {
    root: project.root.clone(),
    output_dir,
    jobs: cli.jobs.unwrap_or_else(default_jobs),
    // Command echo would corrupt a JSON document on stdout.
    verbose: cli.verbose && !cli.format.is_json(),
    policy: cli.policy.into(),
    resolve_policy: if cli.optional_packages {
      ResolvePolicy::Empty
    } else {
      ResolvePolicy::Abort
    },
  };
  options.validate()?;

  if cli.clean {
    return cmd_clean(&options);
  }
  if cli.list {
    return cmd_list(&project, &options, cli.format);
  }
  if cli.dry_run {
    return cmd_plan(&project, &options, &cli.targets, cli.format);
  }
  cmd_build(&project, &options, &cli.targets, cli.format)
}

/// Usage and configuration errors exit 2; anything else that stops the run exits 1.
fn exit_code(err: &anyhow::Error) -> u8 {
  if let Some(make) = err.downcast_ref::<MakeError>() {
    return make.exit_code();
  }
  if err.downcast_ref::<ManifestError>().is_some() {
    return EXIT_USAGE;
  }
  1
}
