//! Top-level build driver.
//!
//! Turns a [`RuleSet`] plus options into a finished [`BuildReport`]. All
//! structural work happens before the first tool is spawned: option
//! validation, target name checks, package flag resolution, rule derivation
//! and graph construction. A doomed invocation therefore leaves the
//! filesystem untouched.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info};

use crate::consts::DEFAULT_OUTPUT_DIR;
use crate::execute::{self, BuildGraph, BuildReport, ExecuteConfig, ExecuteError, GraphError, PlannedRule, StalenessPolicy};
use crate::flags::{FlagQuery, FlagResolver, ResolveError, ResolvePolicy};
use crate::target::{Layout, PackageFlags, RuleSet, TargetError, Toolchain};

/// Exit status for usage and configuration errors.
pub const EXIT_USAGE: u8 = 2;

/// Errors that stop an invocation before any rule runs.
#[derive(Debug, Error)]
pub enum MakeError {
  #[error("configuration error: {0}")]
  Configuration(String),

  #[error("unknown target: {0}")]
  UnknownTarget(String),

  #[error(transparent)]
  Target(#[from] TargetError),

  #[error("failed to resolve packages for target {target}: {source}")]
  Resolve {
    target: String,
    #[source]
    source: ResolveError,
  },

  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error(transparent)]
  Execute(#[from] ExecuteError),

  #[error("failed to remove {path}: {source}")]
  Clean {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

impl MakeError {
  /// Process exit status: usage and structural errors are distinct from
  /// build failures.
  pub fn exit_code(&self) -> u8 {
    match self {
      MakeError::Execute(ExecuteError::Graph(_)) => EXIT_USAGE,
      MakeError::Execute(_) | MakeError::Clean { .. } => 1,
      _ => EXIT_USAGE,
    }
  }
}

/// Options for one invocation.
#[derive(Debug, Clone)]
pub struct Options {
  /// Project root. Sources, outputs and tool invocations are relative to it.
  pub root: PathBuf,

  /// Build artifact root, relative to `root` unless absolute.
  pub output_dir: PathBuf,

  pub jobs: usize,

  /// Echo every command line before running it.
  pub verbose: bool,

  pub policy: StalenessPolicy,

  /// What to do when package flags cannot be resolved.
  pub resolve_policy: ResolvePolicy,
}

impl Default for Options {
  fn default() -> Self {
    Self {
      root: PathBuf::from("."),
      output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
      jobs: execute::default_jobs(),
      verbose: false,
      policy: StalenessPolicy::default(),
      resolve_policy: ResolvePolicy::default(),
    }
  }
}

impl Options {
  pub fn validate(&self) -> Result<(), MakeError> {
    if self.jobs == 0 {
      return Err(MakeError::Configuration("jobs must be at least 1".to_string()));
    }
    if self.output_dir.as_os_str().is_empty() {
      return Err(MakeError::Configuration("output directory must not be empty".to_string()));
    }
    self.check_output_dir()
  }

  /// The output directory is removed wholesale by [`clean`], so it must not
  /// be the project root or one of its ancestors.
  fn check_output_dir(&self) -> Result<(), MakeError> {
    let output = self.root.join(&self.output_dir);
    // A directory that does not exist yet cannot contain the root.
    let (Ok(output), Ok(root)) = (dunce::canonicalize(&output), dunce::canonicalize(&self.root)) else {
      return Ok(());
    };
    if root.starts_with(&output) {
      return Err(MakeError::Configuration(format!(
        "output directory {} contains the project root {}",
        output.display(),
        root.display()
      )));
    }
    Ok(())
  }

  pub fn layout(&self) -> Layout {
    Layout::new(&self.output_dir)
  }

  fn execute_config(&self) -> ExecuteConfig {
    ExecuteConfig {
      jobs: self.jobs,
      verbose: self.verbose,
      root: self.root.clone(),
      signatures: Some(self.layout().signatures_path()),
      policy: self.policy,
    }
  }
}

/// Build `targets` (all targets if empty).
pub async fn make<Q: FlagQuery>(
  rules: &RuleSet,
  toolchain: &Toolchain,
  options: &Options,
  targets: &[String],
  resolver: &FlagResolver<Q>,
) -> Result<BuildReport, MakeError> {
  make_until(rules, toolchain, options, targets, resolver, std::future::pending()).await
}

/// Like [`make`], but cancels the build when `shutdown` resolves.
pub async fn make_until<Q, F>(
  rules: &RuleSet,
  toolchain: &Toolchain,
  options: &Options,
  targets: &[String],
  resolver: &FlagResolver<Q>,
  shutdown: F,
) -> Result<BuildReport, MakeError>
where
  Q: FlagQuery,
  F: Future<Output = ()>,
{
  let graph = prepare(rules, toolchain, options, targets, resolver)?;
  let report = execute::run_until(&graph, targets, &options.execute_config(), shutdown).await?;
  Ok(report)
}

/// Report what [`make`] would do without running anything.
pub fn plan<Q: FlagQuery>(
  rules: &RuleSet,
  toolchain: &Toolchain,
  options: &Options,
  targets: &[String],
  resolver: &FlagResolver<Q>,
) -> Result<Vec<PlannedRule>, MakeError> {
  let graph = prepare(rules, toolchain, options, targets, resolver)?;
  Ok(execute::plan(&graph, targets, &options.execute_config())?)
}

/// Remove the output directory. Returns false if there was nothing to remove.
pub fn clean(options: &Options) -> Result<bool, MakeError> {
  options.validate()?;
  let path = options.root.join(&options.output_dir);

  match std::fs::remove_dir_all(&path) {
    Ok(()) => {
      info!(path = %path.display(), "removed output directory");
      Ok(true)
    }
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
    Err(source) => Err(MakeError::Clean { path, source }),
  }
}

/// Validate, resolve flags, derive rules and build the graph.
fn prepare<Q: FlagQuery>(
  rules: &RuleSet,
  toolchain: &Toolchain,
  options: &Options,
  targets: &[String],
  resolver: &FlagResolver<Q>,
) -> Result<BuildGraph, MakeError> {
  options.validate()?;

  for name in targets {
    if !rules.contains(name) {
      return Err(MakeError::UnknownTarget(name.clone()));
    }
  }

  let mut packages = BTreeMap::new();
  for name in needed_targets(rules, targets)? {
    let Some(target) = rules.get(&name) else {
      continue;
    };
    if target.packages().is_empty() {
      continue;
    }

    let resolve = |mode: &str| {
      resolver
        .resolve_with(options.resolve_policy, &[mode], target.packages())
        .map_err(|source| MakeError::Resolve {
          target: name.clone(),
          source,
        })
    };
    let flags = PackageFlags {
      cflags: resolve("--cflags")?,
      libs: resolve("--libs")?,
    };
    debug!(target = %name, cflags = ?flags.cflags, libs = ?flags.libs, "package flags");
    packages.insert(name.clone(), flags);
  }

  let derived = rules.derive(&options.layout(), toolchain, &packages)?;
  let graph = BuildGraph::from_rules(derived)?;

  info!(
    targets = ?graph.target_names(),
    compile = graph.compile_count(),
    link = graph.link_count(),
    "derived build graph"
  );

  Ok(graph)
}

/// Requested targets and everything they depend on (all targets if none requested).
fn needed_targets(rules: &RuleSet, requested: &[String]) -> Result<BTreeSet<String>, MakeError> {
  if requested.is_empty() {
    return Ok(rules.names().map(str::to_string).collect());
  }

  let mut needed = BTreeSet::new();
  let mut stack: Vec<String> = requested.to_vec();
  while let Some(name) = stack.pop() {
    if !needed.insert(name.clone()) {
      continue;
    }
    let target = rules.get(&name).ok_or_else(|| MakeError::UnknownTarget(name.clone()))?;
    stack.extend(target.deps().iter().cloned());
  }

  Ok(needed)
}
