//! Types for rule execution.
//!
//! This module defines the error types, per-rule outcomes, the aggregate build
//! report and the configuration for running a build graph.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::target::RuleKind;

use super::dag::GraphError;
use super::stale::StalenessPolicy;

/// Errors that can occur while executing rules.
#[derive(Debug, Error)]
pub enum ExecuteError {
  /// The tool ran and exited unsuccessfully.
  #[error("command failed with exit code {code:?}: {cmd}")]
  CmdFailed {
    cmd: String,
    code: Option<i32>,
    stdout: String,
    stderr: String,
  },

  /// The tool could not be started.
  #[error("failed to start {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  /// I/O error while preparing or cleaning up a rule's output.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// Structural problem found while selecting rules.
  #[error(transparent)]
  Graph(#[from] GraphError),
}

/// Why a rule failed, with whatever the tool printed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFailure {
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub code: Option<i32>,
  #[serde(skip_serializing_if = "String::is_empty")]
  pub stdout: String,
  #[serde(skip_serializing_if = "String::is_empty")]
  pub stderr: String,
}

impl From<&ExecuteError> for RuleFailure {
  fn from(err: &ExecuteError) -> Self {
    match err {
      ExecuteError::CmdFailed {
        code, stdout, stderr, ..
      } => RuleFailure {
        message: err.to_string(),
        code: *code,
        stdout: stdout.clone(),
        stderr: stderr.clone(),
      },
      other => RuleFailure {
        message: other.to_string(),
        code: None,
        stdout: String::new(),
        stderr: String::new(),
      },
    }
  }
}

/// Terminal state of one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum RuleOutcome {
  /// Output was up to date; the tool was not invoked.
  FreshSkipped,
  /// The tool ran and succeeded.
  RebuiltOk,
  /// The tool ran and failed, or could not be started.
  Failed(RuleFailure),
  /// Not run because `by` (a transitive dependency) failed.
  Blocked { by: PathBuf },
  /// Not run, or killed while running, because the build was interrupted.
  Cancelled,
}

impl RuleOutcome {
  pub fn is_ok(&self) -> bool {
    matches!(self, RuleOutcome::FreshSkipped | RuleOutcome::RebuiltOk)
  }
}

/// Outcome of one rule, with enough context to print a status line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleReport {
  pub output: PathBuf,
  pub kind: RuleKind,
  pub target: String,
  pub description: String,
  pub outcome: RuleOutcome,
  /// What a successful tool printed, such as compiler warnings. A failed
  /// rule carries its streams in [`RuleFailure`].
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub stdout: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub stderr: String,
}

/// Result of running a build graph.
///
/// Entries are in topological order of the selected rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildReport {
  pub rules: Vec<RuleReport>,
  /// The run was stopped by an interrupt before finishing.
  pub interrupted: bool,
  #[serde(with = "duration_millis")]
  pub elapsed: Duration,
}

impl BuildReport {
  /// Returns true if every rule is fresh or rebuilt.
  pub fn is_success(&self) -> bool {
    !self.interrupted && self.rules.iter().all(|r| r.outcome.is_ok())
  }

  /// Process exit status for this report: 0 on success, 1 otherwise.
  pub fn exit_code(&self) -> u8 {
    if self.is_success() { 0 } else { 1 }
  }

  pub fn get(&self, output: impl AsRef<std::path::Path>) -> Option<&RuleReport> {
    self.rules.iter().find(|r| r.output == output.as_ref())
  }

  pub fn fresh(&self) -> usize {
    self.count(|o| matches!(o, RuleOutcome::FreshSkipped))
  }

  pub fn rebuilt(&self) -> usize {
    self.count(|o| matches!(o, RuleOutcome::RebuiltOk))
  }

  pub fn failed(&self) -> usize {
    self.count(|o| matches!(o, RuleOutcome::Failed(_)))
  }

  pub fn blocked(&self) -> usize {
    self.count(|o| matches!(o, RuleOutcome::Blocked { .. }))
  }

  pub fn cancelled(&self) -> usize {
    self.count(|o| matches!(o, RuleOutcome::Cancelled))
  }

  pub fn total(&self) -> usize {
    self.rules.len()
  }

  fn count(&self, pred: impl Fn(&RuleOutcome) -> bool) -> usize {
    self.rules.iter().filter(|r| pred(&r.outcome)).count()
  }
}

mod duration_millis {
  use std::time::Duration;

  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    u64::deserialize(d).map(Duration::from_millis)
  }
}

/// Configuration for build execution.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Maximum number of tools to run at once.
  pub jobs: usize,

  /// Echo every command line before running it.
  pub verbose: bool,

  /// Directory tools run in; relative rule paths are resolved against it.
  pub root: PathBuf,

  /// Where the signature cache is kept (relative to `root` unless absolute).
  pub signatures: Option<PathBuf>,

  pub policy: StalenessPolicy,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      jobs: default_jobs(),
      verbose: false,
      root: PathBuf::from("."),
      signatures: None,
      policy: StalenessPolicy::default(),
    }
  }
}

/// Host parallelism, used as the default job count.
pub fn default_jobs() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}
