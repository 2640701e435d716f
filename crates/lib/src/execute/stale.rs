//! Staleness detection.
//!
//! Decides whether a rule's output can be reused. The filesystem is reached
//! through [`FileSystemView`] so the decision logic can be exercised against
//! an in-memory view.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::target::Rule;
use crate::util::hash::{ContentHash, hash_file};

use super::depfile;
use super::signature::{Signature, key};

/// How input changes are detected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StalenessPolicy {
  /// Compare modification times. Equal timestamps count as fresh.
  #[default]
  Mtime,
  /// Compare SHA-256 content hashes recorded at the last success.
  Content,
}

impl fmt::Display for StalenessPolicy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StalenessPolicy::Mtime => f.write_str("mtime"),
      StalenessPolicy::Content => f.write_str("content"),
    }
  }
}

/// Read-only access to the files a rule touches.
pub trait FileSystemView {
  /// Modification time, or `None` if the file does not exist.
  fn modified(&self, path: &Path) -> Option<SystemTime>;

  fn read_to_string(&self, path: &Path) -> Option<String>;

  fn hash(&self, path: &Path) -> Option<ContentHash>;
}

/// The real filesystem, with relative paths resolved against `root`.
#[derive(Debug, Clone)]
pub struct DiskView {
  root: PathBuf,
}

impl DiskView {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn resolve(&self, path: &Path) -> PathBuf {
    self.root.join(path)
  }
}

fn found<T>(path: &Path, result: io::Result<T>) -> Option<T> {
  match result {
    Ok(value) => Some(value),
    Err(e) => {
      if e.kind() != io::ErrorKind::NotFound {
        debug!(path = %path.display(), error = %e, "treating unreadable file as missing");
      }
      None
    }
  }
}

impl FileSystemView for DiskView {
  fn modified(&self, path: &Path) -> Option<SystemTime> {
    let full = self.resolve(path);
    found(&full, std::fs::metadata(&full).and_then(|m| m.modified()))
  }

  fn read_to_string(&self, path: &Path) -> Option<String> {
    let full = self.resolve(path);
    found(&full, std::fs::read_to_string(&full))
  }

  fn hash(&self, path: &Path) -> Option<ContentHash> {
    let full = self.resolve(path);
    found(&full, hash_file(&full))
  }
}

/// Why a rule has to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum StaleReason {
  /// Phony rule; always runs.
  NoInputs,
  OutputMissing,
  InputMissing { input: PathBuf },
  InputNewer { input: PathBuf },
  /// The rule asks for a depfile but the last run left none behind.
  DepfileMissing { depfile: PathBuf },
  /// Program or arguments differ from the last successful run.
  CommandChanged,
  /// A dependency was rebuilt earlier in this run.
  DependencyRebuilt,
  /// Content policy with no record of a previous success.
  NoSignature,
  ContentChanged { input: PathBuf },
}

impl fmt::Display for StaleReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StaleReason::NoInputs => write!(f, "rule has no inputs"),
      StaleReason::OutputMissing => write!(f, "output missing"),
      StaleReason::InputMissing { input } => write!(f, "input {} missing", input.display()),
      StaleReason::InputNewer { input } => write!(f, "{} is newer than output", input.display()),
      StaleReason::DepfileMissing { depfile } => write!(f, "depfile {} missing", depfile.display()),
      StaleReason::CommandChanged => write!(f, "command changed"),
      StaleReason::DependencyRebuilt => write!(f, "dependency rebuilt"),
      StaleReason::NoSignature => write!(f, "no previous signature"),
      StaleReason::ContentChanged { input } => write!(f, "{} changed", input.display()),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
  Fresh,
  Stale(StaleReason),
}

impl Staleness {
  pub fn is_stale(&self) -> bool {
    matches!(self, Staleness::Stale(_))
  }

  pub fn reason(&self) -> Option<&StaleReason> {
    match self {
      Staleness::Fresh => None,
      Staleness::Stale(reason) => Some(reason),
    }
  }
}

/// Mtime check with no signature record and no knowledge of the current run.
pub fn is_stale(rule: &Rule, view: &impl FileSystemView) -> bool {
  check(rule, view, None, StalenessPolicy::Mtime, false).is_stale()
}

/// Decide whether `rule` must run.
///
/// `dependency_rebuilt` is true when a rule producing one of this rule's
/// inputs ran in the current invocation. Only the mtime policy acts on it.
pub fn check(
  rule: &Rule,
  view: &impl FileSystemView,
  signature: Option<&Signature>,
  policy: StalenessPolicy,
  dependency_rebuilt: bool,
) -> Staleness {
  match evaluate(rule, view, signature, policy, dependency_rebuilt) {
    Ok(()) => Staleness::Fresh,
    Err(reason) => Staleness::Stale(reason),
  }
}

fn evaluate(
  rule: &Rule,
  view: &impl FileSystemView,
  signature: Option<&Signature>,
  policy: StalenessPolicy,
  dependency_rebuilt: bool,
) -> Result<(), StaleReason> {
  if rule.inputs.is_empty() {
    return Err(StaleReason::NoInputs);
  }

  let output_time = view.modified(&rule.output).ok_or(StaleReason::OutputMissing)?;

  let inputs = tracked_inputs(rule, view)?;

  if signature.is_some_and(|s| s.command != rule.signature()) {
    return Err(StaleReason::CommandChanged);
  }

  match policy {
    StalenessPolicy::Mtime => {
      for input in &inputs {
        let input_time = view
          .modified(input)
          .ok_or_else(|| StaleReason::InputMissing { input: input.clone() })?;
        if input_time > output_time {
          return Err(StaleReason::InputNewer { input: input.clone() });
        }
      }
      if dependency_rebuilt {
        return Err(StaleReason::DependencyRebuilt);
      }
    }
    StalenessPolicy::Content => {
      let recorded = signature.ok_or(StaleReason::NoSignature)?;
      for input in &inputs {
        let hash = view
          .hash(input)
          .ok_or_else(|| StaleReason::InputMissing { input: input.clone() })?;
        if recorded.inputs.get(&key(input)) != Some(&hash) {
          return Err(StaleReason::ContentChanged { input: input.clone() });
        }
      }
    }
  }

  Ok(())
}

/// Declared inputs followed by any headers listed in the rule's depfile.
///
/// Fails when a declared input is missing or when the depfile the rule
/// asks for is absent.
pub fn tracked_inputs(rule: &Rule, view: &impl FileSystemView) -> Result<Vec<PathBuf>, StaleReason> {
  let mut inputs = Vec::with_capacity(rule.inputs.len());
  for input in &rule.inputs {
    if view.modified(input).is_none() {
      return Err(StaleReason::InputMissing { input: input.clone() });
    }
    inputs.push(input.clone());
  }

  if let Some(depfile) = &rule.depfile {
    let contents = view
      .read_to_string(depfile)
      .ok_or_else(|| StaleReason::DepfileMissing { depfile: depfile.clone() })?;
    for header in depfile::parse(&contents) {
      if !inputs.contains(&header) {
        inputs.push(header);
      }
    }
  }

  Ok(inputs)
}

/// Content hashes of a rule's tracked inputs, for recording after success.
///
/// Files that cannot be read are left out, which makes the next content
/// check stale.
pub fn input_hashes(rule: &Rule, view: &impl FileSystemView) -> BTreeMap<String, ContentHash> {
  let inputs = tracked_inputs(rule, view).unwrap_or_else(|_| rule.inputs.clone());
  inputs
    .iter()
    .filter_map(|input| view.hash(input).map(|h| (key(input), h)))
    .collect()
}
