//! Target definitions and the rule collection.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while declaring targets or deriving rules from them.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
  #[error("invalid target name {0:?}: names must be non-empty and contain no path separators or whitespace")]
  InvalidName(String),

  #[error("target {0} has no sources")]
  NoSources(String),

  #[error("target {target} lists source {source_path} more than once")]
  DuplicateSource { target: String, source_path: PathBuf },

  #[error("target {0} depends on itself")]
  SelfDependency(String),

  #[error("target {0} is already defined with a different configuration")]
  Duplicate(String),

  #[error("target {target} depends on unknown target {dependency}")]
  UnknownDependency { target: String, dependency: String },
}

/// The kind of product a target builds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
  #[default]
  Executable,
  StaticLibrary,
}

/// A named, immutable build product.
///
/// Constructed through [`Target::builder`], which validates the whole
/// configuration at once so partially configured targets never exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
  name: String,
  kind: TargetKind,
  sources: Vec<PathBuf>,
  cflags: Vec<String>,
  linkopts: Vec<String>,
  packages: Vec<String>,
  deps: Vec<String>,
}

impl Target {
  pub fn builder(name: impl Into<String>) -> TargetBuilder {
    TargetBuilder {
      name: name.into(),
      kind: TargetKind::default(),
      sources: Vec::new(),
      cflags: Vec::new(),
      linkopts: Vec::new(),
      packages: Vec::new(),
      deps: Vec::new(),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn kind(&self) -> TargetKind {
    self.kind
  }

  pub fn sources(&self) -> &[PathBuf] {
    &self.sources
  }

  pub fn cflags(&self) -> &[String] {
    &self.cflags
  }

  pub fn linkopts(&self) -> &[String] {
    &self.linkopts
  }

  /// Libraries whose `--cflags`/`--libs` are resolved when the build runs.
  pub fn packages(&self) -> &[String] {
    &self.packages
  }

  /// Other targets whose artifacts this target links against.
  pub fn deps(&self) -> &[String] {
    &self.deps
  }
}

/// Builder for [`Target`].
#[derive(Debug, Clone)]
pub struct TargetBuilder {
  name: String,
  kind: TargetKind,
  sources: Vec<PathBuf>,
  cflags: Vec<String>,
  linkopts: Vec<String>,
  packages: Vec<String>,
  deps: Vec<String>,
}

impl TargetBuilder {
  pub fn kind(mut self, kind: TargetKind) -> Self {
    self.kind = kind;
    self
  }

  pub fn source(mut self, source: impl Into<PathBuf>) -> Self {
    self.sources.push(source.into());
    self
  }

  pub fn sources<I, P>(mut self, sources: I) -> Self
  where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
  {
    self.sources.extend(sources.into_iter().map(Into::into));
    self
  }

  /// Append compile flags. Repeated calls keep their relative order.
  pub fn cflags<I, S>(mut self, flags: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.cflags.extend(flags.into_iter().map(Into::into));
    self
  }

  /// Append link options. Repeated calls keep their relative order.
  pub fn linkopts<I, S>(mut self, opts: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.linkopts.extend(opts.into_iter().map(Into::into));
    self
  }

  pub fn packages<I, S>(mut self, packages: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.packages.extend(packages.into_iter().map(Into::into));
    self
  }

  pub fn deps<I, S>(mut self, deps: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.deps.extend(deps.into_iter().map(Into::into));
    self
  }

  /// Validate and freeze the target.
  pub fn build(self) -> Result<Target, TargetError> {
    if !is_valid_name(&self.name) {
      return Err(TargetError::InvalidName(self.name));
    }

    if self.sources.is_empty() {
      return Err(TargetError::NoSources(self.name));
    }

    let mut seen = HashSet::new();
    for source in &self.sources {
      if !seen.insert(source) {
        return Err(TargetError::DuplicateSource {
          target: self.name.clone(),
          source_path: source.clone(),
        });
      }
    }

    if self.deps.iter().any(|d| d == &self.name) {
      return Err(TargetError::SelfDependency(self.name));
    }

    Ok(Target {
      name: self.name,
      kind: self.kind,
      sources: self.sources,
      cflags: self.cflags,
      linkopts: self.linkopts,
      packages: self.packages,
      deps: self.deps,
    })
  }
}

fn is_valid_name(name: &str) -> bool {
  !name.is_empty() && !name.contains(['/', '\\']) && !name.chars().any(char::is_whitespace) && name != "." && name != ".."
}

/// An explicit, owned collection of targets for one build description.
///
/// Nothing is registered globally: each `RuleSet` is independent, so separate
/// build invocations (and tests) never see each other's targets.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
  targets: BTreeMap<String, Target>,
}

impl RuleSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a target.
  ///
  /// Adding an identical target twice is a no-op; a different target under an
  /// existing name is an error.
  pub fn add_target(&mut self, target: Target) -> Result<(), TargetError> {
    match self.targets.get(target.name()) {
      Some(existing) if existing == &target => Ok(()),
      Some(_) => Err(TargetError::Duplicate(target.name)),
      None => {
        self.targets.insert(target.name.clone(), target);
        Ok(())
      }
    }
  }

  /// Every declared dependency names a target in this set.
  pub fn check_dependencies(&self) -> Result<(), TargetError> {
    for target in self.targets.values() {
      if let Some(missing) = target.deps.iter().find(|d| !self.targets.contains_key(*d)) {
        return Err(TargetError::UnknownDependency {
          target: target.name.clone(),
          dependency: missing.clone(),
        });
      }
    }
    Ok(())
  }

  pub fn get(&self, name: &str) -> Option<&Target> {
    self.targets.get(name)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.targets.contains_key(name)
  }

  /// Target names in sorted order.
  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.targets.keys().map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = &Target> {
    self.targets.values()
  }

  pub fn len(&self) -> usize {
    self.targets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.targets.is_empty()
  }
}
