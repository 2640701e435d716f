//! Build steps derived from targets.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::util::hash::{ContentHash, hash_command};

use super::layout::Layout;
use super::toolchain::Toolchain;
use super::types::{RuleSet, Target, TargetError, TargetKind};

/// What a rule does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleKind {
  /// Compile one source file into one object.
  Compile,
  /// Link objects into an executable.
  Link,
  /// Archive objects into a static library.
  Archive,
  /// A caller-supplied step.
  Custom,
}

impl std::fmt::Display for RuleKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      RuleKind::Compile => "compile",
      RuleKind::Link => "link",
      RuleKind::Archive => "archive",
      RuleKind::Custom => "run",
    };
    f.write_str(s)
  }
}

/// One unit of work: run `program args...` to produce `output` from `inputs`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rule {
  pub kind: RuleKind,
  /// The target this rule was derived for.
  pub target: String,
  pub output: PathBuf,
  pub inputs: Vec<PathBuf>,
  pub program: String,
  pub args: Vec<String>,
  /// Make-style dependency file the tool writes alongside `output`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub depfile: Option<PathBuf>,
}

impl Rule {
  /// A custom rule. A rule with no inputs is always rebuilt.
  pub fn new(
    target: impl Into<String>,
    output: impl Into<PathBuf>,
    inputs: Vec<PathBuf>,
    program: impl Into<String>,
    args: Vec<String>,
  ) -> Self {
    Self {
      kind: RuleKind::Custom,
      target: target.into(),
      output: output.into(),
      inputs,
      program: program.into(),
      args,
      depfile: None,
    }
  }

  /// Shell-quoted command line, for echoing and diagnostics.
  pub fn command_line(&self) -> String {
    std::iter::once(self.program.as_str())
      .chain(self.args.iter().map(String::as_str))
      .map(|part| shlex::try_quote(part).unwrap_or(Cow::Borrowed(part)))
      .collect::<Vec<_>>()
      .join(" ")
  }

  /// Hash of the effective command, used to notice flag changes between runs.
  pub fn signature(&self) -> ContentHash {
    hash_command(&self.program, &self.args)
  }

  /// Short one-line description, e.g. `compile main.c`.
  pub fn description(&self) -> String {
    match (self.kind, self.inputs.first()) {
      (RuleKind::Compile, Some(source)) => format!("compile {}", source.display()),
      _ => format!("{} {}", self.kind, self.output.display()),
    }
  }
}

/// Flags resolved from a target's packages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageFlags {
  pub cflags: Vec<String>,
  pub libs: Vec<String>,
}

const CXX_EXTENSIONS: &[&str] = &["cc", "cpp", "cxx", "C", "c++"];

fn is_cxx_source(path: &Path) -> bool {
  path
    .extension()
    .and_then(|e| e.to_str())
    .is_some_and(|ext| CXX_EXTENSIONS.contains(&ext))
}

fn path_arg(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}

impl RuleSet {
  /// Expand every target into its rules.
  ///
  /// `packages` holds the resolved package flags per target name; targets
  /// without an entry get none.
  pub fn derive(
    &self,
    layout: &Layout,
    toolchain: &Toolchain,
    packages: &BTreeMap<String, PackageFlags>,
  ) -> Result<Vec<Rule>, TargetError> {
    let empty = PackageFlags::default();
    let mut rules = Vec::new();

    for target in self.iter() {
      let flags = packages.get(target.name()).unwrap_or(&empty);
      let mut dep_artifacts = Vec::new();
      for dep in target.deps() {
        let dep_target = self.get(dep).ok_or_else(|| TargetError::UnknownDependency {
          target: target.name().to_string(),
          dependency: dep.clone(),
        })?;
        dep_artifacts.push(layout.artifact_path(dep_target));
      }
      rules.extend(derive_target(target, layout, toolchain, flags, &dep_artifacts));
    }

    Ok(rules)
  }
}

/// Rules for a single target: N compile rules, then one link/archive rule.
pub fn derive_target(
  target: &Target,
  layout: &Layout,
  toolchain: &Toolchain,
  flags: &PackageFlags,
  dep_artifacts: &[PathBuf],
) -> Vec<Rule> {
  let mut rules = Vec::with_capacity(target.sources().len() + 1);
  let mut objects = Vec::with_capacity(target.sources().len());

  for source in target.sources() {
    let object = layout.object_path(source);
    let compiler = if is_cxx_source(source) { &toolchain.cxx } else { &toolchain.cc };

    let mut args: Vec<String> = target.cflags().iter().chain(flags.cflags.iter()).cloned().collect();
    args.extend(["-c".to_string(), path_arg(source), "-o".to_string(), path_arg(&object)]);

    let depfile = toolchain.depfiles.then(|| Layout::depfile_path(&object));
    if let Some(depfile) = &depfile {
      args.extend(["-MMD".to_string(), "-MF".to_string(), path_arg(depfile)]);
    }

    rules.push(Rule {
      kind: RuleKind::Compile,
      target: target.name().to_string(),
      output: object.clone(),
      inputs: vec![source.clone()],
      program: compiler.clone(),
      args,
      depfile,
    });
    objects.push(object);
  }

  let artifact = layout.artifact_path(target);
  let mut inputs = objects.clone();
  inputs.extend(dep_artifacts.iter().cloned());

  let rule = match target.kind() {
    TargetKind::Executable => {
      let linker = if target.sources().iter().any(|s| is_cxx_source(s)) {
        &toolchain.cxx
      } else {
        &toolchain.cc
      };
      let mut args: Vec<String> = inputs.iter().map(|p| path_arg(p)).collect();
      args.extend(["-o".to_string(), path_arg(&artifact)]);
      args.extend(target.linkopts().iter().chain(flags.libs.iter()).cloned());
      Rule {
        kind: RuleKind::Link,
        target: target.name().to_string(),
        output: artifact,
        inputs,
        program: linker.clone(),
        args,
        depfile: None,
      }
    }
    TargetKind::StaticLibrary => {
      let mut args = vec!["rcs".to_string(), path_arg(&artifact)];
      args.extend(objects.iter().map(|p| path_arg(p)));
      Rule {
        kind: RuleKind::Archive,
        target: target.name().to_string(),
        output: artifact,
        inputs,
        program: toolchain.ar.clone(),
        args,
        depfile: None,
      }
    }
  };
  rules.push(rule);

  rules
}
