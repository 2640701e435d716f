//! Bakefile loading.
//!
//! A Bakefile is a TOML build description:
//!
//! ```toml
//! [toolchain]
//! cc = "gcc"
//!
//! [build]
//! output-dir = "build"
//!
//! [[target]]
//! name = "gasim"
//! sources = ["main.c"]
//! cflags = ["-Wall", "-std=gnu99", "-g"]
//! packages = ["sdl"]
//! ```
//!
//! Loading validates every target, so a [`Project`] always holds a
//! consistent [`RuleSet`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::consts::DEFAULT_OUTPUT_DIR;
use crate::target::toolchain::ToolchainSpec;
use crate::target::{RuleSet, Target, TargetError, TargetKind, Toolchain};

#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("build description not found: {0}")]
  NotFound(PathBuf),

  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("{path} declares no targets")]
  NoTargets { path: PathBuf },

  #[error(transparent)]
  Target(#[from] TargetError),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Bakefile {
  #[serde(default)]
  toolchain: ToolchainSpec,
  #[serde(default)]
  build: BuildSection,
  #[serde(default, rename = "target")]
  targets: Vec<TargetSpec>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct BuildSection {
  output_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TargetSpec {
  name: String,
  #[serde(default)]
  kind: TargetKind,
  sources: Vec<PathBuf>,
  #[serde(default)]
  cflags: Vec<String>,
  #[serde(default)]
  linkopts: Vec<String>,
  #[serde(default)]
  packages: Vec<String>,
  #[serde(default)]
  deps: Vec<String>,
}

impl TargetSpec {
  fn into_target(self) -> Result<Target, TargetError> {
    Target::builder(self.name)
      .kind(self.kind)
      .sources(self.sources)
      .cflags(self.cflags)
      .linkopts(self.linkopts)
      .packages(self.packages)
      .deps(self.deps)
      .build()
  }
}

/// A loaded build description.
#[derive(Debug, Clone)]
pub struct Project {
  /// Directory containing the Bakefile. Paths in it are relative to this.
  pub root: PathBuf,
  pub toolchain: Toolchain,
  /// Output directory declared in the Bakefile, or the default.
  pub output_dir: PathBuf,
  pub rules: RuleSet,
}

/// Load a Bakefile from disk.
pub fn load(path: &Path) -> Result<Project, ManifestError> {
  let contents = match fs::read_to_string(path) {
    Ok(contents) => contents,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(ManifestError::NotFound(path.to_path_buf())),
    Err(source) => {
      return Err(ManifestError::Read {
        path: path.to_path_buf(),
        source,
      });
    }
  };

  let root = match path.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
    _ => PathBuf::from("."),
  };

  parse(&contents, path, root)
}

/// Parse Bakefile text. `path` is only used in error messages.
pub fn parse(contents: &str, path: &Path, root: PathBuf) -> Result<Project, ManifestError> {
  let bakefile: Bakefile = toml::from_str(contents).map_err(|source| ManifestError::Parse {
    path: path.to_path_buf(),
    source,
  })?;

  if bakefile.targets.is_empty() {
    return Err(ManifestError::NoTargets {
      path: path.to_path_buf(),
    });
  }

  let mut rules = RuleSet::new();
  for spec in bakefile.targets {
    rules.add_target(spec.into_target()?)?;
  }
  rules.check_dependencies()?;

  let toolchain = Toolchain::resolve(&bakefile.toolchain);
  let output_dir = bakefile
    .build
    .output_dir
    .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

  debug!(path = %path.display(), targets = rules.len(), cc = %toolchain.cc, "loaded build description");

  Ok(Project {
    root,
    toolchain,
    output_dir,
    rules,
  })
}
