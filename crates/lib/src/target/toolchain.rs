//! External tools used to compile, link and archive.

use serde::{Deserialize, Serialize};

/// The compiler, archiver and flag query tool for a build.
///
/// Every field is optional in the Bakefile; unset fields fall back to the
/// conventional environment variable and then to a default name on `PATH`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Toolchain {
  pub cc: String,
  pub cxx: String,
  pub ar: String,
  pub pkg_config: String,
  /// Ask the compiler for make-style dependency files (`-MMD -MF`).
  pub depfiles: bool,
}

/// Toolchain overrides as written in a Bakefile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ToolchainSpec {
  pub cc: Option<String>,
  pub cxx: Option<String>,
  pub ar: Option<String>,
  pub pkg_config: Option<String>,
  pub depfiles: Option<bool>,
}

impl Toolchain {
  /// Resolve a toolchain: explicit value, then environment, then default.
  pub fn resolve(spec: &ToolchainSpec) -> Self {
    Self {
      cc: pick(&spec.cc, "CC", "cc"),
      cxx: pick(&spec.cxx, "CXX", "c++"),
      ar: pick(&spec.ar, "AR", "ar"),
      pkg_config: pick(&spec.pkg_config, "PKG_CONFIG", "pkg-config"),
      depfiles: spec.depfiles.unwrap_or(true),
    }
  }
}

impl Default for Toolchain {
  fn default() -> Self {
    Self::resolve(&ToolchainSpec::default())
  }
}

fn pick(explicit: &Option<String>, var: &str, fallback: &str) -> String {
  if let Some(value) = explicit {
    return value.clone();
  }
  match std::env::var(var) {
    Ok(value) if !value.trim().is_empty() => value,
    _ => fallback.to_string(),
  }
}
