//! Compiler/linker flag resolution through an external query tool.
//!
//! The query tool (normally `pkg-config`) is invoked as
//! `<tool> <mode-flags...> <library-names...>` and prints a single line of
//! shell-quoted tokens. [`FlagQuery`] is the only place a process is spawned,
//! so everything above it can be tested with a canned implementation.

mod pkg_config;

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub use pkg_config::PkgConfig;

/// Errors raised while querying for flags.
#[derive(Debug, Error)]
pub enum ResolveError {
  /// The query tool could not be found on `PATH`.
  #[error("flag query tool not found: {program}")]
  NotFound { program: String },

  /// The query tool could not be started for another reason.
  #[error("failed to run {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  /// The query tool exited unsuccessfully (e.g. unknown library).
  #[error("`{command}` failed with exit code {code:?}: {stderr}")]
  Failed {
    command: String,
    code: Option<i32>,
    stderr: String,
  },

  /// The query output could not be split into tokens.
  #[error("could not split output of `{command}` into flags: {output}")]
  Malformed { command: String, output: String },
}

/// What to do when a target's package flags cannot be resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolvePolicy {
  /// Fail the invocation before anything is built.
  #[default]
  Abort,
  /// Log a warning and continue with no flags for that package set.
  Empty,
}

/// Adapter around one invocation of the external query tool.
pub trait FlagQuery {
  /// Human readable name of the tool, used in diagnostics.
  fn program(&self) -> &str;

  /// Run the tool with `args` and return its standard output.
  fn query(&self, args: &[String]) -> Result<String, ResolveError>;
}

impl<Q: FlagQuery + ?Sized> FlagQuery for &Q {
  fn program(&self) -> &str {
    (**self).program()
  }

  fn query(&self, args: &[String]) -> Result<String, ResolveError> {
    (**self).query(args)
  }
}

/// Resolves and memoizes flag token lists.
pub struct FlagResolver<Q> {
  query: Q,
  cache: Mutex<HashMap<Vec<String>, Vec<String>>>,
}

impl<Q: FlagQuery> FlagResolver<Q> {
  pub fn new(query: Q) -> Self {
    Self {
      query,
      cache: Mutex::new(HashMap::new()),
    }
  }

  /// Resolve flags for `libraries` in the given query `modes`.
  ///
  /// Token order is exactly the order the tool printed them in.
  pub fn resolve<M, L>(&self, modes: &[M], libraries: &[L]) -> Result<Vec<String>, ResolveError>
  where
    M: AsRef<str>,
    L: AsRef<str>,
  {
    let args: Vec<String> = modes
      .iter()
      .map(|m| m.as_ref().to_string())
      .chain(libraries.iter().map(|l| l.as_ref().to_string()))
      .collect();

    if let Some(hit) = self.cache.lock().ok().and_then(|c| c.get(&args).cloned()) {
      return Ok(hit);
    }

    let output = self.query.query(&args)?;
    let tokens = split_tokens(&output).ok_or_else(|| ResolveError::Malformed {
      command: render_command(self.query.program(), &args),
      output: output.clone(),
    })?;

    debug!(program = %self.query.program(), args = ?args, tokens = ?tokens, "resolved flags");

    if let Ok(mut cache) = self.cache.lock() {
      cache.insert(args, tokens.clone());
    }

    Ok(tokens)
  }

  /// `--cflags` for the given libraries.
  pub fn cflags<L: AsRef<str>>(&self, libraries: &[L]) -> Result<Vec<String>, ResolveError> {
    self.resolve(&["--cflags"], libraries)
  }

  /// `--libs` for the given libraries.
  pub fn libs<L: AsRef<str>>(&self, libraries: &[L]) -> Result<Vec<String>, ResolveError> {
    self.resolve(&["--libs"], libraries)
  }

  /// Resolve under a policy: with [`ResolvePolicy::Empty`] a failure yields no flags.
  pub fn resolve_with<M, L>(
    &self,
    policy: ResolvePolicy,
    modes: &[M],
    libraries: &[L],
  ) -> Result<Vec<String>, ResolveError>
  where
    M: AsRef<str>,
    L: AsRef<str>,
  {
    match (self.resolve(modes, libraries), policy) {
      (Ok(tokens), _) => Ok(tokens),
      (Err(e), ResolvePolicy::Empty) => {
        warn!(error = %e, "flag resolution failed, continuing without flags");
        Ok(Vec::new())
      }
      (Err(e), ResolvePolicy::Abort) => Err(e),
    }
  }
}

/// Split query output into tokens using POSIX shell quoting rules.
///
/// Returns `None` for unbalanced quotes.
pub fn split_tokens(output: &str) -> Option<Vec<String>> {
  shlex::split(output.trim())
}

pub(crate) fn render_command(program: &str, args: &[String]) -> String {
  std::iter::once(program)
    .chain(args.iter().map(String::as_str))
    .collect::<Vec<_>>()
    .join(" ")
}
