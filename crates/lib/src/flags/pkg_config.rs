//! The real query adapter: spawns `pkg-config` (or a compatible tool).

use std::io;
use std::process::Command;

use tracing::debug;

use super::{FlagQuery, ResolveError, render_command};

/// Spawns the pkg-config compatible tool named by `program`.
///
/// This runs during configuration, before the async scheduler starts, so it
/// uses a blocking process call.
#[derive(Debug, Clone)]
pub struct PkgConfig {
  program: String,
  echo: bool,
}

impl PkgConfig {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
      echo: false,
    }
  }

  /// Print each query's command line to stdout before running it.
  pub fn verbose(mut self, echo: bool) -> Self {
    self.echo = echo;
    self
  }
}

impl Default for PkgConfig {
  fn default() -> Self {
    Self::new(std::env::var("PKG_CONFIG").unwrap_or_else(|_| "pkg-config".to_string()))
  }
}

impl FlagQuery for PkgConfig {
  fn program(&self) -> &str {
    &self.program
  }

  fn query(&self, args: &[String]) -> Result<String, ResolveError> {
    debug!(program = %self.program, args = ?args, "querying flags");
    if self.echo {
      println!("{}", render_command(&self.program, args));
    }

    let output = Command::new(&self.program).args(args).output().map_err(|e| {
      if e.kind() == io::ErrorKind::NotFound {
        ResolveError::NotFound {
          program: self.program.clone(),
        }
      } else {
        ResolveError::Spawn {
          program: self.program.clone(),
          source: e,
        }
      }
    })?;

    if !output.status.success() {
      return Err(ResolveError::Failed {
        command: render_command(&self.program, args),
        code: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
  }
}
