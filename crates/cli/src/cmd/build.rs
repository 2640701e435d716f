//! Implementation of the default `bake [TARGET...]` command.
//!
//! Builds the requested targets, stopping cleanly on Ctrl-C.

use anyhow::{Context, Result};
use tracing::warn;

use bake_lib::driver::{self, Options};
use bake_lib::flags::{FlagResolver, PkgConfig};
use bake_lib::manifest::Project;

use crate::output::{OutputFormat, print_json, print_report};

/// Build `targets` and print the report. Returns the process exit status.
pub fn cmd_build(project: &Project, options: &Options, targets: &[String], format: OutputFormat) -> Result<u8> {
  let resolver = FlagResolver::new(PkgConfig::new(project.toolchain.pkg_config.clone()).verbose(options.verbose));

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt.block_on(driver::make_until(
    &project.rules,
    &project.toolchain,
    options,
    targets,
    &resolver,
    interrupted(),
  ))?;

  if format.is_json() {
    print_json(&report)?;
  } else {
    print_report(&report);
  }

  Ok(report.exit_code())
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn interrupted() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!(error = %e, "failed to listen for Ctrl-C");
    std::future::pending::<()>().await;
  }
}
