//! Implementation of `bake --dry-run`.
//!
//! Shows which rules would run and why, without running anything.

use anyhow::Result;

use bake_lib::driver::{self, Options};
use bake_lib::flags::{FlagResolver, PkgConfig};
use bake_lib::manifest::Project;

use crate::output::{OutputFormat, print_json, print_plan};

pub fn cmd_plan(project: &Project, options: &Options, targets: &[String], format: OutputFormat) -> Result<u8> {
  let resolver = FlagResolver::new(PkgConfig::new(project.toolchain.pkg_config.clone()).verbose(options.verbose));

  let planned = driver::plan(&project.rules, &project.toolchain, options, targets, &resolver)?;

  if format.is_json() {
    print_json(&planned)?;
  } else {
    print_plan(&planned, options.verbose);
  }

  Ok(0)
}
