//! Implementation of `bake --list`.

use anyhow::Result;
use serde::Serialize;

use bake_lib::driver::Options;
use bake_lib::manifest::Project;
use bake_lib::target::TargetKind;

use crate::output::{OutputFormat, print_json, print_stat};

#[derive(Debug, Serialize)]
struct TargetInfo<'a> {
  name: &'a str,
  kind: TargetKind,
  artifact: String,
  sources: usize,
  packages: &'a [String],
  deps: &'a [String],
}

pub fn cmd_list(project: &Project, options: &Options, format: OutputFormat) -> Result<u8> {
  let layout = options.layout();
  let targets: Vec<TargetInfo<'_>> = project
    .rules
    .iter()
    .map(|t| TargetInfo {
      name: t.name(),
      kind: t.kind(),
      artifact: layout.artifact_path(t).display().to_string(),
      sources: t.sources().len(),
      packages: t.packages(),
      deps: t.deps(),
    })
    .collect();

  if format.is_json() {
    print_json(&targets)?;
    return Ok(0);
  }

  for target in &targets {
    println!("{}", target.name);
    let kind = match target.kind {
      TargetKind::Executable => "executable",
      TargetKind::StaticLibrary => "static-library",
    };
    print_stat("kind", kind);
    print_stat("artifact", &target.artifact);
    print_stat("sources", &target.sources.to_string());
    if !target.packages.is_empty() {
      print_stat("packages", &target.packages.join(", "));
    }
    if !target.deps.is_empty() {
      print_stat("deps", &target.deps.join(", "));
    }
  }

  Ok(0)
}
