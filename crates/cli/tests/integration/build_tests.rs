//! Builds driven end to end through the `bake` binary.

use std::fs;

use predicates::prelude::*;

use crate::common::{APP, APP_AND_TOOL, TestEnv};

fn app_env() -> TestEnv {
  let env = TestEnv::with_targets(APP);
  env.write_source("a.c", "int a;\n");
  env.write_source("b.c", "int b;\n");
  env
}

#[test]
fn build_then_everything_is_fresh() {
  let env = app_env();

  env
    .bake_cmd()
    .assert()
    .success()
    .stdout(predicate::str::contains("compile a.c"))
    .stdout(predicate::str::contains("Build complete"));

  assert_eq!(fs::read_to_string(env.path("build/bin/app")).unwrap(), "int a;\nint b;\n");

  env
    .bake_cmd()
    .assert()
    .success()
    .stdout(predicate::str::contains("(fresh)"))
    .stdout(predicate::str::contains("Rebuilt"));
}

#[test]
fn edited_source_rebuilds_its_object_and_the_link() {
  let env = app_env();
  env.bake_cmd().assert().success();

  env.edit_source("a.c", "int a2;\n");

  env
    .bake_cmd()
    .args(["--format", "json"])
    .assert()
    .success()
    .stdout(predicate::function(|out: &str| {
      let report: serde_json::Value = serde_json::from_str(out).unwrap();
      let status = |output: &str| {
        report["rules"]
          .as_array()
          .unwrap()
          .iter()
          .find(|r| r["output"] == output)
          .map(|r| r["outcome"]["status"].as_str().unwrap().to_string())
      };
      status("build/obj/a.o").as_deref() == Some("rebuilt-ok")
        && status("build/obj/b.o").as_deref() == Some("fresh-skipped")
        && status("build/bin/app").as_deref() == Some("rebuilt-ok")
    }));

  assert_eq!(fs::read_to_string(env.path("build/bin/app")).unwrap(), "int a2;\nint b;\n");
}

#[test]
fn verbose_echoes_command_lines() {
  let env = app_env();

  env
    .bake_cmd()
    .arg("--verbose")
    .assert()
    .success()
    .stdout(predicate::str::contains("-c a.c -o build/obj/a.o"))
    .stdout(predicate::str::contains("pkg-config --cflags sdl"))
    .stdout(predicate::str::contains("pkg-config --libs sdl"))
    .stdout(predicate::str::contains("-lsdl"));
}

#[test]
fn requested_target_builds_alone() {
  let env = TestEnv::with_targets(APP_AND_TOOL);
  env.write_source("a.c", "int a;\n");
  env.write_source("b.c", "int b;\n");
  env.write_source("tool.c", "int t;\n");

  env.bake_cmd().arg("tool").assert().success();

  assert!(env.path("build/bin/tool").exists());
  assert!(!env.path("build/bin/app").exists());
}

#[test]
fn output_dir_override() {
  let env = app_env();

  env.bake_cmd().args(["--output-dir", "out", "--jobs", "1"]).assert().success();

  assert!(env.path("out/bin/app").exists());
  assert!(!env.path("build").exists());
}

#[test]
fn bakefile_in_subdirectory() {
  let env = TestEnv::new();
  env.write_bakefile("sub/Bakefile.toml", APP);
  env.write_source("sub/a.c", "int a;\n");
  env.write_source("sub/b.c", "int b;\n");

  env.bake_cmd().args(["-f", "sub/Bakefile.toml"]).assert().success();

  assert!(env.path("sub/build/bin/app").exists());
}

#[test]
fn content_policy_ignores_touched_sources() {
  let env = app_env();
  env.bake_cmd().args(["--policy", "content"]).assert().success();

  env.edit_source("a.c", "int a;\n");

  env
    .bake_cmd()
    .args(["--policy", "content", "--format", "json"])
    .assert()
    .success()
    .stdout(predicate::function(|out: &str| {
      let report: serde_json::Value = serde_json::from_str(out).unwrap();
      report["rules"]
        .as_array()
        .unwrap()
        .iter()
        .all(|r| r["outcome"]["status"] == "fresh-skipped")
    }));
}

#[test]
fn warnings_from_successful_compiles_are_shown() {
  let env = TestEnv::with_targets(APP);
  env.write_source("a.c", "#warning careful\n");
  env.write_source("b.c", "int b;\n");

  env
    .bake_cmd()
    .assert()
    .success()
    .stderr(predicate::str::contains("a.c:1: warning: noted"))
    .stdout(predicate::str::contains("Build complete"));
}
