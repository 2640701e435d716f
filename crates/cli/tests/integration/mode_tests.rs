//! `--dry-run`, `--clean` and `--list`.

use predicates::prelude::*;

use crate::common::{APP, APP_AND_TOOL, TestEnv};

#[test]
fn dry_run_reports_without_building() {
  let env = TestEnv::with_targets(APP);
  env.write_source("a.c", "int a;\n");
  env.write_source("b.c", "int b;\n");

  env
    .bake_cmd()
    .arg("--dry-run")
    .assert()
    .success()
    .stdout(predicate::str::contains("3 of 3 rules would run"));

  assert!(!env.path("build").exists());
}

#[test]
fn dry_run_after_build_has_nothing_to_do() {
  let env = TestEnv::with_targets(APP);
  env.write_source("a.c", "int a;\n");
  env.write_source("b.c", "int b;\n");
  env.bake_cmd().assert().success();

  env
    .bake_cmd()
    .arg("-n")
    .assert()
    .success()
    .stdout(predicate::str::contains("0 of 3 rules would run"));
}

#[test]
fn clean_removes_outputs() {
  let env = TestEnv::with_targets(APP);
  env.write_source("a.c", "int a;\n");
  env.write_source("b.c", "int b;\n");
  env.bake_cmd().assert().success();
  assert!(env.path("build").exists());

  env
    .bake_cmd()
    .arg("--clean")
    .assert()
    .success()
    .stdout(predicate::str::contains("Removed"));
  assert!(!env.path("build").exists());

  env
    .bake_cmd()
    .arg("--clean")
    .assert()
    .success()
    .stdout(predicate::str::contains("Nothing to clean"));
}

#[test]
fn list_shows_targets() {
  let env = TestEnv::with_targets(APP_AND_TOOL);

  env
    .bake_cmd()
    .arg("--list")
    .assert()
    .success()
    .stdout(predicate::str::contains("app"))
    .stdout(predicate::str::contains("tool"))
    .stdout(predicate::str::contains("sdl"));
}

#[test]
fn list_as_json() {
  let env = TestEnv::with_targets(APP_AND_TOOL);

  env
    .bake_cmd()
    .args(["--list", "--format", "json"])
    .assert()
    .success()
    .stdout(predicate::function(|out: &str| {
      let targets: serde_json::Value = serde_json::from_str(out).unwrap();
      targets.as_array().map(|t| t.len()) == Some(2) && targets[0]["artifact"] == "build/bin/app"
    }));
}

#[test]
fn clean_refuses_to_remove_the_project() {
  let env = TestEnv::with_targets(APP);
  env.write_source("a.c", "int a;\n");

  env
    .bake_cmd()
    .args(["--clean", "--output-dir", "."])
    .assert()
    .code(2)
    .stderr(predicate::str::contains("contains the project root"));
  assert!(env.path("a.c").exists());

  env.bake_cmd().args(["--clean", "--output-dir", ".."]).assert().code(2);
  assert!(env.path("a.c").exists());
}

#[test]
fn bakefile_output_dir_at_the_root_is_rejected() {
  let env = TestEnv::new();
  env.write_bakefile("Bakefile.toml", &format!("[build]\noutput-dir = \".\"\n{APP}"));
  env.write_source("a.c", "int a;\n");

  env.bake_cmd().arg("--clean").assert().code(2);
  assert!(env.path("a.c").exists());
  assert!(env.path("Bakefile.toml").exists());
}
