//! Exit codes for failing builds and bad build descriptions.

use predicates::prelude::*;

use crate::common::{APP, APP_AND_TOOL, TestEnv};

#[test]
fn failing_compile_exits_1_and_blocks_the_link() {
  let env = TestEnv::with_targets(APP_AND_TOOL);
  env.write_source("a.c", "#error nope\n");
  env.write_source("b.c", "int b;\n");
  env.write_source("tool.c", "int t;\n");

  env
    .bake_cmd()
    .assert()
    .code(1)
    .stdout(predicate::str::contains("(failed)"))
    .stdout(predicate::str::contains("(blocked"))
    .stdout(predicate::str::contains("Build failed"))
    .stderr(predicate::str::contains("forced failure"));

  // Independent work still completes.
  assert!(env.path("build/obj/b.o").exists());
  assert!(env.path("build/bin/tool").exists());
  assert!(!env.path("build/bin/app").exists());
}

#[test]
fn fixing_the_source_recovers() {
  let env = TestEnv::with_targets(APP);
  env.write_source("a.c", "#error nope\n");
  env.write_source("b.c", "int b;\n");
  env.bake_cmd().assert().code(1);

  env.edit_source("a.c", "int a;\n");

  env.bake_cmd().assert().success();
  assert!(env.path("build/bin/app").exists());
}

#[test]
fn unknown_target_exits_2() {
  let env = TestEnv::with_targets(APP);
  env.write_source("a.c", "int a;\n");
  env.write_source("b.c", "int b;\n");

  env
    .bake_cmd()
    .arg("nope")
    .assert()
    .code(2)
    .stderr(predicate::str::contains("nope"));

  assert!(!env.path("build").exists());
}

#[test]
fn unresolvable_package_exits_2() {
  let env = TestEnv::with_targets(
    r#"
[[target]]
name = "app"
sources = ["a.c"]
packages = ["gtk9"]
"#,
  );
  env.write_source("a.c", "int a;\n");

  env
    .bake_cmd()
    .assert()
    .code(2)
    .stderr(predicate::str::contains("gtk9"));
  assert!(!env.path("build").exists());

  env.bake_cmd().arg("--optional-packages").assert().success();
  assert!(env.path("build/bin/app").exists());
}

#[test]
fn library_cycle_exits_2() {
  let env = TestEnv::with_targets(
    r#"
[[target]]
name = "x"
kind = "static-library"
sources = ["x.c"]
deps = ["y"]

[[target]]
name = "y"
kind = "static-library"
sources = ["y.c"]
deps = ["x"]
"#,
  );
  env.write_source("x.c", "int x;\n");
  env.write_source("y.c", "int y;\n");

  env
    .bake_cmd()
    .assert()
    .code(2)
    .stderr(predicate::str::contains("cycle"));
  assert!(!env.path("build").exists());
}

#[test]
fn zero_jobs_exits_2() {
  let env = TestEnv::with_targets(APP);

  env
    .bake_cmd()
    .args(["--jobs", "0"])
    .assert()
    .code(2)
    .stderr(predicate::str::contains("jobs"));
}
