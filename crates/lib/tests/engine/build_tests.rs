//! Incremental build scenarios.

use bake_lib::driver::{self, Options};
use bake_lib::execute::{RuleOutcome, StalenessPolicy};
use bake_lib::flags::FlagResolver;
use bake_lib::target::{RuleSet, Target};

use super::common::{Canned, Workspace};

fn app() -> RuleSet {
  let mut rules = RuleSet::new();
  rules
    .add_target(
      Target::builder("app")
        .sources(["a.c", "b.c"])
        .cflags(["-Wall"])
        .packages(["sdl"])
        .build()
        .unwrap(),
    )
    .unwrap();
  rules
}

fn app_and_tool() -> RuleSet {
  let mut rules = app();
  rules
    .add_target(Target::builder("tool").source("tool.c").build().unwrap())
    .unwrap();
  rules
}

fn outcome(report: &bake_lib::execute::BuildReport, output: &str) -> RuleOutcome {
  report
    .get(output)
    .unwrap_or_else(|| panic!("no rule for {output}"))
    .outcome
    .clone()
}

#[tokio::test]
async fn rebuild_skip_then_partial_rebuild() {
  let ws = Workspace::new();
  ws.source("a.c", "int a;\n");
  ws.source("b.c", "int b;\n");
  let resolver = FlagResolver::new(Canned::sdl());
  let rules = app();

  let first = driver::make(&rules, &ws.toolchain(), &ws.options(), &[], &resolver).await.unwrap();
  assert_eq!(first.rebuilt(), 3, "{first:?}");
  assert_eq!(first.exit_code(), 0);

  let second = driver::make(&rules, &ws.toolchain(), &ws.options(), &[], &resolver).await.unwrap();
  assert_eq!(second.fresh(), 3, "{second:?}");
  assert_eq!(second.exit_code(), 0);

  ws.edit("a.c", "int a = 1;\n");
  let third = driver::make(&rules, &ws.toolchain(), &ws.options(), &[], &resolver).await.unwrap();
  assert_eq!(outcome(&third, "build/obj/a.o"), RuleOutcome::RebuiltOk);
  assert_eq!(outcome(&third, "build/bin/app"), RuleOutcome::RebuiltOk);
  assert_eq!(outcome(&third, "build/obj/b.o"), RuleOutcome::FreshSkipped);
  assert_eq!(third.exit_code(), 0);

  assert_eq!(ws.read("build/bin/app"), b"int a = 1;\nint b;\n");
}

#[tokio::test]
async fn resolved_flags_keep_their_order() {
  let ws = Workspace::new();
  ws.source("a.c", "int a;\n");
  ws.source("b.c", "int b;\n");
  let canned = Canned::sdl();
  let resolver = FlagResolver::new(&canned);

  driver::make(&app(), &ws.toolchain(), &ws.options(), &[], &resolver).await.unwrap();

  let calls = ws.invocations();
  assert!(
    calls
      .iter()
      .any(|c| c == "-Wall -I/usr/include/sdl -D_GNU_SOURCE -c a.c -o build/obj/a.o"),
    "{calls:#?}"
  );
  assert!(
    calls
      .iter()
      .any(|c| c == "build/obj/a.o build/obj/b.o -o build/bin/app -lsdl"),
    "{calls:#?}"
  );
  // One query per mode, memoized.
  assert_eq!(*canned.calls.borrow(), 2);
}

#[tokio::test]
async fn second_run_is_idempotent() {
  let ws = Workspace::new();
  ws.source("a.c", "int a;\n");
  ws.source("b.c", "int b;\n");
  let resolver = FlagResolver::new(Canned::sdl());

  driver::make(&app(), &ws.toolchain(), &ws.options(), &[], &resolver).await.unwrap();
  let artifact = ws.read("build/bin/app");
  let invocations = ws.invocations().len();

  let report = driver::make(&app(), &ws.toolchain(), &ws.options(), &[], &resolver).await.unwrap();

  assert!(report.rules.iter().all(|r| r.outcome == RuleOutcome::FreshSkipped));
  assert_eq!(ws.invocations().len(), invocations);
  assert_eq!(ws.read("build/bin/app"), artifact);

  // A from-scratch rebuild produces the same bytes.
  driver::clean(&ws.options()).unwrap();
  driver::make(&app(), &ws.toolchain(), &ws.options(), &[], &resolver).await.unwrap();
  assert_eq!(ws.read("build/bin/app"), artifact);
}

#[tokio::test]
async fn touching_a_source_leaves_unrelated_targets_fresh() {
  let ws = Workspace::new();
  ws.source("a.c", "int a;\n");
  ws.source("b.c", "int b;\n");
  ws.source("tool.c", "int t;\n");
  let resolver = FlagResolver::new(Canned::sdl());
  let rules = app_and_tool();

  driver::make(&rules, &ws.toolchain(), &ws.options(), &[], &resolver).await.unwrap();

  ws.edit("b.c", "int b = 2;\n");
  let report = driver::make(&rules, &ws.toolchain(), &ws.options(), &[], &resolver).await.unwrap();

  assert_eq!(report.rebuilt(), 2);
  assert_eq!(outcome(&report, "build/obj/b.o"), RuleOutcome::RebuiltOk);
  assert_eq!(outcome(&report, "build/bin/app"), RuleOutcome::RebuiltOk);
  assert_eq!(outcome(&report, "build/obj/tool.o"), RuleOutcome::FreshSkipped);
  assert_eq!(outcome(&report, "build/bin/tool"), RuleOutcome::FreshSkipped);
}

#[tokio::test]
async fn requested_target_builds_only_its_rules() {
  let ws = Workspace::new();
  ws.source("a.c", "int a;\n");
  ws.source("b.c", "int b;\n");
  ws.source("tool.c", "int t;\n");
  let resolver = FlagResolver::new(Canned::sdl());

  let report = driver::make(
    &app_and_tool(),
    &ws.toolchain(),
    &ws.options(),
    &["tool".to_string()],
    &resolver,
  )
  .await
  .unwrap();

  assert_eq!(report.total(), 2);
  assert!(ws.path("build/bin/tool").exists());
  assert!(!ws.path("build/bin/app").exists());
}

#[tokio::test]
async fn changed_flags_trigger_rebuild() {
  let ws = Workspace::new();
  ws.source("main.c", "int m;\n");
  let resolver = FlagResolver::new(Canned::new(vec![]));

  let build = |flag: &'static str| {
    let mut rules = RuleSet::new();
    rules
      .add_target(Target::builder("app").source("main.c").cflags([flag]).build().unwrap())
      .unwrap();
    rules
  };

  driver::make(&build("-O0"), &ws.toolchain(), &ws.options(), &[], &resolver).await.unwrap();
  let report = driver::make(&build("-O2"), &ws.toolchain(), &ws.options(), &[], &resolver).await.unwrap();

  assert_eq!(outcome(&report, "build/obj/main.o"), RuleOutcome::RebuiltOk);
  assert_eq!(outcome(&report, "build/bin/app"), RuleOutcome::RebuiltOk);
}

#[tokio::test]
async fn content_policy_ignores_touch_without_change() {
  let ws = Workspace::new();
  ws.source("a.c", "int a;\n");
  ws.source("b.c", "int b;\n");
  let resolver = FlagResolver::new(Canned::sdl());
  let options = Options {
    policy: StalenessPolicy::Content,
    ..ws.options()
  };

  let first = driver::make(&app(), &ws.toolchain(), &options, &[], &resolver).await.unwrap();
  assert_eq!(first.rebuilt(), 3);

  ws.edit("a.c", "int a;\n");
  let touched = driver::make(&app(), &ws.toolchain(), &options, &[], &resolver).await.unwrap();
  assert_eq!(touched.fresh(), 3, "{touched:?}");

  ws.edit("a.c", "int a = 3;\n");
  let changed = driver::make(&app(), &ws.toolchain(), &options, &[], &resolver).await.unwrap();
  assert_eq!(outcome(&changed, "build/obj/a.o"), RuleOutcome::RebuiltOk);
  assert_eq!(outcome(&changed, "build/obj/b.o"), RuleOutcome::FreshSkipped);
  assert_eq!(outcome(&changed, "build/bin/app"), RuleOutcome::RebuiltOk);
}

#[test]
fn dry_run_reports_without_running() {
  let ws = Workspace::new();
  ws.source("a.c", "int a;\n");
  ws.source("b.c", "int b;\n");
  let resolver = FlagResolver::new(Canned::sdl());

  let planned = driver::plan(&app(), &ws.toolchain(), &ws.options(), &[], &resolver).unwrap();

  assert_eq!(planned.len(), 3);
  assert!(planned.iter().all(|p| p.would_run()));
  assert!(ws.invocations().is_empty());
  assert!(!ws.path("build").exists());
}
