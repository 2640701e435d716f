//! Graph shape properties.

use std::collections::BTreeMap;
use std::path::PathBuf;

use bake_lib::execute::{BuildGraph, GraphError};
use bake_lib::target::{Layout, PackageFlags, Rule, RuleKind, RuleSet, Target, Toolchain};

fn toolchain() -> Toolchain {
  Toolchain {
    cc: "cc".to_string(),
    cxx: "c++".to_string(),
    ar: "ar".to_string(),
    pkg_config: "pkg-config".to_string(),
    depfiles: false,
  }
}

#[test]
fn n_sources_give_n_compiles_feeding_one_link() {
  for n in [1usize, 2, 7, 32] {
    let sources: Vec<String> = (0..n).map(|i| format!("src/file{i}.c")).collect();
    let mut rules = RuleSet::new();
    rules
      .add_target(Target::builder("app").sources(sources).build().unwrap())
      .unwrap();

    let derived = rules
      .derive(&Layout::new("build"), &toolchain(), &BTreeMap::<String, PackageFlags>::new())
      .unwrap();
    let graph = BuildGraph::from_rules(derived).unwrap();

    assert_eq!(graph.compile_count(), n);
    assert_eq!(graph.link_count(), 1);

    let link = graph.node_for_output(&PathBuf::from("build/bin/app")).unwrap();
    let deps = graph.dependencies(link);
    assert_eq!(deps.len(), n);
    assert!(deps.iter().all(|d| graph.rule(*d).kind == RuleKind::Compile));
  }
}

#[test]
fn object_paths_mirror_sources() {
  let mut rules = RuleSet::new();
  rules
    .add_target(Target::builder("app").sources(["src/a.c", "lib/a.c"]).build().unwrap())
    .unwrap();

  let derived = rules
    .derive(&Layout::new("out"), &toolchain(), &BTreeMap::new())
    .unwrap();
  let outputs: Vec<PathBuf> = derived.iter().map(|r| r.output.clone()).collect();

  assert!(outputs.contains(&PathBuf::from("out/obj/src/a.o")));
  assert!(outputs.contains(&PathBuf::from("out/obj/lib/a.o")));
  assert!(BuildGraph::from_rules(derived).is_ok());
}

#[test]
fn synthetic_cycle_names_every_rule() {
  let names = ["gen", "parse", "emit", "bundle"];
  let mut rules = Vec::new();
  for (i, name) in names.iter().enumerate() {
    let prev = names[(i + names.len() - 1) % names.len()];
    rules.push(Rule::new("cyc", *name, vec![PathBuf::from(prev)], "true", vec![]));
  }

  let err = BuildGraph::from_rules(rules).err().unwrap();
  let GraphError::Cycle { chain } = &err else {
    panic!("expected cycle, got {err:?}");
  };

  assert_eq!(chain.len(), names.len() + 1);
  for name in names {
    assert!(chain.contains(&PathBuf::from(name)), "{name} missing from {err}");
  }
}
