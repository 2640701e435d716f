//! Dependency graph over rules.
//!
//! This module builds a directed acyclic graph from a flat list of rules and
//! answers the queries the scheduler needs: dependency order, the subgraph
//! needed for a set of requested targets, and direct neighbours.
//!
//! Edges are structural: rule `u` feeds rule `v` when `u`'s output is one of
//! `v`'s inputs. Callers never declare edges by hand.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;
use tracing::debug;

use crate::target::{Rule, RuleKind};

/// Structural errors found while building or querying the graph.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
  /// Two different rules claim the same output.
  #[error("output {output} is produced by two different rules (targets {first} and {second})")]
  DuplicateOutput {
    output: PathBuf,
    first: String,
    second: String,
  },

  /// The rules form a cycle; `chain` starts and ends with the same output.
  #[error("dependency cycle detected: {}", render_chain(.chain))]
  Cycle { chain: Vec<PathBuf> },

  /// A requested target has no rules.
  #[error("unknown target: {0}")]
  UnknownTarget(String),
}

fn render_chain(chain: &[PathBuf]) -> String {
  chain
    .iter()
    .map(|p| p.display().to_string())
    .collect::<Vec<_>>()
    .join(" -> ")
}

/// A DAG of rules.
pub struct BuildGraph {
  /// The underlying graph; edges point from dependency to dependent.
  graph: DiGraph<Rule, ()>,

  /// Map from output path to node index.
  outputs: HashMap<PathBuf, NodeIndex>,

  /// Target name to the rules derived for it.
  targets: HashMap<String, Vec<NodeIndex>>,
}

impl BuildGraph {
  /// Build a graph from rules.
  ///
  /// # Errors
  ///
  /// - `DuplicateOutput` if two non-identical rules produce the same path.
  ///   Identical rules (e.g. a shared source compiled the same way by two
  ///   targets) are merged.
  /// - `Cycle` if the rules depend on each other circularly.
  pub fn from_rules(rules: Vec<Rule>) -> Result<Self, GraphError> {
    let mut graph = DiGraph::new();
    let mut outputs: HashMap<PathBuf, NodeIndex> = HashMap::new();
    let mut targets: HashMap<String, Vec<NodeIndex>> = HashMap::new();

    // First pass: one node per distinct output
    for rule in rules {
      if let Some(&existing) = outputs.get(&rule.output) {
        let first: &Rule = &graph[existing];
        if same_work(first, &rule) {
          debug!(output = %rule.output.display(), target = %rule.target, "sharing identical rule");
          targets.entry(rule.target.clone()).or_default().push(existing);
          continue;
        }
        return Err(GraphError::DuplicateOutput {
          output: rule.output.clone(),
          first: first.target.clone(),
          second: rule.target,
        });
      }

      let target = rule.target.clone();
      let output = rule.output.clone();
      let idx = graph.add_node(rule);
      outputs.insert(output, idx);
      targets.entry(target).or_default().push(idx);
    }

    // Second pass: edges from producers to consumers
    let mut edges = Vec::new();
    for idx in graph.node_indices() {
      for input in &graph[idx].inputs {
        if let Some(&producer) = outputs.get(input) {
          edges.push((producer, idx));
        }
      }
    }
    for (from, to) in edges {
      graph.update_edge(from, to, ());
    }

    let dag = Self {
      graph,
      outputs,
      targets,
    };

    dag.verify_acyclic()?;

    Ok(dag)
  }

  /// Verify that the graph is acyclic, reporting the full cycle if not.
  ///
  /// Iterative DFS with three colours, so deep graphs cannot overflow the stack.
  fn verify_acyclic(&self) -> Result<(), GraphError> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Color {
      White,
      Gray,
      Black,
    }

    let mut color = vec![Color::White; self.graph.node_count()];

    for start in self.graph.node_indices() {
      if color[start.index()] != Color::White {
        continue;
      }

      // Each frame is a node and its remaining dependents to visit.
      let mut stack: Vec<(NodeIndex, Vec<NodeIndex>)> = vec![(start, self.dependents(start))];
      color[start.index()] = Color::Gray;

      while let Some((node, pending)) = stack.last_mut() {
        let node = *node;
        match pending.pop() {
          Some(next) => match color[next.index()] {
            Color::White => {
              color[next.index()] = Color::Gray;
              stack.push((next, self.dependents(next)));
            }
            Color::Gray => {
              let from = stack.iter().position(|(n, _)| *n == next).unwrap_or(0);
              let mut chain: Vec<PathBuf> = stack[from..]
                .iter()
                .map(|(n, _)| self.graph[*n].output.clone())
                .collect();
              chain.push(self.graph[next].output.clone());
              return Err(GraphError::Cycle { chain });
            }
            Color::Black => {}
          },
          None => {
            color[node.index()] = Color::Black;
            stack.pop();
          }
        }
      }
    }

    Ok(())
  }

  pub fn rule(&self, idx: NodeIndex) -> &Rule {
    &self.graph[idx]
  }

  pub fn node_for_output(&self, output: &std::path::Path) -> Option<NodeIndex> {
    self.outputs.get(output).copied()
  }

  pub fn rules(&self) -> impl Iterator<Item = &Rule> {
    self.graph.node_weights()
  }

  /// Rules whose outputs `idx` consumes.
  pub fn dependencies(&self, idx: NodeIndex) -> Vec<NodeIndex> {
    self.graph.neighbors_directed(idx, Direction::Incoming).collect()
  }

  /// Rules that consume `idx`'s output.
  pub fn dependents(&self, idx: NodeIndex) -> Vec<NodeIndex> {
    self.graph.neighbors_directed(idx, Direction::Outgoing).collect()
  }

  pub fn rule_count(&self) -> usize {
    self.graph.node_count()
  }

  pub fn compile_count(&self) -> usize {
    self.rules().filter(|r| r.kind == RuleKind::Compile).count()
  }

  pub fn link_count(&self) -> usize {
    self
      .rules()
      .filter(|r| matches!(r.kind, RuleKind::Link | RuleKind::Archive))
      .count()
  }

  /// Target names in sorted order.
  pub fn target_names(&self) -> Vec<&str> {
    let names: BTreeSet<&str> = self.targets.keys().map(String::as_str).collect();
    names.into_iter().collect()
  }

  /// The rules needed to build `requested`: their own rules plus every
  /// transitive dependency. An empty request selects everything.
  pub fn select<S: AsRef<str>>(&self, requested: &[S]) -> Result<HashSet<NodeIndex>, GraphError> {
    if requested.is_empty() {
      return Ok(self.graph.node_indices().collect());
    }

    let mut selected = HashSet::new();
    let mut stack = Vec::new();

    for name in requested {
      let name = name.as_ref();
      let seeds = self
        .targets
        .get(name)
        .ok_or_else(|| GraphError::UnknownTarget(name.to_string()))?;
      stack.extend(seeds.iter().copied());
    }

    while let Some(idx) = stack.pop() {
      if selected.insert(idx) {
        stack.extend(self.dependencies(idx));
      }
    }

    Ok(selected)
  }

  /// Selected nodes in an order where dependencies come before dependents.
  pub fn topological(&self, selection: &HashSet<NodeIndex>) -> Vec<NodeIndex> {
    // from_rules already rejected cycles
    let sorted = toposort(&self.graph, None).unwrap_or_default();
    sorted.into_iter().filter(|idx| selection.contains(idx)).collect()
  }
}

fn same_work(a: &Rule, b: &Rule) -> bool {
  a.output == b.output && a.inputs == b.inputs && a.program == b.program && a.args == b.args && a.kind == b.kind
}
