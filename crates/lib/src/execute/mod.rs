//! Rule execution.
//!
//! This module runs a [`BuildGraph`]:
//! - selecting the rules needed for the requested targets
//! - skipping rules whose outputs are fresh
//! - running stale rules in parallel, bounded by `jobs`
//! - blocking everything downstream of a failure while independent work finishes
//! - cancelling cleanly when asked to stop
//!
//! Readiness bookkeeping lives in a single loop that owns all state. Workers
//! are tokio tasks that hand their result back through the join handle.

pub mod actions;
pub mod dag;
pub mod depfile;
pub mod signature;
pub mod stale;
pub mod types;

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use petgraph::graph::NodeIndex;
use serde::Serialize;
use tokio::task::{self, JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::target::RuleKind;

use actions::{ToolOutput, run_tool};
use signature::{Signature, SignatureStore};
use stale::{DiskView, FileSystemView, StaleReason, Staleness};

pub use dag::{BuildGraph, GraphError};
pub use stale::StalenessPolicy;
pub use types::{BuildReport, ExecuteConfig, ExecuteError, RuleFailure, RuleOutcome, RuleReport, default_jobs};

type Job = (NodeIndex, Result<ToolOutput, ExecuteError>);

/// Run every rule needed for `requested` (all rules if empty).
pub async fn run<S: AsRef<str>>(
  graph: &BuildGraph,
  requested: &[S],
  config: &ExecuteConfig,
) -> Result<BuildReport, ExecuteError> {
  run_until(graph, requested, config, std::future::pending()).await
}

/// Like [`run`], but stops when `shutdown` resolves.
///
/// Running tools are killed and their outputs deleted. Rules that were
/// running or still pending end [`RuleOutcome::Cancelled`].
///
/// # Errors
///
/// Returns an error only for problems found before any tool runs (e.g. an
/// unknown target). Rule failures are reported in the [`BuildReport`].
pub async fn run_until<S, F>(
  graph: &BuildGraph,
  requested: &[S],
  config: &ExecuteConfig,
  shutdown: F,
) -> Result<BuildReport, ExecuteError>
where
  S: AsRef<str>,
  F: Future<Output = ()>,
{
  let started = Instant::now();
  let selected = graph.select(requested)?;
  let order = graph.topological(&selected);
  let jobs = config.jobs.max(1);

  info!(rules = order.len(), jobs, policy = %config.policy, "starting build");

  let mut scheduler = Scheduler::new(graph, config, selected, &order);
  let mut tasks: JoinSet<Job> = JoinSet::new();
  let mut interrupted = false;

  tokio::pin!(shutdown);

  loop {
    scheduler.dispatch(&mut tasks, jobs).await;

    if tasks.is_empty() {
      break;
    }

    tokio::select! {
      joined = tasks.join_next_with_id() => {
        let Some(joined) = joined else { break };
        scheduler.finish(joined).await;
      }
      _ = &mut shutdown => {
        interrupted = true;
        break;
      }
    }
  }

  if interrupted {
    warn!(running = tasks.len(), "build interrupted, cancelling");
    tasks.abort_all();
    while let Some(joined) = tasks.join_next_with_id().await {
      scheduler.finish(joined).await;
    }
  }

  let report = scheduler.into_report(&order, interrupted, started);

  info!(
    fresh = report.fresh(),
    rebuilt = report.rebuilt(),
    failed = report.failed(),
    blocked = report.blocked(),
    cancelled = report.cancelled(),
    elapsed_ms = report.elapsed.as_millis() as u64,
    "build complete"
  );

  Ok(report)
}

/// Bookkeeping for one run. Only the run loop touches it.
struct Scheduler<'a> {
  graph: &'a BuildGraph,
  config: &'a ExecuteConfig,
  view: DiskView,
  selected: HashSet<NodeIndex>,
  /// Unfinished dependencies per pending rule.
  remaining: HashMap<NodeIndex, usize>,
  ready: VecDeque<NodeIndex>,
  outcomes: HashMap<NodeIndex, RuleOutcome>,
  running: HashMap<task::Id, NodeIndex>,
  /// Non-empty output of tools that succeeded.
  printed: HashMap<NodeIndex, ToolOutput>,
  signatures: Option<SignatureStore>,
}

impl<'a> Scheduler<'a> {
  fn new(graph: &'a BuildGraph, config: &'a ExecuteConfig, selected: HashSet<NodeIndex>, order: &[NodeIndex]) -> Self {
    let mut remaining = HashMap::with_capacity(order.len());
    let mut ready = VecDeque::new();

    for &idx in order {
      let deps = graph.dependencies(idx).into_iter().filter(|d| selected.contains(d)).count();
      if deps == 0 {
        ready.push_back(idx);
      }
      remaining.insert(idx, deps);
    }

    let signatures = config
      .signatures
      .as_ref()
      .map(|path| SignatureStore::open(config.root.join(path)));

    Self {
      graph,
      config,
      view: DiskView::new(&config.root),
      selected,
      remaining,
      ready,
      outcomes: HashMap::new(),
      running: HashMap::new(),
      printed: HashMap::new(),
      signatures,
    }
  }

  /// Start ready rules until `jobs` are running or nothing is ready.
  ///
  /// Fresh rules are settled on the spot, which may make more rules ready.
  async fn dispatch(&mut self, tasks: &mut JoinSet<Job>, jobs: usize) {
    while tasks.len() < jobs {
      let Some(idx) = self.ready.pop_front() else {
        break;
      };
      if self.outcomes.contains_key(&idx) {
        continue;
      }

      let rule = self.graph.rule(idx);
      let dependency_rebuilt = self
        .graph
        .dependencies(idx)
        .iter()
        .any(|d| self.outcomes.get(d) == Some(&RuleOutcome::RebuiltOk));
      let previous = self.signatures.as_ref().and_then(|s| s.get(&rule.output));

      match stale::check(rule, &self.view, previous, self.config.policy, dependency_rebuilt) {
        Staleness::Fresh => {
          debug!(output = %rule.output.display(), "fresh");
          if previous.is_none() {
            self.record_signature(idx);
          }
          self.settle(idx, RuleOutcome::FreshSkipped);
        }
        Staleness::Stale(reason) => {
          debug!(output = %rule.output.display(), reason = %reason, "stale");

          if let Err(e) = self.prepare_output(&rule.output).await {
            error!(output = %rule.output.display(), error = %e, "failed to prepare output");
            self.settle(idx, RuleOutcome::Failed(RuleFailure::from(&e)));
            continue;
          }

          if self.config.verbose {
            println!("{}", rule.command_line());
          }
          info!(rule = %rule.description(), "running");

          let program = rule.program.clone();
          let args = rule.args.clone();
          let cwd = self.config.root.clone();
          let handle = tasks.spawn(async move { (idx, run_tool(&program, &args, &cwd).await) });
          self.running.insert(handle.id(), idx);
        }
      }
    }
  }

  /// Handle a task that ended, whether it finished, panicked or was aborted.
  async fn finish(&mut self, joined: Result<(task::Id, Job), JoinError>) {
    let (idx, result) = match joined {
      Ok((id, (idx, result))) => {
        self.running.remove(&id);
        (idx, result)
      }
      Err(join_err) => {
        let Some(idx) = self.running.remove(&join_err.id()) else {
          error!(error = %join_err, "lost track of a finished task");
          return;
        };
        let output = self.graph.rule(idx).output.clone();
        self.discard_output(&output).await;
        if join_err.is_cancelled() {
          debug!(output = %output.display(), "cancelled");
          self.settle(idx, RuleOutcome::Cancelled);
        } else {
          error!(output = %output.display(), error = %join_err, "rule task panicked");
          self.settle(
            idx,
            RuleOutcome::Failed(RuleFailure {
              message: format!("rule task panicked: {join_err}"),
              code: None,
              stdout: String::new(),
              stderr: String::new(),
            }),
          );
        }
        return;
      }
    };

    let rule = self.graph.rule(idx);
    match result {
      Ok(printed) => {
        info!(rule = %rule.description(), "rebuilt");
        if !printed.stdout.is_empty() || !printed.stderr.is_empty() {
          debug!(rule = %rule.description(), "tool produced output");
          self.printed.insert(idx, printed);
        }
        self.record_signature(idx);
        self.settle(idx, RuleOutcome::RebuiltOk);
      }
      Err(e) => {
        error!(rule = %rule.description(), error = %e, "rule failed");
        self.discard_output(&rule.output).await;
        if let Some(store) = self.signatures.as_mut() {
          store.remove(&rule.output);
        }
        self.settle(idx, RuleOutcome::Failed(RuleFailure::from(&e)));
      }
    }
  }

  /// Record a terminal outcome and update everything downstream.
  fn settle(&mut self, idx: NodeIndex, outcome: RuleOutcome) {
    match &outcome {
      RuleOutcome::FreshSkipped | RuleOutcome::RebuiltOk => {
        for dependent in self.graph.dependents(idx) {
          if !self.selected.contains(&dependent) {
            continue;
          }
          if let Some(count) = self.remaining.get_mut(&dependent) {
            *count = count.saturating_sub(1);
            if *count == 0 && !self.outcomes.contains_key(&dependent) {
              self.ready.push_back(dependent);
            }
          }
        }
      }
      RuleOutcome::Failed(_) => self.block_dependents(idx),
      RuleOutcome::Blocked { .. } | RuleOutcome::Cancelled => {}
    }
    self.outcomes.insert(idx, outcome);
  }

  fn block_dependents(&mut self, failed: NodeIndex) {
    let by = self.graph.rule(failed).output.clone();
    let mut stack = self.graph.dependents(failed);

    while let Some(idx) = stack.pop() {
      if !self.selected.contains(&idx) || self.outcomes.contains_key(&idx) {
        continue;
      }
      warn!(
        output = %self.graph.rule(idx).output.display(),
        failed_dep = %by.display(),
        "blocked by failed dependency"
      );
      self.outcomes.insert(idx, RuleOutcome::Blocked { by: by.clone() });
      stack.extend(self.graph.dependents(idx));
    }
  }

  fn record_signature(&mut self, idx: NodeIndex) {
    let Some(store) = self.signatures.as_mut() else {
      return;
    };
    let rule = self.graph.rule(idx);
    let inputs = match self.config.policy {
      StalenessPolicy::Content => stale::input_hashes(rule, &self.view),
      StalenessPolicy::Mtime => BTreeMap::new(),
    };
    store.record(&rule.output, Signature::new(rule, inputs));
  }

  /// Make room for a fresh output: parent directory present, old output gone.
  async fn prepare_output(&self, output: &Path) -> Result<(), ExecuteError> {
    let path = self.view.resolve(output);
    if let Some(parent) = path.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    match tokio::fs::remove_file(&path).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(e.into()),
    }
  }

  /// Delete a partial output so it is never mistaken for a fresh one.
  async fn discard_output(&self, output: &Path) {
    let path = self.view.resolve(output);
    match tokio::fs::remove_file(&path).await {
      Ok(()) => debug!(path = %path.display(), "removed partial output"),
      Err(e) if e.kind() == io::ErrorKind::NotFound => {}
      Err(e) => warn!(path = %path.display(), error = %e, "failed to remove partial output"),
    }
  }

  fn into_report(mut self, order: &[NodeIndex], interrupted: bool, started: Instant) -> BuildReport {
    if let Some(store) = self.signatures.as_mut()
      && let Err(e) = store.save()
    {
      warn!(path = %store.path().display(), error = %e, "failed to save signature cache");
    }

    let rules = order
      .iter()
      .map(|&idx| {
        let rule = self.graph.rule(idx);
        let printed = self.printed.remove(&idx).unwrap_or_default();
        RuleReport {
          output: rule.output.clone(),
          kind: rule.kind,
          target: rule.target.clone(),
          description: rule.description(),
          outcome: self.outcomes.remove(&idx).unwrap_or(RuleOutcome::Cancelled),
          stdout: printed.stdout,
          stderr: printed.stderr,
        }
      })
      .collect();

    BuildReport {
      rules,
      interrupted,
      elapsed: started.elapsed(),
    }
  }
}

/// What a run would do for one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedRule {
  pub output: PathBuf,
  pub kind: RuleKind,
  pub target: String,
  pub description: String,
  pub command: String,
  /// Why it would run, or `None` if it is fresh.
  pub reason: Option<StaleReason>,
}

impl PlannedRule {
  pub fn would_run(&self) -> bool {
    self.reason.is_some()
  }
}

/// Dry run: decide staleness for every selected rule without running anything.
///
/// Rules downstream of one that would run are reported as
/// [`StaleReason::DependencyRebuilt`] unless they are stale for a reason of
/// their own.
pub fn plan<S: AsRef<str>>(
  graph: &BuildGraph,
  requested: &[S],
  config: &ExecuteConfig,
) -> Result<Vec<PlannedRule>, ExecuteError> {
  let selected = graph.select(requested)?;
  let order = graph.topological(&selected);
  let view = DiskView::new(&config.root);
  let signatures = config
    .signatures
    .as_ref()
    .map(|path| SignatureStore::open(config.root.join(path)));

  Ok(plan_with(graph, &order, &view, signatures.as_ref(), config.policy))
}

fn plan_with(
  graph: &BuildGraph,
  order: &[NodeIndex],
  view: &impl FileSystemView,
  signatures: Option<&SignatureStore>,
  policy: StalenessPolicy,
) -> Vec<PlannedRule> {
  let mut will_run: HashSet<NodeIndex> = HashSet::new();
  let mut planned = Vec::with_capacity(order.len());

  for &idx in order {
    let rule = graph.rule(idx);
    let dependency_runs = graph.dependencies(idx).iter().any(|d| will_run.contains(d));
    let previous = signatures.and_then(|s| s.get(&rule.output));

    let staleness = stale::check(rule, view, previous, policy, dependency_runs);
    let reason = staleness
      .reason()
      .cloned()
      .or_else(|| dependency_runs.then_some(StaleReason::DependencyRebuilt));

    if reason.is_some() {
      will_run.insert(idx);
    }

    planned.push(PlannedRule {
      output: rule.output.clone(),
      kind: rule.kind,
      target: rule.target.clone(),
      description: rule.description(),
      command: rule.command_line(),
      reason,
    });
  }

  planned
}
