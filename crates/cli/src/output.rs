//! CLI output formatting utilities.
//!
//! Provides consistent formatting for terminal output including colored status
//! lines per rule, human-readable durations, and Unicode symbols.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use bake_lib::execute::{BuildReport, PlannedRule, RuleOutcome, RuleReport};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
  pub const MINUS: &str = "-";
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  if secs >= 60 {
    let mins = secs / 60;
    let remaining_secs = secs % 60;
    format!("{}m {}s", mins, remaining_secs)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, millis / 10)
  } else {
    format!("{}ms", millis)
  }
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

/// One status line for a finished rule.
///
/// A rebuilt or failed rule is followed by whatever its tool wrote, on stderr.
pub fn print_rule(rule: &RuleReport) {
  match &rule.outcome {
    RuleOutcome::FreshSkipped => println!(
      "{} {} {}",
      symbols::INFO.if_supports_color(Stream::Stdout, |s| s.dimmed()),
      rule.description,
      "(fresh)".if_supports_color(Stream::Stdout, |s| s.dimmed())
    ),
    RuleOutcome::RebuiltOk => {
      print_success(&rule.description);
      print_tool_streams(&rule.stderr, &rule.stdout);
    }
    RuleOutcome::Failed(failure) => {
      println!(
        "{} {} {}",
        symbols::ERROR.if_supports_color(Stream::Stdout, |s| s.red()),
        rule.description,
        "(failed)".if_supports_color(Stream::Stdout, |s| s.red())
      );
      if failure.stderr.trim().is_empty() && failure.stdout.trim().is_empty() {
        eprintln!("    {}", failure.message);
      }
      print_tool_streams(&failure.stderr, &failure.stdout);
    }
    RuleOutcome::Blocked { by } => println!(
      "{} {} {}",
      symbols::WARNING.if_supports_color(Stream::Stdout, |s| s.yellow()),
      rule.description,
      format!("(blocked {} {})", symbols::ARROW, by.display()).if_supports_color(Stream::Stdout, |s| s.yellow())
    ),
    RuleOutcome::Cancelled => println!(
      "{} {} {}",
      symbols::MINUS.if_supports_color(Stream::Stdout, |s| s.dimmed()),
      rule.description,
      "(cancelled)".if_supports_color(Stream::Stdout, |s| s.dimmed())
    ),
  }
}

/// Whatever a tool printed, indented under its status line, on stderr.
fn print_tool_streams(stderr: &str, stdout: &str) {
  for line in [stderr.trim_end(), stdout.trim_end()].iter().flat_map(|s| s.lines()) {
    eprintln!("    {}", line);
  }
}

pub fn print_report(report: &BuildReport) {
  for rule in &report.rules {
    print_rule(rule);
  }

  println!();
  let elapsed = format_duration(report.elapsed);
  if report.interrupted {
    print_warning(&format!("Build interrupted after {}", elapsed));
  } else if report.is_success() {
    print_success(&format!("Build complete in {}", elapsed));
  } else {
    print_error(&format!("Build failed after {}", elapsed));
  }

  print_stat("Rebuilt", &report.rebuilt().to_string());
  print_stat("Fresh", &report.fresh().to_string());
  for (label, count) in [
    ("Failed", report.failed()),
    ("Blocked", report.blocked()),
    ("Cancelled", report.cancelled()),
  ] {
    if count > 0 {
      print_stat(label, &count.to_string());
    }
  }
}

pub fn print_plan(planned: &[PlannedRule], verbose: bool) {
  for rule in planned {
    match &rule.reason {
      Some(reason) => println!(
        "{} {} {}",
        symbols::ARROW.if_supports_color(Stream::Stdout, |s| s.cyan()),
        rule.description,
        format!("({})", reason).if_supports_color(Stream::Stdout, |s| s.dimmed())
      ),
      None => println!(
        "{} {} {}",
        symbols::INFO.if_supports_color(Stream::Stdout, |s| s.dimmed()),
        rule.description,
        "(fresh)".if_supports_color(Stream::Stdout, |s| s.dimmed())
      ),
    }
    if verbose && rule.reason.is_some() {
      println!("    {}", rule.command);
    }
  }

  let to_run = planned.iter().filter(|p| p.would_run()).count();
  println!();
  print_info(&format!("{} of {} rules would run", to_run, planned.len()));
}
