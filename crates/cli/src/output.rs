//! Terminal rendering for mbs.
//!
//! Status lines, plan listings, live build output and build summaries are
//! drawn here. Color is applied only when the target stream supports it;
//! `-o json` output is pretty JSON on stdout.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};
use tracing::warn;

use mbs_lib::describe::{BuildDescription, BuildStep};
use mbs_lib::execute::{
  BuildStatus, ConsoleSink, ExecuteSummary, OutputStream, ProblemMarker, Severity, SkipReason, StepStatus,
};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
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
  pub const DIRTY: &str = "+";
  pub const CLEAN: &str = "=";
  pub const SKIPPED: &str = "-";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tone {
  Good,
  Bad,
  Caution,
  Note,
  Faint,
}

fn paint(text: &str, tone: Tone, stream: Stream) -> String {
  match tone {
    Tone::Good => text.if_supports_color(stream, |s| s.green()).to_string(),
    Tone::Bad => text.if_supports_color(stream, |s| s.red()).to_string(),
    Tone::Caution => text.if_supports_color(stream, |s| s.yellow()).to_string(),
    Tone::Note => text.if_supports_color(stream, |s| s.blue()).to_string(),
    Tone::Faint => text.if_supports_color(stream, |s| s.dimmed()).to_string(),
  }
}

/// `850ms`, `2.4s`, `3m 05s`.
pub fn format_duration(duration: Duration) -> String {
  let millis = duration.as_millis();
  match millis {
    0..1_000 => format!("{millis}ms"),
    1_000..60_000 => format!("{:.1}s", duration.as_secs_f64()),
    _ => {
      let secs = duration.as_secs();
      format!("{}m {:02}s", secs / 60, secs % 60)
    }
  }
}

pub fn print_success(message: &str) {
  println!("{} {message}", paint(symbols::SUCCESS, Tone::Good, Stream::Stdout));
}

pub fn print_info(message: &str) {
  println!("{} {message}", paint(symbols::INFO, Tone::Note, Stream::Stdout));
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    paint(symbols::ERROR, Tone::Bad, Stream::Stderr),
    paint(message, Tone::Bad, Stream::Stderr)
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    paint(symbols::WARNING, Tone::Caution, Stream::Stderr),
    paint(message, Tone::Caution, Stream::Stderr)
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!("  {}: {value}", paint(label, Tone::Faint, Stream::Stdout));
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{json}");
  Ok(())
}

/// One plan line: `+ #3 Demo Compiler → cat src/a.c > Debug/src/a.o`.
///
/// `+` marks steps that will run, `=` steps that are up to date.
pub fn plan_line(step: &BuildStep) -> String {
  let (marker, tone) = plan_marker(step);
  format!(
    "{} {} {} {} {}",
    paint(marker, tone, Stream::Stdout),
    paint(&step.id.to_string(), Tone::Faint, Stream::Stdout),
    step.tool_name,
    paint(symbols::ARROW, Tone::Faint, Stream::Stdout),
    step.command
  )
}

fn plan_marker(step: &BuildStep) -> (&'static str, Tone) {
  if step.needs_rebuild {
    (symbols::DIRTY, Tone::Good)
  } else {
    (symbols::CLEAN, Tone::Faint)
  }
}

pub fn print_plan(desc: &BuildDescription) {
  for id in desc.topological_order() {
    println!("{}", plan_line(desc.step(*id)));
  }
  println!();
  print_stat("Configuration", &desc.configuration);
  print_stat("Steps", &desc.steps().len().to_string());
  print_stat("To build", &desc.needs_build_count().to_string());
  if !desc.stale_outputs.is_empty() {
    print_stat("Stale outputs", &desc.stale_outputs.join(", "));
  }
}

fn status_marker(status: StepStatus) -> (&'static str, Tone) {
  match status {
    StepStatus::Succeeded => (symbols::SUCCESS, Tone::Good),
    StepStatus::Failed => (symbols::ERROR, Tone::Bad),
    StepStatus::Skipped(SkipReason::UpToDate) => (symbols::CLEAN, Tone::Faint),
    StepStatus::Skipped(_) => (symbols::SKIPPED, Tone::Caution),
    StepStatus::Pending | StepStatus::Ready | StepStatus::Running => (symbols::INFO, Tone::Note),
  }
}

/// Headline, counts, then every step that did not finish cleanly.
pub fn print_build_summary(desc: &BuildDescription, summary: &ExecuteSummary) {
  println!();
  let elapsed = format_duration(summary.duration);
  match summary.status {
    BuildStatus::AllSucceeded => print_success(&format!("Build finished in {elapsed}")),
    BuildStatus::NothingToBuild => print_info("Everything is up to date."),
    BuildStatus::CompletedWithFailures => print_error(&format!("Build completed with failures after {elapsed}")),
    BuildStatus::Cancelled => print_warning(&format!("Build cancelled after {elapsed}")),
  }
  print_stat("Succeeded", &summary.succeeded().to_string());
  print_stat("Failed", &summary.failed().to_string());
  print_stat("Skipped", &summary.skipped().to_string());

  for step in desc.steps() {
    let status = summary.status_of(step.id);
    if matches!(status, StepStatus::Succeeded | StepStatus::Skipped(SkipReason::UpToDate)) {
      continue;
    }
    let (marker, tone) = status_marker(status);
    println!(
      "  {} {} {} ({status})",
      paint(marker, tone, Stream::Stdout),
      paint(&step.id.to_string(), Tone::Faint, Stream::Stdout),
      step.tool_name
    );
  }
  for (id, err) in &summary.failures {
    print_stat(&format!("Step {id}"), &err.to_string());
  }
}

/// Live build output: commands and tool stdout on stdout, tool stderr and
/// failures on stderr. `quiet` keeps stdout clean for JSON output.
pub struct TerminalConsole {
  pub quiet: bool,
}

impl ConsoleSink for TerminalConsole {
  fn step_started(&self, step: &BuildStep) {
    if !self.quiet {
      println!("{}", paint(&step.command, Tone::Faint, Stream::Stdout));
    }
  }

  fn output(&self, _step: &BuildStep, stream: OutputStream, text: &str) {
    match stream {
      OutputStream::Stdout if !self.quiet => print!("{text}"),
      OutputStream::Stdout => {}
      OutputStream::Stderr => eprint!("{text}"),
    }
  }

  fn problem(&self, _step: &BuildStep, marker: &ProblemMarker) {
    if marker.severity == Severity::Info {
      return;
    }
    warn!(
      file = marker.file.as_deref().unwrap_or("-"),
      line = ?marker.line,
      severity = %marker.severity,
      "{}",
      marker.message
    );
  }

  fn step_finished(&self, step: &BuildStep, status: StepStatus) {
    if status == StepStatus::Failed {
      print_error(&format!("{} failed: {}", step.tool_name, step.command));
    }
  }
}

#[cfg(test)]
mod tests {
  use mbs_lib::describe::{StepId, StepKind};

  use super::*;

  fn step(needs_rebuild: bool) -> BuildStep {
    BuildStep {
      id: StepId(2),
      tool: "demo.cc".to_string(),
      tool_name: "Demo Compiler".to_string(),
      kind: StepKind::Single,
      inputs: vec!["src/a.c".to_string()],
      dependencies: Vec::new(),
      outputs: vec!["Debug/src/a.o".to_string()],
      command: "cat src/a.c > Debug/src/a.o".to_string(),
      needs_rebuild,
    }
  }

  #[test]
  fn durations_scale_their_unit() {
    assert_eq!(format_duration(Duration::from_millis(850)), "850ms");
    assert_eq!(format_duration(Duration::from_millis(2_400)), "2.4s");
    assert_eq!(format_duration(Duration::from_secs(185)), "3m 05s");
  }

  #[test]
  fn plan_lines_mark_dirty_steps() {
    assert_eq!(plan_marker(&step(true)), (symbols::DIRTY, Tone::Good));
    assert_eq!(plan_marker(&step(false)), (symbols::CLEAN, Tone::Faint));

    let line = plan_line(&step(true));
    assert!(line.contains("Demo Compiler"));
    assert!(line.ends_with("cat src/a.c > Debug/src/a.o"));
  }

  #[test]
  fn skipped_steps_are_marked_by_reason() {
    assert_eq!(status_marker(StepStatus::Skipped(SkipReason::UpToDate)).0, symbols::CLEAN);
    assert_eq!(status_marker(StepStatus::Skipped(SkipReason::Cancelled)).0, symbols::SKIPPED);
    assert_eq!(status_marker(StepStatus::Failed).1, Tone::Bad);
  }

  #[test]
  fn json_format_flag() {
    assert!(OutputFormat::Json.is_json());
    assert!(!OutputFormat::default().is_json());
  }
}
