//! Build output sinks.
//!
//! The executor reports step starts, raw tool output and problem markers to a
//! [`ConsoleSink`]. Problem markers only appear when an [`ErrorParser`] is
//! installed; recognising compiler diagnostics is up to the parser.

use std::fmt;

use serde::Serialize;
use tracing::{error, info, warn};

use super::types::StepStatus;
use crate::describe::BuildStep;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Info,
  Warning,
  Error,
}

impl fmt::Display for Severity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Severity::Info => "info",
      Severity::Warning => "warning",
      Severity::Error => "error",
    })
  }
}

/// A diagnostic extracted from tool output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProblemMarker {
  /// Resource path the problem refers to, if known.
  pub file: Option<String>,
  pub line: Option<u32>,
  pub severity: Severity,
  pub message: String,
}

impl ProblemMarker {
  /// Markers without a message carry nothing worth reporting.
  pub fn is_well_formed(&self) -> bool {
    !self.message.trim().is_empty() && self.line.is_none_or(|l| l > 0)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
  Stdout,
  Stderr,
}

/// Turns one line of tool output into a problem marker.
pub trait ErrorParser: Send + Sync {
  fn parse_line(&self, step: &BuildStep, line: &str) -> Option<ProblemMarker>;
}

/// Recognises `file:line[:column]: severity: message`, as printed by GCC,
/// Clang and most tools imitating them.
#[derive(Debug, Clone, Copy, Default)]
pub struct GnuErrorParser;

impl ErrorParser for GnuErrorParser {
  fn parse_line(&self, _step: &BuildStep, line: &str) -> Option<ProblemMarker> {
    for (tag, severity) in [
      (": error: ", Severity::Error),
      (": fatal error: ", Severity::Error),
      (": warning: ", Severity::Warning),
      (": note: ", Severity::Info),
    ] {
      let Some((location, message)) = line.split_once(tag) else {
        continue;
      };

      let mut parts = location.splitn(3, ':');
      let file = parts.next().filter(|f| !f.trim().is_empty())?;
      let line = parts.next().and_then(|l| l.trim().parse().ok());
      return Some(ProblemMarker {
        file: Some(file.trim().to_string()),
        line,
        severity,
        message: message.trim().to_string(),
      });
    }
    None
  }
}

/// Receives build output.
pub trait ConsoleSink: Send + Sync {
  fn step_started(&self, step: &BuildStep);

  /// A chunk of a step's output, one or more whole lines.
  fn output(&self, step: &BuildStep, stream: OutputStream, text: &str);

  fn problem(&self, step: &BuildStep, marker: &ProblemMarker);

  fn step_finished(&self, _step: &BuildStep, _status: StepStatus) {}
}

/// Forwards everything to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingConsole;

impl ConsoleSink for TracingConsole {
  fn step_started(&self, step: &BuildStep) {
    info!(step = %step.id, tool = %step.tool_name, "{}", step.command);
  }

  fn output(&self, step: &BuildStep, stream: OutputStream, text: &str) {
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
      match stream {
        OutputStream::Stdout => info!(step = %step.id, "{line}"),
        OutputStream::Stderr => warn!(step = %step.id, "{line}"),
      }
    }
  }

  fn problem(&self, step: &BuildStep, marker: &ProblemMarker) {
    let file = marker.file.as_deref().unwrap_or("-");
    match marker.severity {
      Severity::Error => error!(step = %step.id, file, line = ?marker.line, "{}", marker.message),
      Severity::Warning => warn!(step = %step.id, file, line = ?marker.line, "{}", marker.message),
      Severity::Info => info!(step = %step.id, file, line = ?marker.line, "{}", marker.message),
    }
  }

  fn step_finished(&self, step: &BuildStep, status: StepStatus) {
    match status {
      StepStatus::Failed => error!(step = %step.id, tool = %step.tool_name, "step failed"),
      status => info!(step = %step.id, %status, "step finished"),
    }
  }
}

#[cfg(test)]
mod tests {
  use tracing_test::traced_test;

  use super::*;
  use crate::describe::StepId;

  fn step() -> BuildStep {
    BuildStep {
      id: StepId(3),
      tool: "gnu.c.compiler".to_string(),
      tool_name: "GCC C Compiler".to_string(),
      kind: crate::describe::StepKind::Single,
      inputs: vec!["src/a.c".to_string()],
      dependencies: Vec::new(),
      outputs: vec!["Debug/src/a.o".to_string()],
      command: "gcc -c -o Debug/src/a.o src/a.c".to_string(),
      needs_rebuild: true,
    }
  }

  #[test]
  fn well_formed_markers() {
    let marker = ProblemMarker {
      file: Some("src/a.c".to_string()),
      line: Some(4),
      severity: Severity::Error,
      message: "expected ';'".to_string(),
    };
    assert!(marker.is_well_formed());
    assert!(
      !ProblemMarker {
        message: "  ".to_string(),
        ..marker.clone()
      }
      .is_well_formed()
    );
    assert!(!ProblemMarker { line: Some(0), ..marker }.is_well_formed());
  }

  #[test]
  fn gnu_parser_reads_compiler_diagnostics() {
    let parser = GnuErrorParser;
    let step = step();

    let marker = parser.parse_line(&step, "src/a.c:4:12: error: expected ';' before '}'").unwrap();
    assert_eq!(marker.file.as_deref(), Some("src/a.c"));
    assert_eq!(marker.line, Some(4));
    assert_eq!(marker.severity, Severity::Error);
    assert_eq!(marker.message, "expected ';' before '}'");

    let marker = parser.parse_line(&step, "src/a.c:9: warning: unused variable 'x'").unwrap();
    assert_eq!((marker.line, marker.severity), (Some(9), Severity::Warning));

    let marker = parser.parse_line(&step, "cc1: fatal error: src/z.c: No such file").unwrap();
    assert_eq!(marker.file.as_deref(), Some("cc1"));
    assert_eq!(marker.line, None);

    assert!(parser.parse_line(&step, "compiling src/a.c").is_none());
  }

  #[traced_test]
  #[test]
  fn tracing_console_logs_lines() {
    let console = TracingConsole;
    let step = step();
    console.step_started(&step);
    console.output(&step, OutputStream::Stderr, "a.c:4: warning: unused\n\n");
    console.problem(
      &step,
      &ProblemMarker {
        file: Some("src/a.c".to_string()),
        line: Some(4),
        severity: Severity::Warning,
        message: "unused variable".to_string(),
      },
    );

    assert!(logs_contain("gcc -c -o Debug/src/a.o src/a.c"));
    assert!(logs_contain("a.c:4: warning: unused"));
    assert!(logs_contain("unused variable"));
  }
}
