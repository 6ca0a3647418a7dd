//! Command-line generation for build steps.
//!
//! A tool's `commandLinePattern` is expanded with these variables:
//!
//! | Variable         | Value                                        |
//! |------------------|----------------------------------------------|
//! | `${COMMAND}`     | the tool command                             |
//! | `${FLAGS}`       | flags generated from the tool's options      |
//! | `${OUTPUT_FLAG}` | the tool's output flag, e.g. `-o`            |
//! | `${OUTPUT_PREFIX}` | always empty; prefixes are part of outputs |
//! | `${OUTPUT}`      | the primary output                           |
//! | `${INPUTS}`      | all command-line inputs                      |

use crate::model::{ObjectRef, OptionView, ToolView, ValueType};
use crate::project::{OptionValue, ProjectModel};

/// Flags contributed by a holder's options, in option order.
pub fn option_flags(project: &ProjectModel, holder: ObjectRef) -> Vec<String> {
  let mut flags = Vec::new();

  for option in project.options_of(holder) {
    let view = OptionView::new(project, option);
    let command = view.command();

    match (view.value_type(), project.option_value(option)) {
      (ValueType::Boolean, OptionValue::Boolean(true)) => flags.push(command.to_string()),
      (ValueType::Boolean, OptionValue::Boolean(false)) => flags.push(view.command_false().to_string()),
      (ValueType::Enumerated, OptionValue::Enumerated(id)) => flags.push(view.enum_command(&id).to_string()),
      (_, OptionValue::String(value)) if !value.trim().is_empty() => {
        flags.push(format!("{command}{}", value.trim()));
      }
      (_, OptionValue::List(items)) => {
        flags.extend(
          items
            .iter()
            .filter(|item| !item.trim().is_empty())
            .map(|item| format!("{command}{}", quote(item.trim()))),
        );
      }
      _ => {}
    }
  }

  flags.retain(|f| !f.is_empty());
  flags
}

/// Expand a tool's command-line pattern for one invocation.
pub fn command_line(project: &ProjectModel, holder: ObjectRef, inputs: &[String], outputs: &[String]) -> String {
  let tool = ToolView::new(project, holder);
  let flags = option_flags(project, holder).join(" ");
  let output = outputs.first().map(|o| quote(o)).unwrap_or_default();
  let inputs = inputs.iter().map(|i| quote(i)).collect::<Vec<_>>().join(" ");
  let output_flag = if output.is_empty() { "" } else { tool.output_flag() };

  let line = tool
    .command_line_pattern()
    .replace("${COMMAND}", tool.command())
    .replace("${FLAGS}", &flags)
    .replace("${OUTPUT_FLAG}", output_flag)
    .replace("${OUTPUT_PREFIX}", "")
    .replace("${OUTPUT}", &output)
    .replace("${INPUTS}", &inputs);

  collapse_spaces(&line)
}

/// Quote a value containing whitespace, unless it is already quoted.
pub fn quote(value: &str) -> String {
  if value.chars().any(char::is_whitespace) && !(value.starts_with('"') && value.ends_with('"')) {
    format!("\"{value}\"")
  } else {
    value.to_string()
  }
}

/// Collapse runs of spaces outside double quotes and trim the ends.
fn collapse_spaces(line: &str) -> String {
  let mut out = String::with_capacity(line.len());
  let mut in_quote = false;

  for c in line.trim().chars() {
    if c == '"' {
      in_quote = !in_quote;
    }
    if c.is_whitespace() && !in_quote {
      if !out.ends_with(' ') {
        out.push(' ');
      }
      continue;
    }
    out.push(c);
  }

  out
}
