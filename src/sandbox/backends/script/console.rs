//! Rendering of what the console shim recorded during a run.
//!
//! The shim inside the JS context does not format anything itself. It
//! describes each argument as a tagged JSON value ([`ConsoleArg`]) and the
//! whole run as a [`RunReport`]; everything the user sees is built here.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::output::{ansi, ExecutionOutput};
use crate::render;

/// Lines the evaluator wrapper adds above the user's first line.
pub const WRAPPER_LINE_OFFSET: u32 = 2;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "t", rename_all = "lowercase")]
pub enum ConsoleArg {
    Undefined,
    Null,
    Error { name: String, message: String },
    Function { name: String },
    String { value: String },
    Json { value: String },
    Text { value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Log,
    Info,
    Debug,
    Warn,
    Error,
    Table,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConsoleEntry {
    pub level: Level,
    #[serde(default)]
    pub args: Vec<ConsoleArg>,
    /// JSON copy of the `console.table` argument when it was an array
    #[serde(default)]
    pub rows: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ThrownError {
    pub name: String,
    pub message: String,
    #[serde(default)]
    pub stack: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RunReport {
    #[serde(default)]
    pub entries: Vec<ConsoleEntry>,
    #[serde(default)]
    pub returned: Option<ConsoleArg>,
    #[serde(default)]
    pub error: Option<ThrownError>,
}

pub fn format_arg(arg: &ConsoleArg) -> String {
    match arg {
        ConsoleArg::Undefined => "undefined".to_string(),
        ConsoleArg::Null => "null".to_string(),
        ConsoleArg::Error { name, message } => format!("{}: {}", name, message),
        ConsoleArg::Function { name } => format!("[Function: {}]", name),
        ConsoleArg::String { value } | ConsoleArg::Json { value } | ConsoleArg::Text { value } => {
            value.clone()
        }
    }
}

pub fn format_entry(entry: &ConsoleEntry) -> String {
    if entry.level == Level::Table {
        if let Some(table) = entry.rows.as_ref().and_then(format_table) {
            return table;
        }
    }

    let line = entry
        .args
        .iter()
        .map(format_arg)
        .collect::<Vec<_>>()
        .join(" ");

    match entry.level {
        Level::Warn => ansi::yellow(&line),
        Level::Error => ansi::red(&line),
        _ => line,
    }
}

/// Render an array as a `console.table` grid.
///
/// Object rows contribute their keys as columns (union, first-seen order);
/// primitive rows go to a trailing `Values` column. Non-arrays are not tables.
pub fn format_table(rows: &Value) -> Option<String> {
    let rows = rows.as_array()?;

    let mut keys: Vec<String> = Vec::new();
    let mut has_primitives = false;
    for row in rows {
        match row {
            Value::Object(map) => {
                for key in map.keys() {
                    if !keys.contains(key) {
                        keys.push(key.clone());
                    }
                }
            }
            _ => has_primitives = true,
        }
    }

    let mut columns = vec!["(index)".to_string()];
    columns.extend(keys.iter().cloned());
    if has_primitives {
        columns.push("Values".to_string());
    }

    let body: Vec<Vec<String>> = rows
        .iter()
        .enumerate()
        .map(|(index, row)| {
            let mut cells = vec![index.to_string()];
            match row {
                Value::Object(map) => {
                    cells.extend(
                        keys.iter()
                            .map(|key| map.get(key).map(table_cell).unwrap_or_default()),
                    );
                    if has_primitives {
                        cells.push(String::new());
                    }
                }
                primitive => {
                    cells.extend(keys.iter().map(|_| String::new()));
                    cells.push(table_cell(primitive));
                }
            }
            cells
        })
        .collect();

    Some(render::grid(&columns, &body))
}

fn table_cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

static STACK_POSITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<anonymous>:(\d+):(\d+)").expect("stack position pattern is valid")
});

/// Best-effort line number of a thrown error, relative to the user's source.
///
/// Only frames inside the user's function count. They also name the site that
/// created the function (`eval at f (<anonymous>:9:3), <anonymous>:4:11`), so
/// the position is the last one on the innermost such frame. Errors raised
/// outside user code, such as syntax errors, have no line.
pub fn error_line(stack: &str) -> Option<u32> {
    let frame = stack
        .lines()
        .find(|line| line.contains("eval at") && STACK_POSITION.is_match(line))?;
    let caps = STACK_POSITION.captures_iter(frame).last()?;
    let line: u32 = caps.get(1)?.as_str().parse().ok()?;
    line.checked_sub(WRAPPER_LINE_OFFSET).filter(|line| *line > 0)
}

pub fn format_error(error: &ThrownError) -> String {
    match error_line(&error.stack) {
        Some(line) => format!("{}: {} (line {})", error.name, error.message, line),
        None => format!("{}: {}", error.name, error.message),
    }
}

/// Turn a finished run into the Output Model.
pub fn into_output(report: &RunReport) -> ExecutionOutput {
    let mut lines: Vec<String> = report.entries.iter().map(format_entry).collect();

    if let Some(error) = &report.error {
        lines.push(ansi::red(&format_error(error)));
        return ExecutionOutput::failure(lines.join("\n"));
    }

    if lines.is_empty() {
        if let Some(returned) = &report.returned {
            return ExecutionOutput::console(format_arg(returned));
        }
    }

    ExecutionOutput::console(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::NO_OUTPUT;
    use serde_json::json;

    fn log(args: Vec<ConsoleArg>) -> ConsoleEntry {
        ConsoleEntry {
            level: Level::Log,
            args,
            rows: None,
        }
    }

    fn text(value: &str) -> ConsoleArg {
        ConsoleArg::Text {
            value: value.to_string(),
        }
    }

    #[test]
    fn test_report_deserializes_from_shim_json() {
        let report: RunReport = serde_json::from_value(json!({
            "entries": [
                {"level": "log", "args": [{"t": "text", "value": "1"}, {"t": "undefined"}]},
                {"level": "table", "args": [{"t": "json", "value": "[]"}], "rows": []}
            ],
            "returned": null,
            "error": null
        }))
        .unwrap();
        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.entries[0].args[1], ConsoleArg::Undefined);
        assert_eq!(report.entries[1].level, Level::Table);
    }

    #[test]
    fn test_args_are_space_joined() {
        let entry = log(vec![text("1"), text("2"), text("3")]);
        assert_eq!(format_entry(&entry), "1 2 3");
    }

    #[test]
    fn test_arg_precedence_formats() {
        assert_eq!(format_arg(&ConsoleArg::Undefined), "undefined");
        assert_eq!(format_arg(&ConsoleArg::Null), "null");
        assert_eq!(
            format_arg(&ConsoleArg::Error {
                name: "TypeError".into(),
                message: "x is not a function".into()
            }),
            "TypeError: x is not a function"
        );
        assert_eq!(
            format_arg(&ConsoleArg::Function { name: "add".into() }),
            "[Function: add]"
        );
    }

    #[test]
    fn test_warn_and_error_are_colored() {
        let warn = ConsoleEntry {
            level: Level::Warn,
            args: vec![text("careful")],
            rows: None,
        };
        assert_eq!(format_entry(&warn), "\x1b[33mcareful\x1b[0m");
    }

    #[test]
    fn test_table_of_objects_uses_union_of_keys() {
        let table = format_table(&json!([{"a": 1}, {"b": "x", "a": 2}])).unwrap();
        let header = table.lines().nth(1).unwrap();
        assert!(header.contains("(index)"));
        assert!(header.find(" a ").unwrap() < header.find(" b ").unwrap());
        assert!(table.contains("│ 1       │ 2 │ x │"));
    }

    #[test]
    fn test_table_of_primitives() {
        let table = format_table(&json!(["x", 10])).unwrap();
        assert!(table.contains("Values"));
        assert!(table.contains("│ 1       │ 10     │"));
        assert!(format_table(&json!({"a": 1})).is_none());
    }

    #[test]
    fn test_error_line_discounts_wrapper() {
        let stack = "Error: boom\n    at eval (eval at <anonymous> (unknown source), <anonymous>:4:11)";
        assert_eq!(error_line(stack), Some(2));
        let nested = "TypeError: bad\n    at eval (eval at <anonymous> (<anonymous>:89:11), <anonymous>:5:7)\n    at <anonymous>:92:10";
        assert_eq!(error_line(nested), Some(3));
        assert_eq!(error_line("Error: boom"), None);
    }

    #[test]
    fn test_error_line_ignores_wrapper_frames() {
        let stack = "SyntaxError: Unexpected token ';'\n    at new AsyncFunction (<anonymous>)\n    at <anonymous>:69:11";
        assert_eq!(error_line(stack), None);

        let error = ThrownError {
            name: "SyntaxError".into(),
            message: "Unexpected token ';'".into(),
            stack: stack.into(),
        };
        assert_eq!(format_error(&error), "SyntaxError: Unexpected token ';'");
    }

    #[test]
    fn test_silent_run_reports_placeholder() {
        let output = into_output(&RunReport::default());
        assert!(!output.error);
        assert_eq!(output.output, NO_OUTPUT);
    }

    #[test]
    fn test_return_value_shown_only_without_logs() {
        let report = RunReport {
            returned: Some(text("42")),
            ..Default::default()
        };
        assert_eq!(into_output(&report).output, "42");

        let report = RunReport {
            entries: vec![log(vec![text("hi")])],
            returned: Some(text("42")),
            error: None,
        };
        assert_eq!(into_output(&report).output, "hi");
    }

    #[test]
    fn test_error_keeps_prior_output() {
        let report = RunReport {
            entries: vec![log(vec![text("before")])],
            returned: None,
            error: Some(ThrownError {
                name: "Error".into(),
                message: "boom".into(),
                stack: String::new(),
            }),
        };
        let output = into_output(&report);
        assert!(output.error);
        assert!(output.output.starts_with("before\n"));
        assert!(output.output.contains("Error: boom"));
    }
}
