//! The result contract shared by every execution backend.
//!
//! Whatever backend runs the code, callers only ever receive an
//! [`ExecutionOutput`]. It serializes to the JSON shape the editor's output
//! panel consumes:
//!
//! ```json
//! { "output": "...", "error": false, "type": "console" }
//! { "output": "", "error": true, "type": "sql", "sqlResults": [ ... ] }
//! ```

use serde::{Deserialize, Serialize};

/// Shown instead of an empty string when a run finished without printing anything.
pub const NO_OUTPUT: &str = "(no output)";

/// Prefix that marks an execution-service transport failure.
pub const SERVER_FAILURE_MARKER: &str = "Server execution failed";

/// Prefix used by the router when a backend returns an error.
pub const EXECUTION_ERROR_PREFIX: &str = "Execution error";

/// Appended to infrastructure faults, which are environmental rather than bugs in the user's code.
pub const RETRY_HINT: &str = "This looks like a temporary problem with the execution environment. Please try again.";

pub mod ansi {
    pub const RED: &str = "\x1b[31m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const RESET: &str = "\x1b[0m";

    pub fn red(text: &str) -> String {
        format!("{RED}{text}{RESET}")
    }

    pub fn yellow(text: &str) -> String {
        format!("{YELLOW}{text}{RESET}")
    }
}

/// How the UI should present an [`ExecutionOutput`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Preformatted text, possibly with ANSI color segments.
    #[default]
    Console,
    /// The caller renders a live document preview from the project's files.
    Preview,
    /// One table or error line per entry of `sql_results`.
    Sql,
}

/// One entry of a SQL run's structured results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlResult {
    Table {
        columns: Vec<String>,
        values: Vec<Vec<serde_json::Value>>,
    },
    Failed {
        error: String,
    },
}

impl SqlResult {
    pub fn empty_table() -> Self {
        SqlResult::Table {
            columns: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SqlResult::Failed { .. })
    }
}

/// Normalized result of one execution.
///
/// `error` is true whenever an unrecoverable fault occurred, even when
/// `output` already holds text captured before the fault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutput {
    pub output: String,
    pub error: bool,
    #[serde(rename = "type")]
    pub kind: OutputKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_results: Option<Vec<SqlResult>>,
}

impl ExecutionOutput {
    /// Successful console output. Empty text becomes [`NO_OUTPUT`].
    pub fn console(output: impl Into<String>) -> Self {
        Self {
            output: non_empty(output.into()),
            error: false,
            kind: OutputKind::Console,
            sql_results: None,
        }
    }

    /// Failed console output. The text is kept as given.
    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            error: true,
            kind: OutputKind::Console,
            sql_results: None,
        }
    }

    /// Failure caused by the environment (runtime download, unreachable service).
    pub fn infrastructure(message: &str, hint: &str) -> Self {
        Self::failure(format!("{}\n{}", ansi::red(message), hint))
    }

    pub fn preview() -> Self {
        Self {
            output: String::new(),
            error: false,
            kind: OutputKind::Preview,
            sql_results: None,
        }
    }

    pub fn sql(output: impl Into<String>, results: Vec<SqlResult>, error: bool) -> Self {
        Self {
            output: output.into(),
            error,
            kind: OutputKind::Sql,
            sql_results: Some(results),
        }
    }

    /// Plain-text rendering for terminals and logs.
    pub fn render_text(&self) -> String {
        let mut text = self.output.clone();
        if let Some(results) = &self.sql_results {
            for result in results {
                if !text.is_empty() && !text.ends_with('\n') {
                    text.push('\n');
                }
                match result {
                    SqlResult::Table { columns, .. } if columns.is_empty() => {
                        text.push_str("(0 rows)");
                    }
                    SqlResult::Table { columns, values } => {
                        let rows: Vec<Vec<String>> = values
                            .iter()
                            .map(|row| row.iter().map(render_cell).collect())
                            .collect();
                        text.push_str(&crate::render::grid(columns, &rows));
                    }
                    SqlResult::Failed { error } => text.push_str(&ansi::red(error)),
                }
            }
        }
        text
    }
}

fn render_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn non_empty(output: String) -> String {
    if output.trim().is_empty() {
        NO_OUTPUT.to_string()
    } else {
        output
    }
}
