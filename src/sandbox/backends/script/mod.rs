//! In-process JavaScript/TypeScript evaluation on an embedded V8 engine.

pub mod console;
mod isolate;
pub mod typescript;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use self::isolate::{Evaluation, Terminator};
use crate::config::ScriptConfig;
use crate::error::{PolyrunError, Result};
use crate::language::{EngineBinding, ScriptDialect};
use crate::output::{ansi, ExecutionOutput};
use crate::sandbox::traits::{BackendCapabilities, ExecutionBackend, ExecutionJob};

pub struct ScriptBackend {
    timeout: Duration,
    allowed_globals: Arc<Vec<String>>,
}

impl ScriptBackend {
    pub fn new(config: &ScriptConfig) -> Self {
        isolate::init_platform();
        Self {
            timeout: Duration::from_secs(config.timeout_seconds),
            allowed_globals: Arc::new(config.allowed_globals.clone()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn timed_out(&self) -> ExecutionOutput {
        let error = PolyrunError::Timeout(describe_duration(self.timeout));
        ExecutionOutput::failure(ansi::red(&format!("TimeoutError: {}", error)))
    }
}

fn describe_duration(duration: Duration) -> String {
    if duration.subsec_millis() == 0 {
        let secs = duration.as_secs();
        format!("{} second{}", secs, if secs == 1 { "" } else { "s" })
    } else {
        format!("{} ms", duration.as_millis())
    }
}

#[async_trait]
impl ExecutionBackend for ScriptBackend {
    fn name(&self) -> &str {
        "script"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::default()
    }

    async fn execute(&self, job: &ExecutionJob) -> Result<ExecutionOutput> {
        let source = match job.language.binding {
            EngineBinding::InProcess {
                dialect: ScriptDialect::TypeScript,
            } => typescript::strip_types(&job.code),
            _ => job.code.clone(),
        };

        let start = Instant::now();
        let terminator = Terminator::new();
        let task = tokio::task::spawn_blocking({
            let terminator = Arc::clone(&terminator);
            let allowed_globals = Arc::clone(&self.allowed_globals);
            move || isolate::evaluate(&source, &allowed_globals, &terminator)
        });

        let evaluation = match tokio::time::timeout(self.timeout, task).await {
            Ok(joined) => joined
                .map_err(|e| PolyrunError::Execution(format!("Evaluator thread failed: {}", e)))??,
            Err(_) => {
                warn!(timeout = ?self.timeout, "Script run timed out, terminating isolate");
                terminator.fire();
                return Ok(self.timed_out());
            }
        };

        debug!(elapsed = ?start.elapsed(), "Script run finished");

        match evaluation {
            Evaluation::Completed(report) => Ok(console::into_output(&report)),
            Evaluation::Terminated => Ok(self.timed_out()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::lookup;
    use crate::output::NO_OUTPUT;

    fn backend() -> ScriptBackend {
        ScriptBackend::new(&ScriptConfig::default())
    }

    fn job(language: &str, code: &str) -> ExecutionJob {
        ExecutionJob {
            language: lookup(language).unwrap(),
            code: code.to_string(),
            files: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_console_log_joins_arguments() {
        let out = backend().execute(&job("javascript", "console.log(1, 2, 3)")).await.unwrap();
        assert!(!out.error);
        assert!(out.output.contains("1 2 3"));
    }

    #[tokio::test]
    async fn test_silent_run_reports_placeholder() {
        let out = backend().execute(&job("javascript", "const x = 1;")).await.unwrap();
        assert!(!out.error);
        assert_eq!(out.output, NO_OUTPUT);
    }

    #[tokio::test]
    async fn test_thrown_error_is_captured() {
        let code = "console.log('before');\nthrow new Error(\"boom\");";
        let out = backend().execute(&job("javascript", code)).await.unwrap();
        assert!(out.error);
        assert!(out.output.starts_with("before\n"));
        assert!(out.output.contains("Error: boom (line 2)"));
    }

    #[tokio::test]
    async fn test_syntax_error_has_no_line() {
        let out = backend().execute(&job("javascript", "let x = ;")).await.unwrap();
        assert!(out.error);
        assert!(out.output.contains("SyntaxError: "));
        assert!(!out.output.contains("(line"));
    }

    #[tokio::test]
    async fn test_same_source_twice_is_identical() {
        let backend = backend();
        let code = "globalThis.counter = (globalThis.counter || 0) + 1; console.log(counter);";
        let first = backend.execute(&job("javascript", code)).await.unwrap();
        let second = backend.execute(&job("javascript", code)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.output, "1");
    }

    #[tokio::test]
    async fn test_infinite_loop_times_out() {
        let backend = backend().with_timeout(Duration::from_millis(200));
        let out = backend.execute(&job("javascript", "while (true) {}")).await.unwrap();
        assert!(out.error);
        assert!(out.output.contains("timed out after 200 ms"));

        // The isolate was terminated, so the backend is still usable.
        let out = backend.execute(&job("javascript", "console.log('next')")).await.unwrap();
        assert_eq!(out.output, "next");
    }

    #[tokio::test]
    async fn test_typescript_is_stripped_before_evaluation() {
        let code = "interface P { x: number }\nfunction double(p: P): number {\n  return p.x * 2;\n}\nconsole.log(double({ x: 21 }));";
        let out = backend().execute(&job("typescript", code)).await.unwrap();
        assert!(!out.error, "{}", out.output);
        assert_eq!(out.output, "42");
    }

    #[tokio::test]
    async fn test_console_table_renders_grid() {
        let code = "console.table([{ a: 1 }, { a: 2 }])";
        let out = backend().execute(&job("javascript", code)).await.unwrap();
        assert!(out.output.starts_with("┌"));
        assert!(out.output.contains("(index)"));
    }

    #[test]
    fn test_describe_duration() {
        assert_eq!(describe_duration(Duration::from_secs(30)), "30 seconds");
        assert_eq!(describe_duration(Duration::from_secs(1)), "1 second");
        assert_eq!(describe_duration(Duration::from_millis(1500)), "1500 ms");
    }
}
