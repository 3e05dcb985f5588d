use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info_span, Instrument};

use crate::error::{PolyrunError, Result};
use crate::language::{self, EngineBinding, LanguageDescriptor, StaticKind, LANGUAGES};
use crate::output::{ansi, ExecutionOutput, EXECUTION_ERROR_PREFIX, RETRY_HINT};
use crate::sandbox::traits::{BackendCapabilities, ExecutionBackend, ExecutionJob};
use crate::sandbox::{ExecutionRequest, ProjectFile};

/// One backend per runnable engine binding.
pub struct Backends {
    pub script: Arc<dyn ExecutionBackend>,
    pub python: Arc<dyn ExecutionBackend>,
    pub sql: Arc<dyn ExecutionBackend>,
    pub remote: Arc<dyn ExecutionBackend>,
}

/// Entry point of the execution core.
///
/// Looks the language up, dispatches to the bound backend and always resolves
/// to an [`ExecutionOutput`]: backend errors and panics are converted here, so
/// callers never see a failed future. Each router owns its backends, and with
/// them the interpreter and database state; separate routers are isolated.
pub struct Router {
    backends: Backends,
}

impl Router {
    pub fn new(backends: Backends) -> Self {
        Self { backends }
    }

    pub fn languages(&self) -> &'static [LanguageDescriptor] {
        LANGUAGES
    }

    /// Name and capabilities of every backend, in binding order.
    pub fn capabilities(&self) -> Vec<(String, BackendCapabilities)> {
        [
            &self.backends.script,
            &self.backends.python,
            &self.backends.sql,
            &self.backends.remote,
        ]
        .into_iter()
        .map(|backend| (backend.name().to_string(), backend.capabilities()))
        .collect()
    }

    pub async fn run(&self, request: &ExecutionRequest) -> ExecutionOutput {
        self.execute(&request.language, &request.code, &request.files)
            .await
    }

    pub async fn execute(&self, language: &str, code: &str, files: &[ProjectFile]) -> ExecutionOutput {
        let Some(descriptor) = language::lookup(language) else {
            let error = PolyrunError::UnknownLanguage {
                language: language.to_string(),
            };
            return ExecutionOutput::failure(ansi::red(&error.to_string()));
        };

        let span = info_span!(
            "execute",
            language = descriptor.key,
            binding = descriptor.binding.name()
        );
        self.dispatch(descriptor, code, files).instrument(span).await
    }

    async fn dispatch(
        &self,
        descriptor: &'static LanguageDescriptor,
        code: &str,
        files: &[ProjectFile],
    ) -> ExecutionOutput {
        let backend = match descriptor.binding {
            EngineBinding::InProcess { .. } => &self.backends.script,
            EngineBinding::Interpreter => &self.backends.python,
            EngineBinding::Database => &self.backends.sql,
            EngineBinding::Remote { .. } => &self.backends.remote,
            EngineBinding::NoOp {
                kind: StaticKind::Preview,
            } => return ExecutionOutput::preview(),
            EngineBinding::NoOp {
                kind: StaticKind::Document,
            } => {
                return ExecutionOutput::console(format!(
                    "{} documents are not executable. Nothing to run.",
                    descriptor.name
                ))
            }
        };

        let backend = Arc::clone(backend);
        let files = if backend.capabilities().multi_file {
            files.to_vec()
        } else {
            if !files.is_empty() {
                debug!(count = files.len(), "Backend takes a single source, dropping project files");
            }
            Vec::new()
        };
        let job = ExecutionJob {
            language: descriptor,
            code: code.to_string(),
            files,
        };

        let start = Instant::now();
        // A separate task so a panicking backend surfaces as a JoinError.
        let result = tokio::spawn(async move { backend.execute(&job).await }).await;
        debug!(elapsed = ?start.elapsed(), "Dispatch finished");

        match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => execution_error(&e),
            Err(join) => {
                error!(error = %join, "Backend task failed");
                let reason = if join.is_panic() {
                    "the execution backend crashed"
                } else {
                    "the execution was cancelled"
                };
                execution_error(&PolyrunError::Execution(reason.to_string()))
            }
        }
    }

    /// Drop the SQL database; the next SQL run starts from an empty one.
    pub async fn reset_database(&self) -> Result<()> {
        self.backends.sql.reset().await
    }

    /// Discard the loaded Python interpreter; it is reloaded on next use.
    pub async fn reset_interpreter(&self) -> Result<()> {
        self.backends.python.reset().await
    }

    pub async fn install_packages(&self, packages: &[String]) -> ExecutionOutput {
        match self.backends.python.install_packages(packages).await {
            Ok(output) => output,
            Err(e) => execution_error(&e),
        }
    }
}

fn execution_error(error: &PolyrunError) -> ExecutionOutput {
    let detail = match error {
        PolyrunError::Execution(message) => message.clone(),
        other => other.to_string(),
    };
    let message = ansi::red(&format!("{}: {}", EXECUTION_ERROR_PREFIX, detail));
    if error.is_retryable() {
        ExecutionOutput::failure(format!("{}\n{}", message, RETRY_HINT))
    } else {
        ExecutionOutput::failure(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputKind;
    use async_trait::async_trait;
    use std::sync::Mutex;

    enum Behavior {
        Echo,
        Fail(fn() -> PolyrunError),
        Panic,
    }

    struct MockBackend {
        name: &'static str,
        behavior: Behavior,
        capabilities: BackendCapabilities,
        calls: Mutex<Vec<String>>,
        resets: Mutex<usize>,
    }

    impl MockBackend {
        fn new(name: &'static str, behavior: Behavior) -> Arc<Self> {
            Self::with_capabilities(name, behavior, BackendCapabilities::default())
        }

        fn with_capabilities(
            name: &'static str,
            behavior: Behavior,
            capabilities: BackendCapabilities,
        ) -> Arc<Self> {
            Arc::new(Self {
                name,
                behavior,
                capabilities,
                calls: Mutex::new(Vec::new()),
                resets: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl ExecutionBackend for MockBackend {
        fn name(&self) -> &str {
            self.name
        }

        fn capabilities(&self) -> BackendCapabilities {
            self.capabilities.clone()
        }

        async fn execute(&self, job: &ExecutionJob) -> Result<ExecutionOutput> {
            self.calls.lock().unwrap().push(job.language.key.to_string());
            match &self.behavior {
                Behavior::Echo => Ok(ExecutionOutput::console(format!(
                    "{}:{}:{}",
                    self.name,
                    job.code,
                    job.files.len()
                ))),
                Behavior::Fail(error) => Err(error()),
                Behavior::Panic => panic!("backend blew up"),
            }
        }

        async fn reset(&self) -> Result<()> {
            *self.resets.lock().unwrap() += 1;
            Ok(())
        }
    }

    struct Fixture {
        router: Router,
        script: Arc<MockBackend>,
        python: Arc<MockBackend>,
        sql: Arc<MockBackend>,
        remote: Arc<MockBackend>,
    }

    fn fixture(python: Behavior) -> Fixture {
        let script = MockBackend::new("script", Behavior::Echo);
        let python = MockBackend::new("python", python);
        let sql = MockBackend::new("sql", Behavior::Echo);
        let remote = MockBackend::with_capabilities(
            "remote",
            Behavior::Echo,
            BackendCapabilities {
                multi_file: true,
                ..Default::default()
            },
        );
        let router = Router::new(Backends {
            script: script.clone(),
            python: python.clone(),
            sql: sql.clone(),
            remote: remote.clone(),
        });
        Fixture {
            router,
            script,
            python,
            sql,
            remote,
        }
    }

    #[tokio::test]
    async fn test_unknown_language_names_key() {
        let f = fixture(Behavior::Echo);
        let out = f.router.execute("brainfuck", "+", &[]).await;
        assert!(out.error);
        assert!(out.output.contains("'brainfuck'"));
        assert!(f.script.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_by_binding() {
        let f = fixture(Behavior::Echo);
        let files = vec![ProjectFile {
            path: "lib.rs".to_string(),
            content: String::new(),
        }];

        assert_eq!(f.router.execute("ts", "x", &[]).await.output, "script:x:0");
        assert_eq!(f.router.execute("Python", "y", &[]).await.output, "python:y:0");
        assert_eq!(f.router.execute("sql", "z", &[]).await.output, "sql:z:0");
        assert_eq!(f.router.execute("rust", "w", &files).await.output, "remote:w:1");

        assert_eq!(*f.script.calls.lock().unwrap(), vec!["typescript"]);
        assert_eq!(*f.remote.calls.lock().unwrap(), vec!["rust"]);
        assert_eq!(f.sql.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_project_files_only_reach_multi_file_backends() {
        let f = fixture(Behavior::Echo);
        let files = vec![ProjectFile {
            path: "helper.py".to_string(),
            content: String::new(),
        }];

        assert_eq!(f.router.execute("python", "y", &files).await.output, "python:y:0");
        assert_eq!(f.router.execute("go", "z", &files).await.output, "remote:z:1");

        let capabilities = f.router.capabilities();
        let names: Vec<_> = capabilities.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["script", "python", "sql", "remote"]);
        assert!(capabilities[3].1.multi_file);
    }

    #[tokio::test]
    async fn test_no_op_languages_skip_backends() {
        let f = fixture(Behavior::Echo);

        let out = f.router.execute("html", "<p>hi</p>", &[]).await;
        assert!(!out.error);
        assert_eq!(out.kind, OutputKind::Preview);

        let out = f.router.execute("json", "{}", &[]).await;
        assert!(!out.error);
        assert_eq!(out.kind, OutputKind::Console);
        assert!(out.output.contains("JSON"));

        assert!(f.script.calls.lock().unwrap().is_empty());
        assert!(f.remote.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backend_error_is_converted() {
        let f = fixture(Behavior::Fail(|| PolyrunError::Execution("bad state".into())));
        let out = f.router.execute("python", "1", &[]).await;
        assert!(out.error);
        assert_eq!(out.output, ansi::red("Execution error: bad state"));
        assert!(!out.output.contains(RETRY_HINT));
    }

    #[tokio::test]
    async fn test_retryable_error_gets_hint() {
        let f = fixture(Behavior::Fail(|| PolyrunError::RuntimeLoad {
            runtime: "Python".into(),
            reason: "offline".into(),
        }));
        let out = f.router.execute("python", "1", &[]).await;
        assert!(out.error);
        assert!(out.output.ends_with(RETRY_HINT));
    }

    #[tokio::test]
    async fn test_backend_panic_is_contained() {
        let f = fixture(Behavior::Panic);
        let out = f.router.execute("python", "1", &[]).await;
        assert!(out.error);
        assert!(out.output.contains("crashed"));

        // The router keeps working afterwards.
        let out = f.router.execute("javascript", "ok", &[]).await;
        assert!(!out.error);
    }

    #[tokio::test]
    async fn test_reset_and_install_passthrough() {
        let f = fixture(Behavior::Echo);
        f.router.reset_database().await.unwrap();
        assert_eq!(*f.sql.resets.lock().unwrap(), 1);
        f.router.reset_interpreter().await.unwrap();
        assert_eq!(*f.python.resets.lock().unwrap(), 1);

        // MockBackend keeps the default install_packages, which is unsupported.
        let out = f.router.install_packages(&["six".to_string()]).await;
        assert!(out.error);
        assert!(out.output.contains("not supported"));
    }

    #[tokio::test]
    async fn test_run_request() {
        let f = fixture(Behavior::Echo);
        let request: ExecutionRequest =
            serde_json::from_str(r#"{"language": "sql", "code": "SELECT 1"}"#).unwrap();
        let out = f.router.run(&request).await;
        assert_eq!(out.output, "sql:SELECT 1:0");
    }
}
