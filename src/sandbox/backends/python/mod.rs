//! Python on a WASI build of CPython.
//!
//! The interpreter is loaded on first use and shared by every later run. The
//! backend only depends on the [`InterpreterLoader`] and [`Interpreter`]
//! traits; the Wasmtime implementation lives in [`wasi`].

#[cfg(feature = "python")]
mod capture;
mod packages;
#[cfg(feature = "python")]
pub mod wasi;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, warn};

pub use self::packages::PackageInstaller;
use crate::error::{PolyrunError, Result};
use crate::output::{ansi, ExecutionOutput, RETRY_HINT};
use crate::sandbox::slot::RuntimeSlot;
use crate::sandbox::traits::{BackendCapabilities, ExecutionBackend, ExecutionJob};

/// How the guest process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuestExit {
    /// `_start` returned or the guest called `exit(code)`
    Exited(i32),
    /// The instruction budget ran out
    OutOfFuel,
    /// The module trapped for any other reason
    Trapped(String),
}

/// Everything one run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit: GuestExit,
}

/// A loaded interpreter, able to run source to completion.
///
/// `run` blocks; the backend calls it from `spawn_blocking`.
pub trait Interpreter: Send + Sync {
    fn run(&self, code: &str) -> Result<RunOutcome>;
}

/// Produces the interpreter on first use.
#[async_trait]
pub trait InterpreterLoader: Send + Sync {
    async fn load(&self) -> Result<Box<dyn Interpreter>>;
}

pub struct PythonBackend {
    loader: Arc<dyn InterpreterLoader>,
    runtime: RuntimeSlot<Box<dyn Interpreter>>,
    packages: Option<PackageInstaller>,
}

impl PythonBackend {
    pub fn new(loader: Arc<dyn InterpreterLoader>) -> Self {
        Self {
            loader,
            runtime: RuntimeSlot::new("python"),
            packages: None,
        }
    }

    pub fn with_packages(mut self, installer: PackageInstaller) -> Self {
        self.packages = Some(installer);
        self
    }

    async fn interpreter(&self) -> Result<Arc<Box<dyn Interpreter>>> {
        let loader = Arc::clone(&self.loader);
        self.runtime
            .get_or_try_init(|| async move { loader.load().await })
            .await
            .map_err(|e| match e {
                PolyrunError::RuntimeLoad { .. } => e,
                other => PolyrunError::RuntimeLoad {
                    runtime: "Python".to_string(),
                    reason: other.to_string(),
                },
            })
    }
}

/// Map a finished run onto the Output Model.
///
/// stdout comes first, stderr (tracebacks) follows in red. Any exit other
/// than `Exited(0)` is a fault, with an extra line when the guest itself
/// printed nothing explaining it.
pub fn into_output(outcome: &RunOutcome) -> ExecutionOutput {
    let mut text = outcome.stdout.trim_end().to_string();
    let stderr = outcome.stderr.trim_end();

    if !stderr.is_empty() {
        append_line(&mut text, &ansi::red(stderr));
    }

    let fault = match &outcome.exit {
        GuestExit::Exited(0) => return ExecutionOutput::console(text),
        GuestExit::Exited(_) if !stderr.is_empty() => None,
        GuestExit::Exited(code) => Some(format!("Process exited with code {}", code)),
        GuestExit::OutOfFuel => {
            Some("TimeoutError: Execution exceeded its instruction budget".to_string())
        }
        GuestExit::Trapped(reason) => Some(format!("RuntimeError: {}", reason)),
    };
    if let Some(fault) = fault {
        append_line(&mut text, &ansi::red(&fault));
    }

    ExecutionOutput::failure(text)
}

fn append_line(text: &mut String, line: &str) {
    if !text.is_empty() {
        text.push('\n');
    }
    text.push_str(line);
}

#[async_trait]
impl ExecutionBackend for PythonBackend {
    fn name(&self) -> &str {
        "python"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            lazy_runtime: true,
            persistent_state: self.packages.is_some(),
            networking: false,
            multi_file: false,
        }
    }

    async fn execute(&self, job: &ExecutionJob) -> Result<ExecutionOutput> {
        let interpreter = match self.interpreter().await {
            Ok(interpreter) => interpreter,
            Err(e) => {
                warn!(error = %e, "Python runtime failed to load");
                return Ok(ExecutionOutput::infrastructure(&e.to_string(), RETRY_HINT));
            }
        };

        let start = Instant::now();
        let code = job.code.clone();
        let outcome = tokio::task::spawn_blocking(move || interpreter.run(&code))
            .await
            .map_err(|e| PolyrunError::Execution(format!("Interpreter thread failed: {}", e)))??;

        debug!(exit = ?outcome.exit, elapsed = ?start.elapsed(), "Python run finished");
        Ok(into_output(&outcome))
    }

    async fn reset(&self) -> Result<()> {
        self.runtime.reset().await;
        Ok(())
    }

    async fn install_packages(&self, packages: &[String]) -> Result<ExecutionOutput> {
        match &self.packages {
            Some(installer) => Ok(installer.install(packages).await),
            None => Err(PolyrunError::BackendNotAvailable {
                backend: "python".to_string(),
                reason: "no package directory is configured".to_string(),
            }),
        }
    }
}
