use async_trait::async_trait;

use crate::error::{PolyrunError, Result};
use crate::language::LanguageDescriptor;
use crate::output::ExecutionOutput;
use crate::sandbox::ProjectFile;

/// Capability flags indicating what the backend supports
#[derive(Debug, Clone, Default)]
pub struct BackendCapabilities {
    /// Runtime is downloaded/opened on first use rather than at construction
    pub lazy_runtime: bool,
    /// State (tables, installed packages) survives between runs
    pub persistent_state: bool,
    /// Needs network access to execute
    pub networking: bool,
    /// Receives the auxiliary project files
    pub multi_file: bool,
}

impl BackendCapabilities {
    /// Short labels of the flags that are set, for listings.
    pub fn labels(&self) -> Vec<&'static str> {
        [
            (self.lazy_runtime, "lazy runtime"),
            (self.persistent_state, "persistent state"),
            (self.networking, "network"),
            (self.multi_file, "project files"),
        ]
        .into_iter()
        .filter_map(|(set, label)| set.then_some(label))
        .collect()
    }
}

/// One unit of work handed to a backend by the router.
#[derive(Debug, Clone)]
pub struct ExecutionJob {
    pub language: &'static LanguageDescriptor,
    pub code: String,
    pub files: Vec<ProjectFile>,
}

/// Trait for execution backends.
///
/// Each backend turns source text into an [`ExecutionOutput`]. Program faults
/// (exceptions, failed queries, non-zero exits) are part of a successful
/// `Ok` result with `error = true`; `Err` is reserved for faults of the
/// backend itself, which the router converts at its boundary.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Returns the backend name (e.g., "script", "python")
    fn name(&self) -> &str;

    /// Returns the capabilities of this backend
    fn capabilities(&self) -> BackendCapabilities;

    /// Run one job
    async fn execute(&self, job: &ExecutionJob) -> Result<ExecutionOutput>;

    /// Discard accumulated runtime state; the next run starts fresh.
    /// Default implementation is a no-op for stateless backends.
    async fn reset(&self) -> Result<()> {
        Ok(())
    }

    /// Best-effort installation of additional libraries.
    async fn install_packages(&self, _packages: &[String]) -> Result<ExecutionOutput> {
        Err(PolyrunError::BackendNotAvailable {
            backend: self.name().to_string(),
            reason: "package installation is not supported".to_string(),
        })
    }
}

/// Stand-in for a backend that was not compiled in.
pub struct UnavailableBackend {
    name: &'static str,
    reason: &'static str,
}

impl UnavailableBackend {
    pub fn new(name: &'static str, reason: &'static str) -> Self {
        Self { name, reason }
    }
}

#[async_trait]
impl ExecutionBackend for UnavailableBackend {
    fn name(&self) -> &str {
        self.name
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::default()
    }

    async fn execute(&self, _job: &ExecutionJob) -> Result<ExecutionOutput> {
        Err(PolyrunError::BackendNotAvailable {
            backend: self.name.to_string(),
            reason: self.reason.to_string(),
        })
    }
}
