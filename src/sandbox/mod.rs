mod backends;
mod factory;
mod router;
mod slot;
#[cfg(test)]
mod testing;
mod traits;

use serde::{Deserialize, Serialize};

pub use backends::python::{GuestExit, Interpreter, InterpreterLoader, RunOutcome};
#[cfg(feature = "javascript")]
pub use backends::ScriptBackend;
#[cfg(feature = "python")]
pub use backends::WasiLoader;
pub use backends::{PackageInstaller, PythonBackend, RemoteBackend, SqlBackend};
pub use factory::{available_backends, create_router, create_router_in, BackendInfo};
pub use router::{Backends, Router};
pub use slot::RuntimeSlot;
pub use traits::{BackendCapabilities, ExecutionBackend, ExecutionJob, UnavailableBackend};

/// An auxiliary file sent along with the primary source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFile {
    pub path: String,
    pub content: String,
}

/// One execution as received from a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub language: String,
    pub code: String,
    #[serde(default)]
    pub files: Vec<ProjectFile>,
}
